//! AI Tutor generation capability
//!
//! Access to a third-party generative-text service via a small trait.
//!
//! This crate provides the [`GenerationBackend`] seam used by the tutor core,
//! a Gemini REST implementation ([`GeminiClient`]) that supports both
//! schema-constrained JSON generation and server-sent-event streaming, and a
//! deterministic [`ScriptedBackend`] that replays canned responses.

pub mod gemini;
pub mod scripted;
pub mod sse;

pub use gemini::{GeminiClient, GeminiConfig};
pub use scripted::{ScriptedBackend, ScriptedStream, StreamRelease};
pub use sse::SseDecoder;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use thiserror::Error;

/// Errors raised by a generation backend.
#[derive(Debug, Error)]
pub enum GenAiError {
    /// The backend is missing required configuration (usually the API key).
    #[error("generation service not configured: {0}")]
    NotConfigured(String),

    /// Transport-level failure talking to the service.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code returned by the service.
        status: reqwest::StatusCode,
        /// Response body, as text.
        body: String,
    },

    /// The service response could not be decoded.
    #[error("failed to decode service response: {0}")]
    Json(#[from] serde_json::Error),

    /// The service reported an error inside an otherwise successful response.
    #[error("service error: {0}")]
    Service(String),
}

/// Result type for generation operations.
pub type Result<T> = std::result::Result<T, GenAiError>;

/// A lazily produced sequence of text fragments.
///
/// The stream ends normally when the service has nothing more to send, or
/// yields a single `Err` and then ends.
pub type TextStream = BoxStream<'static, Result<String>>;

/// Categories of service failures for structured error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    /// Authentication failure (missing or rejected API key).
    Authentication,
    /// Rate limit or quota exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Server => write!(f, "server"),
            Self::Network => write!(f, "network"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl ServiceErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key (GEMINI_API_KEY) or credentials",
            Self::RateLimit => "Wait and try again; your quota may be exhausted",
            Self::Server => "Try again later; the generation service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Other => "Check the generation service's status page",
        }
    }
}

impl GenAiError {
    /// Returns the failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ServiceErrorKind {
        match self {
            Self::NotConfigured(_) => ServiceErrorKind::Authentication,
            Self::Request(e) if e.is_decode() => ServiceErrorKind::Other,
            Self::Request(_) => ServiceErrorKind::Network,
            Self::HttpStatus { status, .. } => ServiceErrorKind::from_status(status.as_u16()),
            Self::Json(_) | Self::Service(_) => ServiceErrorKind::Other,
        }
    }
}

/// A generative-text capability.
///
/// Implementations must be cheap to share behind an `Arc`; every call is an
/// independent request.
pub trait GenerationBackend: Send + Sync {
    /// Generates a single schema-constrained JSON document for `prompt`.
    ///
    /// Returns the raw text of the response, which may be empty if the
    /// service produced no content.
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        schema: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<String>>;

    /// Opens a streamed plain-text response for `prompt`.
    fn generate_stream<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<TextStream>>;
}
