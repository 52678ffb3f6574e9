//! Gemini REST client.
//!
//! Implements [`GenerationBackend`] on top of the `generateContent` and
//! `streamGenerateContent` endpoints. Structured requests ask the service for
//! an `application/json` response constrained by a schema; streamed requests
//! use `alt=sse` and yield the text of each event as one fragment.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::sse::SseDecoder;
use crate::{GenAiError, GenerationBackend, Result, TextStream};

/// Default REST endpoint for the Gemini API.
pub const DEFAULT_API_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for both structured and streamed generation.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection settings for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key; requests fail with [`GenAiError::NotConfigured`] when absent.
    pub api_key: Option<String>,
    /// Base URL, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub api_endpoint: String,
    /// Model used for schema-constrained generation.
    pub structured_model: String,
    /// Model used for streamed generation.
    pub stream_model: String,
    /// TCP connect timeout. No overall timeout is applied so long streams survive.
    pub connect_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            structured_model: DEFAULT_MODEL.to_string(),
            stream_model: DEFAULT_MODEL.to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiClient {
    /// Builds a client with the given settings.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { config, client })
    }

    /// Returns `true` if an API key is configured.
    pub fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| GenAiError::NotConfigured("no API key configured".to_string()))
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!(
            "{}/models/{model}:{method}",
            self.config.api_endpoint.trim_end_matches('/')
        )
    }

    #[instrument(skip_all, fields(model = %self.config.structured_model))]
    async fn generate_json(&self, prompt: &str, schema: &serde_json::Value) -> Result<String> {
        let api_key = self.api_key()?;
        let url = self.model_url(&self.config.structured_model, "generateContent");
        let body = GenerateContentRequest::new(prompt).with_schema(schema);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;

        let bytes = response.bytes().await?;
        let decoded: GenerateContentResponse = serde_json::from_slice(&bytes)?;
        if let Some(error) = decoded.error {
            return Err(GenAiError::Service(error.message));
        }
        let text = decoded.text();
        debug!(len = text.len(), "Structured response received");
        Ok(text)
    }

    #[instrument(skip_all, fields(model = %self.config.stream_model))]
    async fn open_stream(&self, prompt: &str) -> Result<TextStream> {
        let api_key = self.api_key()?;
        let url = format!(
            "{}?alt=sse",
            self.model_url(&self.config.stream_model, "streamGenerateContent")
        );
        let body = GenerateContentRequest::new(prompt);

        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        debug!("Stream opened");

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(GenAiError::from))
            .boxed();
        Ok(text_fragments(bytes))
    }
}

impl GenerationBackend for GeminiClient {
    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        schema: &'a serde_json::Value,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.generate_json(prompt, schema))
    }

    fn generate_stream<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<TextStream>> {
        Box::pin(self.open_stream(prompt))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(?status, "Generation request rejected");
    Err(GenAiError::HttpStatus { status, body })
}

// ============================================================================
// Stream decoding
// ============================================================================

struct FragmentState {
    bytes: BoxStream<'static, Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    finished: bool,
}

/// Turns a raw SSE byte stream into a stream of text fragments.
///
/// Events without text are skipped. The first error ends the stream.
pub fn text_fragments(bytes: BoxStream<'static, Result<Bytes>>) -> TextStream {
    let state = FragmentState {
        bytes,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(data) = state.pending.pop_front() {
                match event_text(&data) {
                    Ok(text) if text.is_empty() => continue,
                    Ok(text) => return Some((Ok(text), state)),
                    Err(e) => {
                        state.pending.clear();
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = state.decoder.push(&chunk);
                    state.pending.extend(events);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    let events = state.decoder.finish();
                    state.pending.extend(events);
                }
            }
        }
    })
    .boxed()
}

fn event_text(data: &str) -> Result<String> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;
    if let Some(error) = response.error {
        return Err(GenAiError::Service(error.message));
    }
    Ok(response.text())
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str) -> Self {
        Self {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: None,
        }
    }

    fn with_schema(mut self, schema: &'a serde_json::Value) -> Self {
        self.generation_config = Some(GenerationConfig {
            response_mime_type: "application/json",
            response_schema: schema,
        });
        self
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'static str,
    response_schema: &'a serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiError>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}
