//! Error types for the AI Tutor core.
//!
//! This module defines the error hierarchy for all tutor operations,
//! including configuration loading, course generation, lesson streaming,
//! quiz submission, and local persistence.

use std::path::PathBuf;

use tutor_genai::{GenAiError, ServiceErrorKind};

/// A specialized `Result` type for tutor operations.
pub type Result<T> = std::result::Result<T, TutorError>;

/// Errors that can occur while building and studying courses.
///
/// Error variants are organized by subsystem and include actionable suggestions
/// where possible to help users resolve issues.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your tutor.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// The topic was empty after trimming whitespace.
    #[error("Topic must not be empty\n\nSuggestion: Describe what you want to learn, e.g. \"Rust ownership\"")]
    EmptyTopic,

    /// The generation service call itself failed.
    #[error("Generation failed ({kind}): {message}\n\nSuggestion: {suggestion}")]
    GenerationService {
        /// The kind of service failure.
        kind: ServiceErrorKind,
        /// Detailed error message from the service client.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The service answered successfully but produced no usable text.
    #[error("Generation failed: no content generated\n\nSuggestion: Try again, or rephrase the topic")]
    EmptyResponse,

    /// The generated syllabus did not have the expected shape.
    #[error("Generation failed: malformed syllabus: {message}\n\nSuggestion: Try again; the model occasionally returns invalid JSON")]
    SyllabusParse {
        /// Description of the parse failure.
        message: String,
    },

    /// The generated syllabus contained no modules.
    #[error("Generation failed: the syllabus contains no modules\n\nSuggestion: Try again, or make the topic more specific")]
    EmptySyllabus,

    // ========================================================================
    // Course & Module Errors
    // ========================================================================
    /// No course with the given identifier exists.
    #[error("Course not found: '{course_id}'\n\nSuggestion: Run 'tutor list' to see available courses")]
    CourseNotFound {
        /// The requested course identifier.
        course_id: String,
    },

    /// The course exists but has no module with the given identifier.
    #[error("Module '{module_id}' not found in course '{course_id}'\n\nSuggestion: Run 'tutor show <course>' to see its modules")]
    ModuleNotFound {
        /// The course that was searched.
        course_id: String,
        /// The requested module identifier.
        module_id: String,
    },

    // ========================================================================
    // Lesson Streaming Errors
    // ========================================================================
    /// A lesson stream is already running.
    #[error("A lesson is already being generated (module '{module_id}')\n\nSuggestion: Wait for it to finish before opening another module")]
    StreamInProgress {
        /// The module whose lesson is currently streaming.
        module_id: String,
    },

    /// The lesson task ended without producing an outcome.
    #[error("Lesson generation was interrupted: {message}")]
    LessonTaskFailed {
        /// Description of the interruption.
        message: String,
    },

    // ========================================================================
    // Quiz Errors
    // ========================================================================
    /// The module has no quiz to answer.
    #[error("Module '{module_id}' has no quiz yet\n\nSuggestion: Open the module's lesson first; the quiz is generated with it")]
    QuizUnavailable {
        /// The module without a quiz.
        module_id: String,
    },

    /// The number of answers does not match the number of questions.
    #[error("Please answer all questions before submitting ({answered} of {expected} answered)")]
    IncompleteAnswers {
        /// Number of answers supplied.
        answered: usize,
        /// Number of questions in the quiz.
        expected: usize,
    },

    /// An answer does not select one of the question's options.
    #[error("Answer {answer} to question {question} is not one of its {options} options\n\nSuggestion: Choose an option number from the list")]
    InvalidAnswer {
        /// One-based position of the question in the quiz.
        question: usize,
        /// The submitted zero-based option index.
        answer: i64,
        /// Number of options the question offers.
        options: usize,
    },

    // ========================================================================
    // Persistence Errors
    // ========================================================================
    /// The courses file contains malformed JSON that cannot be recovered.
    #[error("Corrupted courses file '{path}': {message}\n\nSuggestion: Remove the file to start fresh, or restore it from a backup")]
    StoreCorrupted {
        /// Path to the corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // State Machine Errors
    // ========================================================================
    /// Invalid state transition attempted.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
    },
}

impl From<GenAiError> for TutorError {
    fn from(err: GenAiError) -> Self {
        Self::generation_service(err.kind(), err.to_string())
    }
}

impl TutorError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `GenerationService` error with a suggestion based on its kind.
    #[must_use]
    pub fn generation_service(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self::GenerationService {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `SyllabusParse` error.
    #[must_use]
    pub fn syllabus_parse(message: impl Into<String>) -> Self {
        Self::SyllabusParse {
            message: message.into(),
        }
    }

    /// Creates a new `CourseNotFound` error.
    #[must_use]
    pub fn course_not_found(course_id: impl Into<String>) -> Self {
        Self::CourseNotFound {
            course_id: course_id.into(),
        }
    }

    /// Creates a new `ModuleNotFound` error.
    #[must_use]
    pub fn module_not_found(course_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self::ModuleNotFound {
            course_id: course_id.into(),
            module_id: module_id.into(),
        }
    }

    /// Creates a new `StreamInProgress` error.
    #[must_use]
    pub fn stream_in_progress(module_id: impl Into<String>) -> Self {
        Self::StreamInProgress {
            module_id: module_id.into(),
        }
    }

    /// Creates a new `QuizUnavailable` error.
    #[must_use]
    pub fn quiz_unavailable(module_id: impl Into<String>) -> Self {
        Self::QuizUnavailable {
            module_id: module_id.into(),
        }
    }

    /// Creates a new `StoreCorrupted` error.
    #[must_use]
    pub fn store_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Returns `true` if this error means "the course could not be generated".
    ///
    /// Service failures, empty responses and malformed syllabi are reported
    /// to the user identically.
    #[must_use]
    pub const fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Self::GenerationService { .. }
                | Self::EmptyResponse
                | Self::SyllabusParse { .. }
                | Self::EmptySyllabus
        )
    }

    /// Returns `true` if the request referenced a course or module that does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::CourseNotFound { .. } | Self::ModuleNotFound { .. }
        )
    }
}
