//! AI Tutor Report Generation
//!
//! Builds a progress [`Report`] for a course and renders it as JSON for
//! programmatic access or Markdown for reading.
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use chrono::Utc;
//! use tutor_core::{Course, Module};
//! use tutor_report::{MarkdownGenerator, Report};
//!
//! let course = Course {
//!     id: "c1".to_string(),
//!     topic: "rust".to_string(),
//!     title: "Rust Basics".to_string(),
//!     description: "Start here".to_string(),
//!     modules: vec![Module::new("m1", "Ownership", "Moves and drops")],
//!     created_at: Utc::now(),
//! };
//!
//! let report = Report::from_course(&course).unwrap();
//! let markdown = MarkdownGenerator::new(&report).generate();
//! assert!(markdown.contains("# Course Progress: Rust Basics"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tutor_core::{Course, Module};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the report to JSON.
    #[error("failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write the report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The course cannot be reported on.
    #[error("invalid report data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// Module Status
// ============================================================================

/// Where the learner stands on one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    /// The lesson has not been generated yet.
    NotStarted,
    /// The lesson is available but no passing score was recorded.
    InProgress,
    /// A passing quiz score was recorded.
    Completed,
}

impl ModuleStatus {
    fn of(module: &Module) -> Self {
        if module.completed() {
            Self::Completed
        } else if module.has_lesson() || module.quiz_score.is_some() {
            Self::InProgress
        } else {
            Self::NotStarted
        }
    }

    /// Returns a human-readable label for the status.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Report
// ============================================================================

/// Progress report for one course.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Course title.
    pub course_title: String,
    /// Topic the course was generated from.
    pub topic: String,
    /// Course description.
    pub description: String,
    /// When the course was created.
    pub created_at: DateTime<Utc>,
    /// When this report was generated.
    pub generated_at: DateTime<Utc>,
    /// Headline numbers.
    pub summary: ReportSummary,
    /// Per-module breakdown, in course order.
    pub modules: Vec<ModuleEntry>,
}

/// Headline numbers of a [`Report`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    /// Number of modules.
    pub total_modules: usize,
    /// Number of completed modules.
    pub completed_modules: usize,
    /// Rounded completion percentage.
    pub percent: u32,
    /// Number of modules whose lesson has been generated.
    pub lessons_generated: usize,
    /// Highest quiz score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    /// Mean of all recorded quiz scores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_score: Option<f64>,
}

/// One row of the per-module breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleEntry {
    /// 1-based position in the course.
    pub position: usize,
    /// Module title.
    pub title: String,
    /// Module description.
    pub description: String,
    /// Learner status.
    pub status: ModuleStatus,
    /// Number of quiz questions available.
    pub question_count: usize,
    /// Latest quiz score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<f64>,
}

impl Report {
    /// Builds a report for `course`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidData`] if the course has no modules.
    pub fn from_course(course: &Course) -> Result<Self> {
        Self::from_course_at(course, Utc::now())
    }

    /// Builds a report for `course` with an explicit generation time.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidData`] if the course has no modules.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_course_at(course: &Course, generated_at: DateTime<Utc>) -> Result<Self> {
        if course.modules.is_empty() {
            return Err(ReportError::InvalidData(format!(
                "course '{}' has no modules",
                course.id
            )));
        }

        let progress = course.progress();
        let scores: Vec<f64> = course.modules.iter().filter_map(|m| m.quiz_score).collect();
        let average_score = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        };

        let modules = course
            .modules
            .iter()
            .enumerate()
            .map(|(idx, m)| ModuleEntry {
                position: idx + 1,
                title: m.title.clone(),
                description: m.description.clone(),
                status: ModuleStatus::of(m),
                question_count: m.quiz_questions().len(),
                quiz_score: m.quiz_score,
            })
            .collect();

        Ok(Self {
            course_title: course.title.clone(),
            topic: course.topic.clone(),
            description: course.description.clone(),
            created_at: course.created_at,
            generated_at,
            summary: ReportSummary {
                total_modules: progress.total_modules,
                completed_modules: progress.completed_modules,
                percent: progress.percent,
                lessons_generated: progress.modules.iter().filter(|m| m.has_lesson).count(),
                best_score: progress.best_score,
                average_score,
            },
            modules,
        })
    }

    /// Returns `true` once every module is completed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.summary.completed_modules == self.summary.total_modules
    }
}
