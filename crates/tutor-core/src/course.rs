//! Course data model.
//!
//! A [`Course`] is produced once by the syllabus requester and then mutated
//! only by attaching lesson results and quiz scores to its modules. Field
//! names are camelCase on the wire so the persisted file and the HTTP API
//! share one representation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};

// ============================================================================
// Theme
// ============================================================================

/// Display theme preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark theme.
    #[default]
    Dark,
    /// Light theme.
    Light,
}

impl Theme {
    /// Returns the other theme.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }

    /// Returns the persisted name of the theme.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "dark" => Ok(Self::Dark),
            "light" => Ok(Self::Light),
            other => Err(format!("unknown theme '{other}' (expected 'dark' or 'light')")),
        }
    }
}

// ============================================================================
// QuizQuestion
// ============================================================================

/// A single multiple-choice question.
///
/// `correct_answer` is a zero-based option index. It is not range-checked on
/// load: an out-of-range value makes every option incorrect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    /// The question text.
    pub question: String,
    /// Answer options, usually four.
    pub options: Vec<String>,
    /// Zero-based index of the correct option.
    pub correct_answer: i64,
    /// Why the correct answer is correct.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    /// Returns `true` if `choice` selects the correct option.
    #[must_use]
    pub fn is_correct(&self, choice: i64) -> bool {
        self.correct_option().is_some() && choice == self.correct_answer
    }

    /// Returns `true` if `choice` is the index of one of the options.
    #[must_use]
    pub fn is_valid_choice(&self, choice: i64) -> bool {
        usize::try_from(choice).is_ok_and(|idx| idx < self.options.len())
    }

    /// Text of the correct option, if the index points at one.
    #[must_use]
    pub fn correct_option(&self) -> Option<&str> {
        usize::try_from(self.correct_answer)
            .ok()
            .and_then(|idx| self.options.get(idx))
            .map(String::as_str)
    }
}

// ============================================================================
// Module
// ============================================================================

/// One unit of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    /// Identifier, unique within the course.
    pub id: String,
    /// Module title.
    pub title: String,
    /// Short summary shown before the lesson is generated.
    pub description: String,
    /// Generated lesson markdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Generated quiz, set together with `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz: Option<Vec<QuizQuestion>>,
    /// Whether a passing quiz score has been recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    /// Latest quiz score as a percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<f64>,
}

impl Module {
    /// Creates a module with no lesson, quiz or score.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            content: None,
            quiz: None,
            is_completed: None,
            quiz_score: None,
        }
    }

    /// Returns `true` if a non-empty lesson is cached on this module.
    #[must_use]
    pub fn has_lesson(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Returns `true` once a passing score has been recorded.
    #[must_use]
    pub fn completed(&self) -> bool {
        self.is_completed.unwrap_or(false)
    }

    /// The cached quiz, or an empty slice.
    #[must_use]
    pub fn quiz_questions(&self) -> &[QuizQuestion] {
        self.quiz.as_deref().unwrap_or_default()
    }
}

// ============================================================================
// Course
// ============================================================================

/// A generated course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Unique identifier.
    pub id: String,
    /// The topic as the user typed it.
    pub topic: String,
    /// Generated course title.
    pub title: String,
    /// Generated course description.
    pub description: String,
    /// Ordered modules; never empty for a created course.
    pub modules: Vec<Module>,
    /// Creation time, as epoch milliseconds on the wire.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Course {
    /// Looks up a module by id.
    #[must_use]
    pub fn module(&self, module_id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    /// Looks up a module by id, mutably.
    pub fn module_mut(&mut self, module_id: &str) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id == module_id)
    }

    /// Resolves a module by id or by 1-based position.
    pub fn resolve_module(&self, selector: &str) -> Result<&Module> {
        if let Some(module) = self.module(selector) {
            return Ok(module);
        }
        selector
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| self.modules.get(idx))
            .ok_or_else(|| TutorError::module_not_found(&self.id, selector))
    }

    /// Number of modules marked completed.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.modules.iter().filter(|m| m.completed()).count()
    }

    /// Completion percentage, rounded to the nearest whole number.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn progress_percent(&self) -> u32 {
        if self.modules.is_empty() {
            return 0;
        }
        let ratio = self.completed_count() as f64 / self.modules.len() as f64;
        // ratio lies in 0..=1
        (ratio * 100.0).round() as u32
    }

    /// Highest quiz score across all modules.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.modules
            .iter()
            .filter_map(|m| m.quiz_score)
            .reduce(f64::max)
    }

    /// Summarises completion for dashboards and reports.
    #[must_use]
    pub fn progress(&self) -> CourseProgress {
        CourseProgress {
            course_id: self.id.clone(),
            title: self.title.clone(),
            topic: self.topic.clone(),
            total_modules: self.modules.len(),
            completed_modules: self.completed_count(),
            percent: self.progress_percent(),
            best_score: self.best_score(),
            modules: self
                .modules
                .iter()
                .enumerate()
                .map(|(idx, m)| ModuleProgress {
                    position: idx + 1,
                    module_id: m.id.clone(),
                    title: m.title.clone(),
                    has_lesson: m.has_lesson(),
                    question_count: m.quiz_questions().len(),
                    completed: m.completed(),
                    quiz_score: m.quiz_score,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Completion summary of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgress {
    /// Course identifier.
    pub course_id: String,
    /// Course title.
    pub title: String,
    /// Topic the course was generated from.
    pub topic: String,
    /// Number of modules.
    pub total_modules: usize,
    /// Number of completed modules.
    pub completed_modules: usize,
    /// Rounded completion percentage.
    pub percent: u32,
    /// Highest quiz score in the course.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_score: Option<f64>,
    /// Per-module breakdown, in course order.
    pub modules: Vec<ModuleProgress>,
}

/// Completion summary of one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    /// 1-based position in the course.
    pub position: usize,
    /// Module identifier.
    pub module_id: String,
    /// Module title.
    pub title: String,
    /// Whether the lesson has been generated.
    pub has_lesson: bool,
    /// Number of quiz questions available.
    pub question_count: usize,
    /// Whether the module is completed.
    pub completed: bool,
    /// Latest quiz score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz_score: Option<f64>,
}
