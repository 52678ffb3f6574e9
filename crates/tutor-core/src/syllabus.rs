//! Syllabus generation.
//!
//! [`SyllabusRequester`] turns a topic into a [`Course`] with one structured
//! generation request. It never persists anything; the session decides what
//! to do with the result.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use tutor_genai::GenerationBackend;
use uuid::Uuid;

use crate::course::{Course, Module};
use crate::error::{Result, TutorError};
use crate::prompt::{syllabus_prompt, syllabus_schema};

/// The shape the model is asked to produce.
#[derive(Debug, Deserialize)]
struct SyllabusDocument {
    title: String,
    description: String,
    modules: Vec<SyllabusModule>,
}

#[derive(Debug, Deserialize)]
struct SyllabusModule {
    title: String,
    description: String,
}

/// Requests course syllabi from a generation backend.
#[derive(Clone)]
pub struct SyllabusRequester {
    backend: Arc<dyn GenerationBackend>,
}

impl std::fmt::Debug for SyllabusRequester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyllabusRequester").finish_non_exhaustive()
    }
}

impl SyllabusRequester {
    /// Creates a requester backed by `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Generates a course for `topic`.
    ///
    /// The topic is embedded verbatim; callers trim and reject empty topics.
    /// Every module of the returned course is fresh: no lesson, no quiz, not
    /// completed.
    ///
    /// # Errors
    ///
    /// - `GenerationService` if the backend call fails
    /// - `EmptyResponse` if the backend returned no text
    /// - `SyllabusParse` if the text is not a valid syllabus document
    /// - `EmptySyllabus` if the document contains no modules
    #[instrument(skip(self))]
    pub async fn request_syllabus(&self, topic: &str) -> Result<Course> {
        let prompt = syllabus_prompt(topic);
        let schema = syllabus_schema();

        let text = self.backend.generate(&prompt, &schema).await.map_err(|e| {
            warn!(error = %e, "Syllabus request failed");
            TutorError::from(e)
        })?;

        if text.trim().is_empty() {
            warn!("Syllabus response was empty");
            return Err(TutorError::EmptyResponse);
        }
        debug!(bytes = text.len(), "Received syllabus document");

        let document: SyllabusDocument = serde_json::from_str(&text).map_err(|e| {
            warn!(error = %e, "Syllabus document is malformed");
            TutorError::syllabus_parse(e.to_string())
        })?;

        if document.modules.is_empty() {
            warn!("Syllabus document has no modules");
            return Err(TutorError::EmptySyllabus);
        }

        let course = Course {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            title: document.title,
            description: document.description,
            modules: document
                .modules
                .into_iter()
                .map(|m| {
                    let mut module = Module::new(Uuid::new_v4().to_string(), m.title, m.description);
                    module.is_completed = Some(false);
                    module
                })
                .collect(),
            created_at: Utc::now(),
        };

        info!(
            course_id = %course.id,
            title = %course.title,
            modules = course.modules.len(),
            "Generated syllabus"
        );
        Ok(course)
    }
}
