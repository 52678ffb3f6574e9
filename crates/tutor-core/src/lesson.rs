//! Streaming lesson generation.
//!
//! A lesson arrives as one stream of text fragments containing the lesson
//! markdown, the [`QUIZ_SEPARATOR`], and a JSON quiz. [`LessonRun`] is the
//! state machine that accumulates fragments and derives the two views;
//! [`LessonStreamProcessor`] drives a run from a generation backend.
//!
//! # Phases
//!
//! ```text
//! Streaming ──► Finalizing ──► Done
//!     │              │
//!     └──────────────┴──► Failed
//! ```

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use tutor_genai::GenerationBackend;

use crate::course::QuizQuestion;
use crate::error::{Result, TutorError};
use crate::prompt::lesson_prompt;
pub use crate::prompt::QUIZ_SEPARATOR;

/// Appended to the partial lesson when generation fails.
pub const LESSON_ERROR_NOTICE: &str = "\n\n**Error loading lesson content. Please try again.**";

/// Splits `buffer` on the first occurrence of [`QUIZ_SEPARATOR`].
///
/// Returns the lesson part and, if the separator has appeared, the raw quiz
/// part after it.
#[must_use]
pub fn split_lesson(buffer: &str) -> (&str, Option<&str>) {
    match buffer.split_once(QUIZ_SEPARATOR) {
        Some((lesson, quiz)) => (lesson, Some(quiz)),
        None => (buffer, None),
    }
}

/// Removes markdown code fences the model sometimes wraps the quiz in.
#[must_use]
pub fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// How the quiz part of a finished lesson was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizStatus {
    /// No separator (or nothing after it); no parse was attempted.
    Absent,
    /// The quiz parsed successfully.
    Parsed,
    /// The quiz text was present but not a valid question list.
    Malformed,
}

/// Parses the raw quiz part of a lesson.
///
/// Failures are logged and yield an empty quiz.
#[must_use]
pub fn parse_quiz(raw: Option<&str>) -> (Vec<QuizQuestion>, QuizStatus) {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return (Vec::new(), QuizStatus::Absent);
    };

    match serde_json::from_str::<Vec<QuizQuestion>>(&strip_code_fences(raw)) {
        Ok(questions) => (questions, QuizStatus::Parsed),
        Err(e) => {
            warn!(error = %e, "Failed to parse quiz JSON; continuing without a quiz");
            (Vec::new(), QuizStatus::Malformed)
        }
    }
}

// ============================================================================
// LessonRun
// ============================================================================

/// Phase of a lesson run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonPhase {
    /// Fragments are being received.
    Streaming,
    /// The stream ended; the quiz is being parsed.
    Finalizing,
    /// The lesson and quiz are ready to commit.
    Done,
    /// Generation failed; nothing is committed.
    Failed,
}

impl fmt::Display for LessonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Streaming => "streaming",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A snapshot of the two views derived from the buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonUpdate {
    /// Lesson markdown so far.
    pub lesson: String,
    /// Raw quiz text so far, once the separator has been seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiz_raw: Option<String>,
}

/// The committed result of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedLesson {
    /// Lesson markdown (text before the separator, verbatim).
    pub lesson: String,
    /// Parsed quiz; empty when absent or malformed.
    pub quiz: Vec<QuizQuestion>,
    /// How the quiz part was interpreted.
    pub quiz_status: QuizStatus,
}

/// Terminal outcome of a lesson run.
#[derive(Debug)]
pub enum LessonOutcome {
    /// The stream completed and the lesson is ready to commit.
    Done(FinalizedLesson),
    /// Generation failed.
    Failed {
        /// The partial lesson followed by [`LESSON_ERROR_NOTICE`].
        lesson: String,
        /// Why it failed.
        error: TutorError,
    },
}

/// Accumulates fragments of one lesson stream.
///
/// The buffer is append-only; views are always re-derived from the full
/// buffer so fragment boundaries never matter.
#[derive(Debug)]
pub struct LessonRun {
    buffer: String,
    phase: LessonPhase,
}

impl Default for LessonRun {
    fn default() -> Self {
        Self::new()
    }
}

impl LessonRun {
    /// Starts a run in the `Streaming` phase.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: String::new(),
            phase: LessonPhase::Streaming,
        }
    }

    /// The current phase.
    #[must_use]
    pub const fn phase(&self) -> LessonPhase {
        self.phase
    }

    /// The raw accumulated text.
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Derives the current views.
    #[must_use]
    pub fn view(&self) -> LessonUpdate {
        let (lesson, quiz_raw) = split_lesson(&self.buffer);
        LessonUpdate {
            lesson: lesson.to_string(),
            quiz_raw: quiz_raw.map(str::to_string),
        }
    }

    /// Appends a fragment and returns the updated views.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is streaming.
    pub fn push(&mut self, fragment: &str) -> Result<LessonUpdate> {
        if self.phase != LessonPhase::Streaming {
            return Err(TutorError::invalid_transition(self.phase, LessonPhase::Streaming));
        }
        self.buffer.push_str(fragment);
        Ok(self.view())
    }

    /// Ends the stream and produces the committed lesson.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the run is streaming.
    pub fn finalize(&mut self) -> Result<FinalizedLesson> {
        if self.phase != LessonPhase::Streaming {
            return Err(TutorError::invalid_transition(self.phase, LessonPhase::Finalizing));
        }
        self.phase = LessonPhase::Finalizing;

        let (lesson, quiz_raw) = split_lesson(&self.buffer);
        let (quiz, quiz_status) = parse_quiz(quiz_raw);
        let finalized = FinalizedLesson {
            lesson: lesson.to_string(),
            quiz,
            quiz_status,
        };

        self.phase = LessonPhase::Done;
        Ok(finalized)
    }

    /// Marks the run failed and returns the lesson view with the error notice.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` if the run already finished.
    pub fn fail(&mut self) -> Result<String> {
        if matches!(self.phase, LessonPhase::Done | LessonPhase::Failed) {
            return Err(TutorError::invalid_transition(self.phase, LessonPhase::Failed));
        }
        self.phase = LessonPhase::Failed;
        let (lesson, _) = split_lesson(&self.buffer);
        Ok(format!("{lesson}{LESSON_ERROR_NOTICE}"))
    }

    fn into_failure(mut self, error: TutorError) -> LessonOutcome {
        match self.fail() {
            Ok(lesson) => LessonOutcome::Failed { lesson, error },
            Err(transition) => LessonOutcome::Failed {
                lesson: LESSON_ERROR_NOTICE.trim_start().to_string(),
                error: transition,
            },
        }
    }
}

// ============================================================================
// LessonStreamProcessor
// ============================================================================

/// What to teach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonRequest {
    /// Title of the course the module belongs to.
    pub course_title: String,
    /// Module title.
    pub module_title: String,
    /// Module description.
    pub module_description: String,
}

/// Drives lesson runs from a generation backend.
#[derive(Clone)]
pub struct LessonStreamProcessor {
    backend: Arc<dyn GenerationBackend>,
}

impl fmt::Debug for LessonStreamProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LessonStreamProcessor").finish_non_exhaustive()
    }
}

impl LessonStreamProcessor {
    /// Creates a processor backed by `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    /// Streams one lesson, calling `on_update` after every fragment.
    ///
    /// Each update is delivered before the next fragment is awaited. The
    /// processor never persists; committing a `Done` outcome is up to the
    /// caller.
    #[instrument(skip_all, fields(module = %request.module_title))]
    pub async fn run<F>(&self, request: &LessonRequest, mut on_update: F) -> LessonOutcome
    where
        F: FnMut(&LessonUpdate) + Send,
    {
        let mut run = LessonRun::new();
        let prompt = lesson_prompt(
            &request.course_title,
            &request.module_title,
            &request.module_description,
        );

        info!("Starting lesson stream");
        let mut stream = match self.backend.generate_stream(&prompt).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "Lesson stream could not be opened");
                return run.into_failure(e.into());
            }
        };

        let mut fragments = 0usize;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    fragments += 1;
                    debug!(fragment = fragments, bytes = fragment.len(), "Lesson fragment");
                    match run.push(&fragment) {
                        Ok(update) => on_update(&update),
                        Err(e) => return run.into_failure(e),
                    }
                }
                Err(e) => {
                    warn!(error = %e, fragments, "Lesson stream failed");
                    return run.into_failure(e.into());
                }
            }
        }

        match run.finalize() {
            Ok(finalized) => {
                info!(
                    fragments,
                    lesson_bytes = finalized.lesson.len(),
                    questions = finalized.quiz.len(),
                    quiz = ?finalized.quiz_status,
                    "Lesson stream finished"
                );
                LessonOutcome::Done(finalized)
            }
            Err(e) => run.into_failure(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tutor_genai::{ScriptedBackend, ScriptedStream};

    use super::*;

    const REFERENCE: &str = r#"LESSON_TEXT---QUIZ_START---[{"question":"Q","options":["a","b"],"correctAnswer":1}]"#;

    fn request() -> LessonRequest {
        LessonRequest {
            course_title: "Course".to_string(),
            module_title: "Module".to_string(),
            module_description: "About things".to_string(),
        }
    }

    fn processor(backend: &Arc<ScriptedBackend>) -> LessonStreamProcessor {
        LessonStreamProcessor::new(backend.clone())
    }

    fn unwrap_done(outcome: LessonOutcome) -> FinalizedLesson {
        match outcome {
            LessonOutcome::Done(finalized) => finalized,
            LessonOutcome::Failed { error, .. } => unreachable!("unexpected failure: {error}"),
        }
    }

    #[test]
    fn test_split_uses_first_separator() {
        let (lesson, quiz) = split_lesson("a---QUIZ_START---b---QUIZ_START---c");
        assert_eq!(lesson, "a");
        assert_eq!(quiz, Some("b---QUIZ_START---c"));

        assert_eq!(split_lesson("no quiz"), ("no quiz", None));
    }

    #[test]
    fn test_fragment_boundaries_do_not_matter() {
        for i in 0..=REFERENCE.len() {
            for j in i..=REFERENCE.len() {
                let mut run = LessonRun::new();
                run.push(&REFERENCE[..i]).unwrap();
                run.push(&REFERENCE[i..j]).unwrap();
                let view = run.push(&REFERENCE[j..]).unwrap();

                assert_eq!(view.lesson, "LESSON_TEXT", "split at {i}/{j}");
                let questions: Vec<QuizQuestion> =
                    serde_json::from_str(view.quiz_raw.as_deref().unwrap()).unwrap();
                assert_eq!(questions.len(), 1);
                assert_eq!(questions[0].correct_answer, 1);
            }
        }
    }

    #[test]
    fn test_views_while_separator_is_incomplete() {
        let mut run = LessonRun::new();
        let view = run.push("Intro ---QUIZ_").unwrap();
        assert_eq!(view.lesson, "Intro ---QUIZ_");
        assert!(view.quiz_raw.is_none());

        let view = run.push("START---[").unwrap();
        assert_eq!(view.lesson, "Intro ");
        assert_eq!(view.quiz_raw.as_deref(), Some("["));
    }

    #[test]
    fn test_no_separator_means_absent_quiz() {
        let mut run = LessonRun::new();
        run.push("# Just a lesson").unwrap();
        let finalized = run.finalize().unwrap();

        assert_eq!(finalized.lesson, "# Just a lesson");
        assert!(finalized.quiz.is_empty());
        assert_eq!(finalized.quiz_status, QuizStatus::Absent);
        assert_eq!(run.phase(), LessonPhase::Done);
    }

    #[test]
    fn test_malformed_quiz_still_completes() {
        let mut run = LessonRun::new();
        run.push("Lesson---QUIZ_START---not valid json").unwrap();
        let finalized = run.finalize().unwrap();

        assert_eq!(finalized.lesson, "Lesson");
        assert!(finalized.quiz.is_empty());
        assert_eq!(finalized.quiz_status, QuizStatus::Malformed);
    }

    #[test]
    fn test_code_fences_are_stripped() {
        let raw = "\n```json\n[{\"question\":\"Q\",\"options\":[\"a\",\"b\"],\"correctAnswer\":1,\"explanation\":\"because\"}]\n```\n";
        let (quiz, status) = parse_quiz(Some(raw));

        assert_eq!(status, QuizStatus::Parsed);
        assert_eq!(quiz[0].correct_answer, 1);
        assert_eq!(quiz[0].explanation.as_deref(), Some("because"));
    }

    #[test]
    fn test_empty_quiz_part_is_absent() {
        assert_eq!(parse_quiz(Some("")).1, QuizStatus::Absent);
        assert_eq!(parse_quiz(None).1, QuizStatus::Absent);
        assert_eq!(parse_quiz(Some("  ")).1, QuizStatus::Malformed);
    }

    #[test]
    fn test_illegal_transitions_are_rejected() {
        let mut run = LessonRun::new();
        run.push("text").unwrap();
        run.finalize().unwrap();

        assert!(matches!(
            run.push("more"),
            Err(TutorError::InvalidStateTransition { .. })
        ));
        assert!(run.finalize().is_err());
        assert!(run.fail().is_err());
        assert_eq!(run.buffer(), "text");
    }

    #[test]
    fn test_fail_keeps_lesson_view_and_appends_notice() {
        let mut run = LessonRun::new();
        run.push("Partial lesson---QUIZ_START---[{").unwrap();
        let lesson = run.fail().unwrap();

        assert_eq!(
            lesson,
            "Partial lesson\n\n**Error loading lesson content. Please try again.**"
        );
        assert_eq!(run.phase(), LessonPhase::Failed);
        assert!(run.push("x").is_err());
    }

    #[tokio::test]
    async fn test_processor_delivers_every_update_in_order() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stream(ScriptedStream::fragments([
            "Hello ",
            "world---QUIZ",
            "_START---[]",
        ]));

        let mut updates = Vec::new();
        let outcome = processor(&backend)
            .run(&request(), |u| updates.push(u.clone()))
            .await;
        let finalized = unwrap_done(outcome);

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].lesson, "Hello ");
        assert_eq!(updates[1].lesson, "Hello world---QUIZ");
        assert_eq!(updates[2].lesson, "Hello world");
        assert_eq!(updates[2].quiz_raw.as_deref(), Some("[]"));

        assert_eq!(finalized.lesson, "Hello world");
        assert_eq!(finalized.quiz_status, QuizStatus::Parsed);
        assert!(finalized.quiz.is_empty());

        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("\"Module\""));
        assert!(prompt.contains("\"Course\""));
        assert!(prompt.contains("About things"));
    }

    #[tokio::test]
    async fn test_processor_mid_stream_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stream(ScriptedStream::failing_after(
            ["Part one. ", "Part two."],
            "connection reset",
        ));

        let outcome = processor(&backend).run(&request(), |_| {}).await;
        match outcome {
            LessonOutcome::Failed { lesson, error } => {
                assert_eq!(lesson, format!("Part one. Part two.{LESSON_ERROR_NOTICE}"));
                assert!(error.to_string().contains("connection reset"));
            }
            LessonOutcome::Done(_) => unreachable!("stream should fail"),
        }
    }

    #[tokio::test]
    async fn test_processor_rejected_request() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stream(ScriptedStream::rejected("permission denied"));

        let mut called = false;
        let outcome = processor(&backend)
            .run(&request(), |_| called = true)
            .await;

        assert!(!called);
        match outcome {
            LessonOutcome::Failed { lesson, error } => {
                assert_eq!(lesson, LESSON_ERROR_NOTICE);
                assert!(error.is_generation_failure());
            }
            LessonOutcome::Done(_) => unreachable!("request should be rejected"),
        }
    }
}
