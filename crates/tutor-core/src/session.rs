//! Session orchestration.
//!
//! A [`Session`] owns the course store and wires the syllabus requester and
//! lesson processor to it. It enforces the two lesson rules:
//!
//! - a module whose lesson is cached is served from the store without
//!   calling the generation backend
//! - only one lesson streams at a time; a second stream is rejected with
//!   `StreamInProgress` before any backend call
//!
//! Every successful mutation is saved and broadcast as a [`TutorEvent`].

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tutor_genai::GenerationBackend;

use crate::config::Config;
use crate::course::{Course, CourseProgress, Module, Theme};
use crate::error::{Result, TutorError};
use crate::lesson::{
    FinalizedLesson, LessonOutcome, LessonRequest, LessonStreamProcessor, LessonUpdate,
};
use crate::quiz::{self, QuizResult};
use crate::store::CourseStore;
use crate::syllabus::SyllabusRequester;
use crate::websocket::{ConnectedPayload, EventBroadcaster, TutorEvent};

/// The lesson currently being streamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLesson {
    /// Course of the module.
    pub course_id: String,
    /// Module being taught.
    pub module_id: String,
}

type FlightSlot = Arc<StdMutex<Option<ActiveLesson>>>;

/// Holds the single lesson slot; releases it when dropped.
///
/// The guard moves into the lesson task, so the slot frees up whether the
/// task finishes or is aborted.
#[derive(Debug)]
struct FlightGuard {
    slot: FlightSlot,
}

impl FlightGuard {
    fn acquire(slot: &FlightSlot, lesson: ActiveLesson) -> Result<Self> {
        let mut current = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = current.as_ref() {
            return Err(TutorError::stream_in_progress(&active.module_id));
        }
        *current = Some(lesson);
        Ok(Self {
            slot: Arc::clone(slot),
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Result of opening a module.
#[derive(Debug)]
pub enum ModuleOpening {
    /// The lesson was already cached; no generation happened.
    Cached(Module),
    /// A lesson stream was started.
    Streaming(LessonHandle),
}

/// Observes and controls a running lesson stream.
#[derive(Debug)]
pub struct LessonHandle {
    lesson: ActiveLesson,
    updates: watch::Receiver<LessonUpdate>,
    task: JoinHandle<Result<LessonOutcome>>,
}

impl LessonHandle {
    /// The course and module being taught.
    #[must_use]
    pub const fn lesson(&self) -> &ActiveLesson {
        &self.lesson
    }

    /// A receiver that always holds the latest views.
    ///
    /// `changed()` returns an error once the stream has ended.
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<LessonUpdate> {
        self.updates.clone()
    }

    /// The latest views.
    #[must_use]
    pub fn current(&self) -> LessonUpdate {
        self.updates.borrow().clone()
    }

    /// Waits for the stream to end and returns its outcome.
    ///
    /// A `Done` outcome has already been committed to the store.
    ///
    /// # Errors
    ///
    /// Returns `LessonTaskFailed` if the task panicked or was aborted, or
    /// the persistence error that prevented the commit.
    pub async fn finish(self) -> Result<LessonOutcome> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(TutorError::LessonTaskFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Stops the stream without committing anything.
    ///
    /// Returns once the lesson slot has been released.
    pub async fn abandon(self) {
        self.task.abort();
        let _ = self.task.await;
        info!(
            course_id = %self.lesson.course_id,
            module_id = %self.lesson.module_id,
            "Lesson stream abandoned"
        );
    }
}

/// A graded quiz submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    /// The grading result.
    pub result: QuizResult,
    /// The module after recording the score.
    pub module: Module,
}

/// The orchestration layer shared by the CLI and the HTTP API.
pub struct Session {
    store: Arc<Mutex<CourseStore>>,
    syllabus: SyllabusRequester,
    processor: LessonStreamProcessor,
    broadcaster: EventBroadcaster,
    active: FlightSlot,
    passing_score: f64,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("passing_score", &self.passing_score)
            .field("active", &self.active_lesson())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over an already loaded store.
    #[must_use]
    pub fn new(backend: Arc<dyn GenerationBackend>, store: CourseStore, passing_score: f64) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            syllabus: SyllabusRequester::new(Arc::clone(&backend)),
            processor: LessonStreamProcessor::new(backend),
            broadcaster: EventBroadcaster::default(),
            active: Arc::new(StdMutex::new(None)),
            passing_score,
        }
    }

    /// Loads the store from the configured data directory and creates a session.
    ///
    /// # Errors
    ///
    /// Returns the store's load error.
    pub async fn from_config(config: &Config, backend: Arc<dyn GenerationBackend>) -> Result<Self> {
        let store = CourseStore::load(config.data_path(), config.theme).await?;
        Ok(Self::new(backend, store, config.passing_score))
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TutorEvent> {
        self.broadcaster.subscribe()
    }

    /// The event broadcaster.
    #[must_use]
    pub const fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    /// The minimum quiz percentage that completes a module.
    #[must_use]
    pub const fn passing_score(&self) -> f64 {
        self.passing_score
    }

    /// The lesson currently streaming, if any.
    #[must_use]
    pub fn active_lesson(&self) -> Option<ActiveLesson> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds the `connected` event describing the current state.
    pub async fn snapshot(&self) -> TutorEvent {
        let store = self.store.lock().await;
        TutorEvent::Connected(ConnectedPayload {
            courses: store.courses().to_vec(),
            theme: store.theme(),
            active_lesson: self.active_lesson(),
        })
    }

    /// All courses, in creation order.
    pub async fn courses(&self) -> Vec<Course> {
        self.store.lock().await.courses().to_vec()
    }

    /// One course by id.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`.
    pub async fn course(&self, course_id: &str) -> Result<Course> {
        self.store.lock().await.get(course_id).cloned()
    }

    /// One course by id or 1-based position.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`.
    pub async fn resolve_course(&self, selector: &str) -> Result<Course> {
        self.store.lock().await.resolve(selector).cloned()
    }

    /// Completion summary of a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`.
    pub async fn progress(&self, course_id: &str) -> Result<CourseProgress> {
        Ok(self.store.lock().await.get(course_id)?.progress())
    }

    /// The theme preference.
    pub async fn theme(&self) -> Theme {
        self.store.lock().await.theme()
    }

    /// Generates, stores and announces a new course.
    ///
    /// # Errors
    ///
    /// Returns `EmptyTopic` for a blank topic, a generation failure if the
    /// syllabus could not be produced, or a persistence error.
    pub async fn create_course(&self, topic: &str) -> Result<Course> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TutorError::EmptyTopic);
        }

        let course = self.syllabus.request_syllabus(topic).await?;

        self.store
            .lock()
            .await
            .update_courses(|store| {
                store.add_course(course.clone());
                Ok(())
            })
            .await?;

        info!(course_id = %course.id, modules = course.modules.len(), "Course created");
        self.broadcaster
            .send(TutorEvent::course_created(course.clone()));
        Ok(course)
    }

    /// Deletes a course.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound` or a persistence error.
    pub async fn delete_course(&self, course_id: &str) -> Result<Course> {
        let course = self
            .store
            .lock()
            .await
            .update_courses(|store| store.delete_course(course_id))
            .await?;

        self.broadcaster.send(TutorEvent::course_deleted(&course.id));
        Ok(course)
    }

    /// Opens a module, serving its cached lesson or starting a stream.
    ///
    /// A started stream runs on its own task; it commits the lesson and quiz
    /// to the store when it completes, even if the returned handle is dropped.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`, `ModuleNotFound`, or `StreamInProgress` if
    /// another lesson is streaming.
    pub async fn open_module(&self, course_id: &str, module_id: &str) -> Result<ModuleOpening> {
        let lesson = ActiveLesson {
            course_id: course_id.to_string(),
            module_id: module_id.to_string(),
        };

        // Acquired under the store lock; a commit attaches the lesson before
        // it frees the slot.
        let (request, guard) = {
            let store = self.store.lock().await;
            let course = store.get(course_id)?;
            let module = course
                .module(module_id)
                .ok_or_else(|| TutorError::module_not_found(course_id, module_id))?;

            if module.has_lesson() {
                info!(course_id, module_id, "Serving cached lesson");
                return Ok(ModuleOpening::Cached(module.clone()));
            }

            let guard = FlightGuard::acquire(&self.active, lesson.clone()).inspect_err(|_| {
                warn!(course_id, module_id, "Rejected lesson: another stream is active");
            })?;
            let request = LessonRequest {
                course_title: course.title.clone(),
                module_title: module.title.clone(),
                module_description: module.description.clone(),
            };
            (request, guard)
        };

        self.broadcaster
            .send(TutorEvent::lesson_started(course_id, module_id));

        let (tx, rx) = watch::channel(LessonUpdate::default());
        let store = Arc::clone(&self.store);
        let processor = self.processor.clone();
        let broadcaster = self.broadcaster.clone();
        let target = lesson.clone();

        let task = tokio::spawn(async move {
            let outcome = processor
                .run(&request, |update| {
                    tx.send_replace(update.clone());
                    broadcaster.send(TutorEvent::lesson_progress(
                        &target.course_id,
                        &target.module_id,
                        update.clone(),
                    ));
                })
                .await;
            commit_lesson(&store, &broadcaster, &target, guard, outcome).await
        });

        Ok(ModuleOpening::Streaming(LessonHandle {
            lesson,
            updates: rx,
            task,
        }))
    }

    /// Grades a quiz submission and records the score.
    ///
    /// # Errors
    ///
    /// Returns `CourseNotFound`, `ModuleNotFound`, `QuizUnavailable` if the
    /// module has no quiz, `IncompleteAnswers`, `InvalidAnswer`, or a persistence
    /// error. A failed save leaves the recorded score unchanged.
    pub async fn submit_quiz(
        &self,
        course_id: &str,
        module_id: &str,
        answers: &[i64],
    ) -> Result<QuizSubmission> {
        let submission = {
            let mut store = self.store.lock().await;
            let questions = store
                .get(course_id)?
                .module(module_id)
                .ok_or_else(|| TutorError::module_not_found(course_id, module_id))?
                .quiz_questions();
            if questions.is_empty() {
                return Err(TutorError::quiz_unavailable(module_id));
            }

            let result = quiz::score(questions, answers, self.passing_score)?;
            let module = store
                .update_courses(|store| store.record_quiz_score(course_id, module_id, &result))
                .await?;
            QuizSubmission { result, module }
        };

        info!(
            course_id,
            module_id,
            correct = submission.result.correct,
            total = submission.result.total,
            percent = submission.result.percent,
            "Quiz scored"
        );
        self.broadcaster.send(TutorEvent::quiz_scored(
            course_id,
            module_id,
            submission.result,
            submission.module.completed(),
        ));
        Ok(submission)
    }

    /// Sets and persists the theme preference.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn set_theme(&self, theme: Theme) -> Result<Theme> {
        self.store.lock().await.update_theme(theme).await?;
        self.broadcaster.send(TutorEvent::theme_changed(theme));
        Ok(theme)
    }

    /// Switches between dark and light.
    ///
    /// # Errors
    ///
    /// Returns a persistence error.
    pub async fn toggle_theme(&self) -> Result<Theme> {
        let next = self.theme().await.toggled();
        self.set_theme(next).await
    }
}

/// Commits a finished lesson and announces the outcome.
///
/// The lesson slot is released before the terminal event is sent, so an
/// observer may open the next module as soon as it sees the event. A lesson
/// that cannot be saved is announced as failed and left uncached.
async fn commit_lesson(
    store: &Mutex<CourseStore>,
    broadcaster: &EventBroadcaster,
    target: &ActiveLesson,
    guard: FlightGuard,
    outcome: LessonOutcome,
) -> Result<LessonOutcome> {
    match &outcome {
        LessonOutcome::Done(finalized) => {
            let committed = attach_lesson(store, target, finalized).await;
            drop(guard);
            match committed {
                Ok(module) => {
                    broadcaster.send(TutorEvent::lesson_completed(
                        &target.course_id,
                        module,
                        finalized.quiz_status,
                    ));
                }
                Err(e) => {
                    error!(error = %e, module_id = %target.module_id, "Failed to save lesson");
                    broadcaster.send(TutorEvent::lesson_failed(
                        &target.course_id,
                        &target.module_id,
                        finalized.lesson.clone(),
                        e.to_string(),
                    ));
                    return Err(e);
                }
            }
        }
        LessonOutcome::Failed { lesson, error } => {
            warn!(
                course_id = %target.course_id,
                module_id = %target.module_id,
                error = %error,
                "Lesson failed; nothing cached"
            );
            drop(guard);
            broadcaster.send(TutorEvent::lesson_failed(
                &target.course_id,
                &target.module_id,
                lesson.clone(),
                error.to_string(),
            ));
        }
    }
    Ok(outcome)
}

async fn attach_lesson(
    store: &Mutex<CourseStore>,
    target: &ActiveLesson,
    finalized: &FinalizedLesson,
) -> Result<Module> {
    let mut store = store.lock().await;
    store
        .update_courses(|store| {
            store.attach_module_result(&target.course_id, &target.module_id, finalized)
        })
        .await?;
    store
        .get(&target.course_id)?
        .module(&target.module_id)
        .cloned()
        .ok_or_else(|| TutorError::module_not_found(&target.course_id, &target.module_id))
}
