//! AI Tutor core
//!
//! Turns a topic into a course, streams each module's lesson and quiz on
//! first open, grades quizzes, and persists progress. Exposes the same
//! session over an HTTP API and WebSocket event stream.

pub mod api;
pub mod config;
pub mod course;
pub mod error;
pub mod lesson;
pub mod prompt;
pub mod quiz;
pub mod session;
pub mod store;
pub mod syllabus;
pub mod websocket;

pub use api::{
    create_router, AppState, CreateCourseRequest, ErrorResponse, OpenModuleResponse, QuizRequest,
    ThemeBody,
};
pub use config::{Config, ProviderConfig, ServerConfig};
pub use course::{Course, CourseProgress, Module, ModuleProgress, QuizQuestion, Theme};
pub use error::{Result, TutorError};
pub use lesson::{
    FinalizedLesson, LessonOutcome, LessonPhase, LessonRequest, LessonRun, LessonStreamProcessor,
    LessonUpdate, QuizStatus, LESSON_ERROR_NOTICE, QUIZ_SEPARATOR,
};
pub use quiz::QuizResult;
pub use session::{ActiveLesson, LessonHandle, ModuleOpening, QuizSubmission, Session};
pub use store::CourseStore;
pub use syllabus::SyllabusRequester;
pub use websocket::{EventBroadcaster, TutorEvent};
