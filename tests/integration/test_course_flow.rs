//! End-to-end tests for the course workflow over the HTTP API.
//!
//! A scripted generation backend stands in for the real service, so these
//! tests run without network access or an API key.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tutor_core::{
    create_router, AppState, Course, CourseProgress, CourseStore, Session, Theme, TutorEvent,
    LESSON_ERROR_NOTICE,
};
use tutor_genai::{ScriptedBackend, ScriptedStream};
use tutor_report::{MarkdownGenerator, Report};

const SYLLABUS: &str = r#"{
    "title": "Rust Essentials",
    "description": "From ownership to lifetimes",
    "modules": [
        {"title": "Ownership", "description": "Moves and drops"},
        {"title": "Borrowing", "description": "Shared and mutable references"}
    ]
}"#;

const QUIZ: &str = r#"[
    {"question": "Who frees a Box?", "options": ["GC", "Owner", "Caller"], "correctAnswer": 1},
    {"question": "Can a value have two owners?", "options": ["No", "Yes"], "correctAnswer": 0},
    {"question": "What does drop run?", "options": ["new", "clone", "Drop::drop"], "correctAnswer": 2}
]"#;

/// A running server plus handles to drive and observe it.
struct TestServer {
    base_url: String,
    backend: Arc<ScriptedBackend>,
    state: AppState,
    client: reqwest::Client,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start(data_dir: &Path) -> Self {
        let backend = Arc::new(ScriptedBackend::new());
        let store = CourseStore::load(data_dir, Theme::Dark)
            .await
            .expect("Failed to load store");
        let session = Session::new(backend.clone(), store, 60.0);
        let state = AppState::new(session);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get local addr");
        let router = create_router(state.clone());

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            backend,
            state,
            client: reqwest::Client::new(),
            _handle: handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn events(&self) -> broadcast::Receiver<TutorEvent> {
        self.state.session.subscribe()
    }

    async fn create_course(&self) -> Course {
        self.backend.push_structured(SYLLABUS);
        let response = self
            .client
            .post(self.url("/courses"))
            .json(&json!({"topic": "Rust"}))
            .send()
            .await
            .expect("Request failed");
        assert_eq!(response.status(), 201);
        response.json().await.expect("Invalid course body")
    }

    async fn open(&self, course_id: &str, module_id: &str) -> reqwest::Response {
        self.client
            .post(self.url(&format!(
                "/courses/{course_id}/modules/{module_id}/open"
            )))
            .send()
            .await
            .expect("Request failed")
    }

    async fn submit(&self, course_id: &str, module_id: &str, answers: &[i64]) -> reqwest::Response {
        self.client
            .post(self.url(&format!(
                "/courses/{course_id}/modules/{module_id}/quiz"
            )))
            .json(&json!({ "answers": answers }))
            .send()
            .await
            .expect("Request failed")
    }
}

/// Waits for the named event, skipping others.
async fn wait_for(events: &mut broadcast::Receiver<TutorEvent>, name: &str) -> TutorEvent {
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.expect("Event channel closed");
            if event.event_name() == name {
                return event;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("Timeout waiting for {name}"))
}

fn lesson_with_quiz(lesson: &str) -> String {
    format!("{lesson}---QUIZ_START---{QUIZ}")
}

/// Creates a course, streams a lesson, serves it from cache, passes the quiz
/// and checks progress and the report.
#[tokio::test]
async fn test_full_course_flow() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = TestServer::start(dir.path()).await;

    let course = server.create_course().await;
    assert_eq!(course.title, "Rust Essentials");
    assert_eq!(course.modules.len(), 2);
    let module_id = course.modules[0].id.clone();

    // First open streams
    let mut events = server.events();
    server.backend.push_stream(ScriptedStream::fragments([
        "# Ownership\n\nEvery value has",
        " one owner.---QUIZ_",
        &format!("START---{QUIZ}"),
    ]));
    let response = server.open(&course.id, &module_id).await;
    assert_eq!(response.status(), 202);
    let body: Value = response.json().await.expect("Invalid body");
    assert_eq!(body["status"], "streaming");
    assert_eq!(body["moduleId"], module_id.as_str());

    match wait_for(&mut events, "lesson_completed").await {
        TutorEvent::LessonCompleted(payload) => {
            assert_eq!(
                payload.module.content.as_deref(),
                Some("# Ownership\n\nEvery value has one owner.")
            );
            assert_eq!(payload.module.quiz_questions().len(), 3);
        }
        other => panic!("Expected LessonCompleted, got: {other:?}"),
    }

    // Second open is served from the cache
    let response = server.open(&course.id, &module_id).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("Invalid body");
    assert_eq!(body["status"], "cached");
    assert_eq!(body["module"]["quiz"][0]["correctAnswer"], 1);
    assert_eq!(server.backend.stream_calls(), 1);

    // Two of three correct passes at 60%
    let response = server.submit(&course.id, &module_id, &[1, 1, 2]).await;
    assert_eq!(response.status(), 200);
    let submission: Value = response.json().await.expect("Invalid body");
    assert_eq!(submission["result"]["correct"], 2);
    assert_eq!(submission["result"]["passed"], true);
    assert_eq!(submission["module"]["isCompleted"], true);

    // A later failing attempt does not undo completion
    let response = server.submit(&course.id, &module_id, &[0, 1, 0]).await;
    assert_eq!(response.status(), 200);
    let submission: Value = response.json().await.expect("Invalid body");
    assert_eq!(submission["result"]["passed"], false);
    assert_eq!(submission["module"]["isCompleted"], true);

    let progress: CourseProgress = server
        .client
        .get(server.url(&format!("/courses/{}/progress", course.id)))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid progress body");
    assert_eq!(progress.total_modules, 2);
    assert_eq!(progress.completed_modules, 1);
    assert_eq!(progress.percent, 50);

    let stored = server
        .state
        .session
        .course(&course.id)
        .await
        .expect("Course missing");
    let report = Report::from_course(&stored).expect("Failed to build report");
    let markdown = MarkdownGenerator::new(&report).generate();
    assert!(markdown.contains("| 1 | Ownership | ✓ Completed | 3 | 0% |"));
    assert!(markdown.contains("| 2 | Borrowing | ○ Not started | 0 | - |"));
}

/// Courses, lessons, scores and the theme survive a restart.
#[tokio::test]
async fn test_progress_survives_restart() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let course_id;
    {
        let server = TestServer::start(dir.path()).await;
        let course = server.create_course().await;
        course_id = course.id.clone();
        let module_id = course.modules[0].id.clone();

        let mut events = server.events();
        server
            .backend
            .push_stream(ScriptedStream::fragments([lesson_with_quiz("# Saved")]));
        assert_eq!(server.open(&course.id, &module_id).await.status(), 202);
        wait_for(&mut events, "lesson_completed").await;

        assert_eq!(
            server.submit(&course.id, &module_id, &[1, 0, 2]).await.status(),
            200
        );

        let response = server
            .client
            .put(server.url("/theme"))
            .json(&json!({"theme": "light"}))
            .send()
            .await
            .expect("Request failed");
        assert_eq!(response.status(), 200);
    }

    let store = CourseStore::load(dir.path(), Theme::Dark)
        .await
        .expect("Failed to reload store");
    assert_eq!(store.theme(), Theme::Light);
    let course = store.course(&course_id).expect("Course not persisted");
    assert_eq!(course.modules[0].content.as_deref(), Some("# Saved"));
    assert_eq!(course.modules[0].quiz_score, Some(100.0));
    assert!(course.modules[0].completed());
    assert!(!course.modules[1].has_lesson());
}

/// A failed stream leaves nothing cached and the next open retries.
#[tokio::test]
async fn test_failed_stream_can_be_retried() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = TestServer::start(dir.path()).await;
    let course = server.create_course().await;
    let module_id = course.modules[1].id.clone();

    let mut events = server.events();
    server.backend.push_stream(ScriptedStream::failing_after(
        ["# Borrowing\n\nPartial"],
        "connection reset",
    ));
    assert_eq!(server.open(&course.id, &module_id).await.status(), 202);

    match wait_for(&mut events, "lesson_failed").await {
        TutorEvent::LessonFailed(payload) => {
            assert_eq!(
                payload.lesson,
                format!("# Borrowing\n\nPartial{LESSON_ERROR_NOTICE}")
            );
            assert!(payload.message.contains("connection reset"));
        }
        other => panic!("Expected LessonFailed, got: {other:?}"),
    }

    // Nothing was cached, so there is no quiz to submit
    assert_eq!(server.submit(&course.id, &module_id, &[0]).await.status(), 409);

    server
        .backend
        .push_stream(ScriptedStream::fragments([lesson_with_quiz("# Borrowing")]));
    assert_eq!(server.open(&course.id, &module_id).await.status(), 202);
    wait_for(&mut events, "lesson_completed").await;

    assert_eq!(server.open(&course.id, &module_id).await.status(), 200);
    assert_eq!(server.backend.stream_calls(), 2);
}

/// Only one lesson streams at a time; the second open is rejected without
/// touching the backend.
#[tokio::test]
async fn test_single_lesson_in_flight() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = TestServer::start(dir.path()).await;
    let course = server.create_course().await;

    let mut events = server.events();
    let (held, release) = ScriptedStream::fragments([lesson_with_quiz("# One")]).held();
    server.backend.push_stream(held);

    assert_eq!(
        server.open(&course.id, &course.modules[0].id).await.status(),
        202
    );
    let response = server.open(&course.id, &course.modules[1].id).await;
    assert_eq!(response.status(), 409);
    let body: Value = response.json().await.expect("Invalid body");
    assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    assert_eq!(server.backend.stream_calls(), 1);

    release.release();
    wait_for(&mut events, "lesson_completed").await;

    server
        .backend
        .push_stream(ScriptedStream::fragments([lesson_with_quiz("# Two")]));
    assert_eq!(
        server.open(&course.id, &course.modules[1].id).await.status(),
        202
    );
    assert_eq!(server.backend.stream_calls(), 2);
}

/// Errors map to the expected status codes.
#[tokio::test]
async fn test_error_statuses() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let server = TestServer::start(dir.path()).await;

    let response = server
        .client
        .post(server.url("/courses"))
        .json(&json!({"topic": ""}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 400);

    server.backend.push_structured("not json at all");
    let response = server
        .client
        .post(server.url("/courses"))
        .json(&json!({"topic": "Rust"}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 502);

    let response = server
        .client
        .get(server.url("/courses/missing"))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 404);

    let courses: Vec<Course> = server
        .client
        .get(server.url("/courses"))
        .send()
        .await
        .expect("Request failed")
        .json()
        .await
        .expect("Invalid body");
    assert!(courses.is_empty(), "failed creations must not persist");
}
