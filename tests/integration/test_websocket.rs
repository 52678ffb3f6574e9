//! Integration tests for WebSocket event streaming.
//!
//! These tests validate the connection snapshot, the ordering of lesson
//! events, and broadcasting to concurrent clients.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tutor_core::{
    create_router, AppState, CourseStore, QuizStatus, Session, Theme, TutorEvent,
};
use tutor_genai::{ScriptedBackend, ScriptedStream};

const SYLLABUS: &str = r#"{"title": "Go Basics", "description": "Goroutines and more",
    "modules": [{"title": "Goroutines", "description": "Lightweight threads"}]}"#;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    ws_url: String,
    backend: Arc<ScriptedBackend>,
    state: AppState,
    _dir: tempfile::TempDir,
    _handle: tokio::task::JoinHandle<()>,
}

/// Spawns the test server on an ephemeral port.
async fn spawn_test_server() -> TestServer {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = Arc::new(ScriptedBackend::new());
    let store = CourseStore::empty(dir.path(), Theme::Dark);
    let state = AppState::new(Session::new(backend.clone(), store, 60.0));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    let router = create_router(state.clone());

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    TestServer {
        ws_url: format!("ws://{addr}/ws"),
        backend,
        state,
        _dir: dir,
        _handle: handle,
    }
}

/// Connects a WebSocket client to the given URL.
async fn connect_client(url: &str) -> WsClient {
    let (ws_stream, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message from the WebSocket and parses it as a
/// `TutorEvent`. Answers pings along the way.
async fn receive_event(client: &mut WsClient) -> TutorEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Connects and consumes the initial `connected` snapshot.
async fn connect_ready(url: &str) -> WsClient {
    let mut client = connect_client(url).await;
    let event = receive_event(&mut client).await;
    assert_eq!(event.event_name(), "connected");
    client
}

// ============================================================================
// Connection Tests
// ============================================================================

#[tokio::test]
async fn test_connected_event_contains_snapshot() {
    let server = spawn_test_server().await;
    server.backend.push_structured(SYLLABUS);
    let course = server
        .state
        .session
        .create_course("go")
        .await
        .expect("Failed to create course");

    let mut client = connect_client(&server.ws_url).await;
    match receive_event(&mut client).await {
        TutorEvent::Connected(payload) => {
            assert_eq!(payload.theme, Theme::Dark);
            assert_eq!(payload.courses.len(), 1);
            assert_eq!(payload.courses[0].id, course.id);
            assert!(payload.active_lesson.is_none());
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_connected_event_reports_active_lesson() {
    let server = spawn_test_server().await;
    server.backend.push_structured(SYLLABUS);
    let course = server
        .state
        .session
        .create_course("go")
        .await
        .expect("Failed to create course");
    let module_id = course.modules[0].id.clone();

    let (held, release) = ScriptedStream::fragments(["# Goroutines"]).held();
    server.backend.push_stream(held);
    let _opening = server
        .state
        .session
        .open_module(&course.id, &module_id)
        .await
        .expect("Failed to open module");

    let mut client = connect_client(&server.ws_url).await;
    match receive_event(&mut client).await {
        TutorEvent::Connected(payload) => {
            let active = payload.active_lesson.expect("Expected an active lesson");
            assert_eq!(active.course_id, course.id);
            assert_eq!(active.module_id, module_id);
        }
        other => panic!("Expected Connected event, got: {other:?}"),
    }
    release.release();
}

// ============================================================================
// Lesson Event Tests
// ============================================================================

#[tokio::test]
async fn test_lesson_events_arrive_in_order() {
    let server = spawn_test_server().await;
    server.backend.push_structured(SYLLABUS);
    let course = server
        .state
        .session
        .create_course("go")
        .await
        .expect("Failed to create course");
    let module_id = course.modules[0].id.clone();

    let mut client = connect_ready(&server.ws_url).await;

    server.backend.push_stream(ScriptedStream::fragments([
        "# Goroutines\n",
        "Use `go f()`.---QUIZ_START---",
        "not valid json",
    ]));
    let _opening = server
        .state
        .session
        .open_module(&course.id, &module_id)
        .await
        .expect("Failed to open module");

    match receive_event(&mut client).await {
        TutorEvent::LessonStarted(payload) => assert_eq!(payload.module_id, module_id),
        other => panic!("Expected LessonStarted, got: {other:?}"),
    }

    let mut lessons = Vec::new();
    let completed = loop {
        match receive_event(&mut client).await {
            TutorEvent::LessonProgress(payload) => lessons.push(payload.update),
            TutorEvent::LessonCompleted(payload) => break payload,
            other => panic!("Unexpected event: {other:?}"),
        }
    };

    assert_eq!(lessons.len(), 3);
    assert_eq!(lessons[0].lesson, "# Goroutines\n");
    assert!(lessons[0].quiz_raw.is_none());
    assert_eq!(lessons[1].lesson, "# Goroutines\nUse `go f()`.");
    assert_eq!(lessons[1].quiz_raw.as_deref(), Some(""));
    assert_eq!(lessons[2].quiz_raw.as_deref(), Some("not valid json"));

    // The malformed quiz is dropped; the lesson is still cached
    assert_eq!(completed.quiz_status, QuizStatus::Malformed);
    assert_eq!(
        completed.module.content.as_deref(),
        Some("# Goroutines\nUse `go f()`.")
    );
    assert!(completed.module.quiz_questions().is_empty());
}

#[tokio::test]
async fn test_rejected_stream_sends_failure_event() {
    let server = spawn_test_server().await;
    server.backend.push_structured(SYLLABUS);
    let course = server
        .state
        .session
        .create_course("go")
        .await
        .expect("Failed to create course");

    let mut client = connect_ready(&server.ws_url).await;

    server
        .backend
        .push_stream(ScriptedStream::rejected("quota exceeded"));
    let _opening = server
        .state
        .session
        .open_module(&course.id, &course.modules[0].id)
        .await
        .expect("Failed to open module");

    assert_eq!(receive_event(&mut client).await.event_name(), "lesson_started");
    match receive_event(&mut client).await {
        TutorEvent::LessonFailed(payload) => {
            assert!(payload.message.contains("quota exceeded"));
            assert!(payload.lesson.contains("Error loading lesson content"));
        }
        other => panic!("Expected LessonFailed, got: {other:?}"),
    }
}

// ============================================================================
// Multiple Client Tests
// ============================================================================

#[tokio::test]
async fn test_theme_change_reaches_all_clients() {
    let server = spawn_test_server().await;

    let mut client1 = connect_ready(&server.ws_url).await;
    let mut client2 = connect_ready(&server.ws_url).await;

    let http_url = server.ws_url.replace("ws://", "http://").replace("/ws", "/api/theme");
    let response = reqwest::Client::new()
        .put(http_url)
        .json(&json!({"theme": "light"}))
        .send()
        .await
        .expect("Request failed");
    assert_eq!(response.status(), 200);

    for client in [&mut client1, &mut client2] {
        match receive_event(client).await {
            TutorEvent::ThemeChanged(payload) => assert_eq!(payload.theme, Theme::Light),
            other => panic!("Expected ThemeChanged, got: {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_course_lifecycle_events() {
    let server = spawn_test_server().await;
    let mut client = connect_ready(&server.ws_url).await;

    server.backend.push_structured(SYLLABUS);
    let course = server
        .state
        .session
        .create_course("go")
        .await
        .expect("Failed to create course");
    match receive_event(&mut client).await {
        TutorEvent::CourseCreated(payload) => assert_eq!(payload.course.id, course.id),
        other => panic!("Expected CourseCreated, got: {other:?}"),
    }

    server
        .state
        .session
        .delete_course(&course.id)
        .await
        .expect("Failed to delete course");
    match receive_event(&mut client).await {
        TutorEvent::CourseDeleted(payload) => assert_eq!(payload.course_id, course.id),
        other => panic!("Expected CourseDeleted, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_client_disconnect_does_not_affect_others() {
    let server = spawn_test_server().await;

    let client1 = connect_ready(&server.ws_url).await;
    let mut client2 = connect_ready(&server.ws_url).await;
    drop(client1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    server
        .state
        .session
        .toggle_theme()
        .await
        .expect("Failed to toggle theme");

    match receive_event(&mut client2).await {
        TutorEvent::ThemeChanged(payload) => assert_eq!(payload.theme, Theme::Light),
        other => panic!("Expected ThemeChanged, got: {other:?}"),
    }
}
