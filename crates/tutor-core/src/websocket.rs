//! WebSocket event types and broadcasting for observing a tutor session.
//!
//! Every state change a front end cares about is broadcast as a
//! [`TutorEvent`]. Events are JSON objects with `event` and `payload` fields.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes courses and theme
//! - `course_created` / `course_deleted` - Course list changed
//! - `lesson_started` - A lesson stream began
//! - `lesson_progress` - The lesson and quiz views changed
//! - `lesson_completed` - The lesson was cached on its module
//! - `lesson_failed` - The stream failed; partial lesson plus notice
//! - `quiz_scored` - A quiz submission was graded
//! - `theme_changed` - The theme preference changed

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{interval_at, Instant};
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::course::{Course, Module, Theme};
use crate::lesson::{LessonUpdate, QuizStatus};
use crate::quiz::QuizResult;
use crate::session::{ActiveLesson, Session};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    /// Every stored course.
    pub courses: Vec<Course>,
    /// The current theme.
    pub theme: Theme,
    /// The lesson currently streaming, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_lesson: Option<ActiveLesson>,
}

/// Payload for the `course_created` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseCreatedPayload {
    /// The new course.
    pub course: Course,
}

/// Payload for the `course_deleted` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseDeletedPayload {
    /// The removed course.
    pub course_id: String,
}

/// Payload for the `lesson_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStartedPayload {
    /// Course of the module being taught.
    pub course_id: String,
    /// Module being taught.
    pub module_id: String,
    /// When the stream started.
    pub timestamp: DateTime<Utc>,
}

/// Payload for the `lesson_progress` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressPayload {
    /// Course of the module being taught.
    pub course_id: String,
    /// Module being taught.
    pub module_id: String,
    /// The current views.
    #[serde(flatten)]
    pub update: LessonUpdate,
}

/// Payload for the `lesson_completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCompletedPayload {
    /// Course of the module.
    pub course_id: String,
    /// The module with its cached lesson and quiz.
    pub module: Module,
    /// How the quiz part was interpreted.
    pub quiz_status: QuizStatus,
}

/// Payload for the `lesson_failed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonFailedPayload {
    /// Course of the module.
    pub course_id: String,
    /// Module whose lesson failed.
    pub module_id: String,
    /// The partial lesson followed by the error notice.
    pub lesson: String,
    /// Human-readable error message.
    pub message: String,
}

/// Payload for the `quiz_scored` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScoredPayload {
    /// Course of the module.
    pub course_id: String,
    /// Module whose quiz was graded.
    pub module_id: String,
    /// The grading result.
    pub result: QuizResult,
    /// Completion after recording the score.
    pub is_completed: bool,
}

/// Payload for the `theme_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeChangedPayload {
    /// The new theme.
    pub theme: Theme,
}

// ============================================================================
// Event Enum
// ============================================================================

/// WebSocket event types for session observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum TutorEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A course was created.
    CourseCreated(CourseCreatedPayload),
    /// A course was deleted.
    CourseDeleted(CourseDeletedPayload),
    /// A lesson stream began.
    LessonStarted(LessonStartedPayload),
    /// A lesson stream produced a fragment.
    LessonProgress(LessonProgressPayload),
    /// A lesson was cached.
    LessonCompleted(LessonCompletedPayload),
    /// A lesson stream failed.
    LessonFailed(LessonFailedPayload),
    /// A quiz was graded.
    QuizScored(QuizScoredPayload),
    /// The theme changed.
    ThemeChanged(ThemeChangedPayload),
}

impl TutorEvent {
    /// Creates a `CourseCreated` event.
    #[must_use]
    pub const fn course_created(course: Course) -> Self {
        Self::CourseCreated(CourseCreatedPayload { course })
    }

    /// Creates a `CourseDeleted` event.
    #[must_use]
    pub fn course_deleted(course_id: impl Into<String>) -> Self {
        Self::CourseDeleted(CourseDeletedPayload {
            course_id: course_id.into(),
        })
    }

    /// Creates a `LessonStarted` event.
    #[must_use]
    pub fn lesson_started(course_id: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self::LessonStarted(LessonStartedPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            timestamp: Utc::now(),
        })
    }

    /// Creates a `LessonProgress` event.
    #[must_use]
    pub fn lesson_progress(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        update: LessonUpdate,
    ) -> Self {
        Self::LessonProgress(LessonProgressPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            update,
        })
    }

    /// Creates a `LessonCompleted` event.
    #[must_use]
    pub fn lesson_completed(
        course_id: impl Into<String>,
        module: Module,
        quiz_status: QuizStatus,
    ) -> Self {
        Self::LessonCompleted(LessonCompletedPayload {
            course_id: course_id.into(),
            module,
            quiz_status,
        })
    }

    /// Creates a `LessonFailed` event.
    #[must_use]
    pub fn lesson_failed(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        lesson: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::LessonFailed(LessonFailedPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            lesson: lesson.into(),
            message: message.into(),
        })
    }

    /// Creates a `QuizScored` event.
    #[must_use]
    pub fn quiz_scored(
        course_id: impl Into<String>,
        module_id: impl Into<String>,
        result: QuizResult,
        is_completed: bool,
    ) -> Self {
        Self::QuizScored(QuizScoredPayload {
            course_id: course_id.into(),
            module_id: module_id.into(),
            result,
            is_completed,
        })
    }

    /// Creates a `ThemeChanged` event.
    #[must_use]
    pub const fn theme_changed(theme: Theme) -> Self {
        Self::ThemeChanged(ThemeChangedPayload { theme })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::CourseCreated(_) => "course_created",
            Self::CourseDeleted(_) => "course_deleted",
            Self::LessonStarted(_) => "lesson_started",
            Self::LessonProgress(_) => "lesson_progress",
            Self::LessonCompleted(_) => "lesson_completed",
            Self::LessonFailed(_) => "lesson_failed",
            Self::QuizScored(_) => "quiz_scored",
            Self::ThemeChanged(_) => "theme_changed",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to all subscribers.
///
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<TutorEvent>,
}

impl EventBroadcaster {
    /// Creates a broadcaster buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber.
    ///
    /// A subscriber that falls behind receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TutorEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event and returns the number of receivers.
    pub fn send(&self, event: TutorEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// Unanswered pings tolerated before a client is dropped.
const MAX_MISSED_PONGS: u8 = 3;

/// Interval between heartbeat pings.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Whether a connection stays open after handling one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// The outgoing half of one client connection and its heartbeat count.
struct Connection {
    sink: SplitSink<WebSocket, Message>,
    missed_pongs: u8,
}

impl Connection {
    async fn send(&mut self, message: Message) -> Flow {
        if self.sink.send(message).await.is_err() {
            debug!("Client went away");
            return Flow::Close;
        }
        Flow::Continue
    }

    /// Sends one event as a JSON text frame.
    async fn deliver(&mut self, event: &TutorEvent) -> Flow {
        match serde_json::to_string(event) {
            Ok(json) => self.send(Message::Text(json)).await,
            Err(e) => {
                warn!(error = %e, event = event.event_name(), "Failed to serialize event");
                Flow::Continue
            }
        }
    }

    /// The feed is one-way; clients only take part in the heartbeat.
    async fn on_client(&mut self, message: Option<Result<Message, axum::Error>>) -> Flow {
        match message {
            Some(Ok(Message::Pong(_))) => {
                self.missed_pongs = 0;
                Flow::Continue
            }
            Some(Ok(Message::Ping(data))) => self.send(Message::Pong(data)).await,
            Some(Ok(Message::Text(_) | Message::Binary(_))) => Flow::Continue,
            Some(Ok(Message::Close(_))) | None => {
                debug!("Client closed the connection");
                Flow::Close
            }
            Some(Err(e)) => {
                debug!(error = %e, "WebSocket error");
                Flow::Close
            }
        }
    }

    async fn on_heartbeat(&mut self) -> Flow {
        if self.missed_pongs >= MAX_MISSED_PONGS {
            info!(missed = self.missed_pongs, "Client stopped answering pings");
            return Flow::Close;
        }
        self.missed_pongs += 1;
        self.send(Message::Ping(Vec::new())).await
    }
}

/// Turns one broadcast receive into the event to deliver.
///
/// A receiver that fell behind drops its backlog and delivers a fresh
/// `connected` snapshot instead, so the client replaces its state rather
/// than applying a gap. Returns `None` once the broadcaster is gone.
async fn resolve_event(
    received: Result<TutorEvent, RecvError>,
    events: &mut broadcast::Receiver<TutorEvent>,
    session: &Session,
) -> Option<TutorEvent> {
    match received {
        Ok(event) => Some(event),
        Err(RecvError::Lagged(missed)) => {
            warn!(missed, "Client fell behind; resending state");
            *events = events.resubscribe();
            Some(session.snapshot().await)
        }
        Err(RecvError::Closed) => None,
    }
}

/// Serves one client: the `connected` snapshot, then every session event,
/// with a ping every 30 seconds.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut incoming) = socket.split();
    let mut connection = Connection {
        sink,
        missed_pongs: 0,
    };

    // Subscribe before taking the snapshot so nothing falls in between
    let mut events = state.session.subscribe();
    if connection.deliver(&state.session.snapshot().await).await == Flow::Close {
        return;
    }
    info!(
        clients = state.session.broadcaster().receiver_count(),
        "WebSocket client connected"
    );

    let mut heartbeat = interval_at(Instant::now() + HEARTBEAT_INTERVAL, HEARTBEAT_INTERVAL);
    loop {
        let flow = tokio::select! {
            message = incoming.next() => connection.on_client(message).await,
            received = events.recv() => {
                match resolve_event(received, &mut events, &state.session).await {
                    Some(event) => connection.deliver(&event).await,
                    None => Flow::Close,
                }
            }
            _ = heartbeat.tick() => connection.on_heartbeat().await,
        };
        if flow == Flow::Close {
            break;
        }
    }

    info!("WebSocket client disconnected");
}

// ============================================================================
// Tests
// ============================================================================
