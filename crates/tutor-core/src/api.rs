//! HTTP API for driving a tutor session from a web front end.
//!
//! # Endpoints
//!
//! - `GET /api/courses` - List courses
//! - `POST /api/courses` - Generate a course from a topic
//! - `GET /api/courses/:id` - Get one course
//! - `DELETE /api/courses/:id` - Delete a course
//! - `POST /api/courses/:id/modules/:mid/open` - Serve a cached lesson or start a stream
//! - `POST /api/courses/:id/modules/:mid/quiz` - Grade a quiz submission
//! - `GET /api/courses/:id/progress` - Completion summary
//! - `GET /api/theme`, `PUT /api/theme` - Theme preference
//! - `GET /ws` - WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_core::{create_router, AppState, Config, Session};
//! use tutor_genai::ScriptedBackend;
//!
//! # async fn example() -> tutor_core::Result<()> {
//! let config = Config::default();
//! let session = Session::from_config(&config, Arc::new(ScriptedBackend::new())).await?;
//! let router = create_router(AppState::new(session));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::course::{Course, CourseProgress, Module, Theme};
use crate::error::TutorError;
use crate::session::{ModuleOpening, QuizSubmission, Session};
use crate::websocket::ws_handler;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for course creation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourseRequest {
    /// What the user wants to learn.
    pub topic: String,
}

/// Request body for quiz submission.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizRequest {
    /// Zero-based option chosen for each question, in order.
    pub answers: Vec<i64>,
}

/// Request and response body for the theme endpoints.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ThemeBody {
    /// The theme preference.
    pub theme: Theme,
}

/// Response body for opening a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpenModuleResponse {
    /// The lesson was already cached.
    Cached {
        /// The module with its lesson and quiz.
        module: Module,
    },
    /// A stream started; progress arrives on `/ws`.
    #[serde(rename_all = "camelCase")]
    Streaming {
        /// Course of the module.
        course_id: String,
        /// Module being taught.
        module_id: String,
    },
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session all handlers operate on.
    pub session: Arc<Session>,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Arc::new(session),
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Maps tutor errors onto HTTP status codes.
#[derive(Debug)]
struct ApiError(TutorError);

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            TutorError::EmptyTopic
            | TutorError::IncompleteAnswers { .. }
            | TutorError::InvalidAnswer { .. } => StatusCode::BAD_REQUEST,
            TutorError::CourseNotFound { .. } | TutorError::ModuleNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            TutorError::StreamInProgress { .. } | TutorError::QuizUnavailable { .. } => {
                StatusCode::CONFLICT
            }
            e if e.is_generation_failure() => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = %status, error = %self.0, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router has:
/// - All API routes under `/api`
/// - The WebSocket endpoint at `/ws`
/// - CORS middleware allowing any origin
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/courses", get(handle_list_courses).post(handle_create_course))
        .route(
            "/courses/:course_id",
            get(handle_get_course).delete(handle_delete_course),
        )
        .route(
            "/courses/:course_id/modules/:module_id/open",
            post(handle_open_module),
        )
        .route(
            "/courses/:course_id/modules/:module_id/quiz",
            post(handle_submit_quiz),
        )
        .route("/courses/:course_id/progress", get(handle_progress))
        .route("/theme", get(handle_get_theme).put(handle_set_theme));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/courses`.
async fn handle_list_courses(State(state): State<Arc<AppState>>) -> Json<Vec<Course>> {
    Json(state.session.courses().await)
}

/// Handler for `POST /api/courses`.
async fn handle_create_course(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateCourseRequest>,
) -> ApiResult<(StatusCode, Json<Course>)> {
    info!(topic = %request.topic, "Create course request");
    let course = state.session.create_course(&request.topic).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

/// Handler for `GET /api/courses/:course_id`.
async fn handle_get_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<Course>> {
    Ok(Json(state.session.course(&course_id).await?))
}

/// Handler for `DELETE /api/courses/:course_id`.
async fn handle_delete_course(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.session.delete_course(&course_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/courses/:course_id/modules/:module_id/open`.
///
/// Returns 200 with the cached module, or 202 once a stream has started.
async fn handle_open_module(
    State(state): State<Arc<AppState>>,
    Path((course_id, module_id)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<OpenModuleResponse>)> {
    match state.session.open_module(&course_id, &module_id).await? {
        ModuleOpening::Cached(module) => Ok((
            StatusCode::OK,
            Json(OpenModuleResponse::Cached { module }),
        )),
        // The lesson task keeps running after the handle is dropped
        ModuleOpening::Streaming(_handle) => Ok((
            StatusCode::ACCEPTED,
            Json(OpenModuleResponse::Streaming {
                course_id,
                module_id,
            }),
        )),
    }
}

/// Handler for `POST /api/courses/:course_id/modules/:module_id/quiz`.
async fn handle_submit_quiz(
    State(state): State<Arc<AppState>>,
    Path((course_id, module_id)): Path<(String, String)>,
    Json(request): Json<QuizRequest>,
) -> ApiResult<Json<QuizSubmission>> {
    let submission = state
        .session
        .submit_quiz(&course_id, &module_id, &request.answers)
        .await?;
    Ok(Json(submission))
}

/// Handler for `GET /api/courses/:course_id/progress`.
async fn handle_progress(
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<String>,
) -> ApiResult<Json<CourseProgress>> {
    Ok(Json(state.session.progress(&course_id).await?))
}

/// Handler for `GET /api/theme`.
async fn handle_get_theme(State(state): State<Arc<AppState>>) -> Json<ThemeBody> {
    Json(ThemeBody {
        theme: state.session.theme().await,
    })
}

/// Handler for `PUT /api/theme`.
async fn handle_set_theme(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ThemeBody>,
) -> ApiResult<Json<ThemeBody>> {
    let theme = state.session.set_theme(body.theme).await?;
    Ok(Json(ThemeBody { theme }))
}

// ============================================================================
// Tests
// ============================================================================
