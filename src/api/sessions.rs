//! Tutoring session API endpoints
//!
//! Handles HTTP requests for session management:
//! - GET /api/v1/sessions - List sessions (filterable, paginated)
//! - POST /api/v1/sessions - Book a session
//! - GET /api/v1/sessions/{id} - Get a session
//! - GET /api/v1/sessions/{id}/transitions - Current status and valid next states
//! - POST /api/v1/sessions/{id}/status - Change status
//! - PUT /api/v1/sessions/{id}/tutor - Assign tutor
//!
//! Every route requires the `X-User-Role` header; role capabilities are
//! checked against `AccessPolicy` before the lifecycle service is called.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{Actor, ApiError, AppState};
use crate::models::{
    BookingRequest, ListParams, SessionFilter, SessionStatus, TutoringSession,
};
use crate::services::{get_valid_next_states, SessionAction};

/// Query parameters for session list
#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tutor_id: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 { 1 }
fn default_per_page() -> u32 { 20 }

/// Request body for a status change
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

/// Request body for tutor assignment
#[derive(Debug, Deserialize)]
pub struct AssignTutorRequest {
    pub tutor_id: String,
}

/// Response for a single session
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: i64,
    pub status: SessionStatus,
    pub scheduled_at: String,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub tutor_id: Option<String>,
    pub student_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Seconds between start and end, once both are known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<i64>,
    pub valid_next_states: Vec<SessionStatus>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TutoringSession> for SessionResponse {
    fn from(session: TutoringSession) -> Self {
        let duration_seconds = session.duration().map(|d| d.num_seconds());
        Self {
            id: session.id,
            status: session.status,
            scheduled_at: session.scheduled_at.to_rfc3339(),
            started_at: session.started_at.map(|dt| dt.to_rfc3339()),
            ended_at: session.ended_at.map(|dt| dt.to_rfc3339()),
            tutor_id: session.tutor_id,
            student_id: session.student_id,
            topic: session.topic,
            duration_seconds,
            valid_next_states: get_valid_next_states(session.status),
            created_at: session.created_at.to_rfc3339(),
            updated_at: session.updated_at.to_rfc3339(),
        }
    }
}

/// Response for session list
#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
    pub has_next: bool,
}

/// Response for the transitions endpoint
#[derive(Debug, Serialize)]
pub struct TransitionsResponse {
    pub session_id: i64,
    pub current_status: SessionStatus,
    pub valid_next_states: Vec<SessionStatus>,
    pub terminal: bool,
}

/// Build the sessions router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/transitions", get(get_transitions))
        .route("/sessions/{id}/status", post(change_status))
        .route("/sessions/{id}/tutor", put(assign_tutor))
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::validation_error(e.body_text()))
}

fn session_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::validation_error(e.body_text()))
}

fn parse_status(raw: &str) -> Result<SessionStatus, ApiError> {
    raw.parse()
        .map_err(|e: anyhow::Error| ApiError::validation_error(e.to_string()))
}

/// GET /api/v1/sessions - List sessions
async fn list_sessions(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    query: Result<Query<ListSessionsQuery>, QueryRejection>,
) -> Result<Json<SessionListResponse>, ApiError> {
    state.policy.authorize(role, SessionAction::Read)?;
    let Query(query) = query.map_err(|e| ApiError::validation_error(e.body_text()))?;

    let filter = SessionFilter {
        status: query.status.as_deref().map(parse_status).transpose()?,
        tutor_id: query.tutor_id,
        student_id: query.student_id,
    };
    let params = ListParams::new(query.page, query.per_page);

    let result = state.lifecycle.list_sessions(&filter, &params).await?;
    let total_pages = result.total_pages();
    let has_next = result.has_next();

    Ok(Json(SessionListResponse {
        sessions: result.items.into_iter().map(SessionResponse::from).collect(),
        total: result.total,
        page: result.page,
        per_page: result.per_page,
        total_pages,
        has_next,
    }))
}

/// POST /api/v1/sessions - Book a session
async fn create_session(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    state.policy.authorize(role, SessionAction::Book)?;
    let booking = json_body(payload)?;

    let session = state.lifecycle.create_session_with_validation(booking).await?;
    Ok((StatusCode::CREATED, Json(SessionResponse::from(session))))
}

/// GET /api/v1/sessions/{id} - Get a session
async fn get_session(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.policy.authorize(role, SessionAction::Read)?;
    let id = session_id(path)?;
    let session = state.lifecycle.get_session(id).await?;
    Ok(Json(SessionResponse::from(session)))
}

/// GET /api/v1/sessions/{id}/transitions - Valid next states
async fn get_transitions(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<TransitionsResponse>, ApiError> {
    state.policy.authorize(role, SessionAction::Read)?;
    let id = session_id(path)?;
    let session = state.lifecycle.get_session(id).await?;

    Ok(Json(TransitionsResponse {
        session_id: session.id,
        current_status: session.status,
        valid_next_states: get_valid_next_states(session.status),
        terminal: session.status.is_terminal(),
    }))
}

/// POST /api/v1/sessions/{id}/status - Change status
async fn change_status(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StatusChangeRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = session_id(path)?;
    let request = json_body(payload)?;
    let target = parse_status(&request.status)?;
    state.policy.authorize(role, SessionAction::Transition(target))?;

    let session = state.lifecycle.atomic_update_session_status(id, target).await?;
    Ok(Json(SessionResponse::from(session)))
}

/// PUT /api/v1/sessions/{id}/tutor - Assign tutor
async fn assign_tutor(
    State(state): State<AppState>,
    Extension(Actor(role)): Extension<Actor>,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<AssignTutorRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    state.policy.authorize(role, SessionAction::AssignTutor)?;
    let id = session_id(path)?;
    let request = json_body(payload)?;

    let session = state.lifecycle.assign_tutor(id, &request.tutor_id).await?;
    Ok(Json(SessionResponse::from(session)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::middleware::{RequestStats, ROLE_HEADER};
    use crate::api::build_router;
    use crate::config::SessionConfig;
    use crate::db::create_test_pool;
    use crate::db::repositories::InMemorySessionRepository;
    use crate::services::{AccessPolicy, SessionLifecycleService};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let lifecycle = Arc::new(SessionLifecycleService::new(
            InMemorySessionRepository::boxed(),
            &SessionConfig::default(),
        ));
        let state = AppState {
            pool,
            lifecycle,
            policy: AccessPolicy::new(),
            request_stats: Arc::new(RequestStats::new()),
        };
        build_router(state, "http://localhost:3000")
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        role: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header(ROLE_HEADER, role);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn tomorrow() -> String {
        (Utc::now() + Duration::days(1)).to_rfc3339()
    }

    async fn book(app: &Router, tutor: Option<&str>) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/v1/sessions",
            Some("student"),
            Some(json!({
                "student_id": "S1",
                "tutor_id": tutor,
                "scheduled_at": tomorrow(),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_missing_or_unknown_role_is_unauthorized() {
        let app = test_app().await;

        let (status, body) = send(&app, Method::GET, "/api/v1/sessions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "UNAUTHORIZED");

        let (status, _) =
            send(&app, Method::GET, "/api/v1/sessions", Some("janitor"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_book_and_fetch() {
        let app = test_app().await;
        let id = book(&app, None).await;

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/sessions/{}", id),
            Some("tutor"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "SCHEDULED");
        assert_eq!(body["student_id"], "S1");
        assert!(body["started_at"].is_null());
        assert_eq!(
            body["valid_next_states"],
            json!(["LIVE", "CANCELLED", "NO_SHOW"])
        );
    }

    #[tokio::test]
    async fn test_booking_validation_error() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/sessions",
            Some("admin"),
            Some(json!({ "scheduled_at": tomorrow() })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_tutor_cannot_book() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/sessions",
            Some("tutor"),
            Some(json!({ "student_id": "S1", "scheduled_at": tomorrow() })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn test_full_lifecycle_over_http() {
        let app = test_app().await;
        let id = book(&app, None).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("tutor"),
            Some(json!({ "status": "LIVE" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "PRECONDITION_FAILED");

        let (status, body) = send(
            &app,
            Method::PUT,
            &format!("/api/v1/sessions/{}/tutor", id),
            Some("admin"),
            Some(json!({ "tutor_id": "T1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tutor_id"], "T1");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("tutor"),
            Some(json!({ "status": "LIVE" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "LIVE");
        assert!(body["started_at"].is_string());

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("student"),
            Some(json!({ "status": "CANCELLED" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
        assert_eq!(body["error"]["details"]["current_status"], "LIVE");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("tutor"),
            Some(json!({ "status": "COMPLETED" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "COMPLETED");
        assert!(body["ended_at"].is_string());
        assert!(body["duration_seconds"].as_i64().unwrap() >= 0);

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/v1/sessions/{}/transitions", id),
            Some("student"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["terminal"], true);
        assert_eq!(body["valid_next_states"], json!([]));
    }

    #[tokio::test]
    async fn test_student_cannot_start_session() {
        let app = test_app().await;
        let id = book(&app, Some("T1")).await;

        let (status, _) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("student"),
            Some(json!({ "status": "LIVE" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_status_and_missing_session() {
        let app = test_app().await;
        let id = book(&app, Some("T1")).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", id),
            Some("admin"),
            Some(json!({ "status": "PAUSED" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, body) =
            send(&app, Method::GET, "/api/v1/sessions/9999", Some("admin"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let app = test_app().await;
        let first = book(&app, None).await;
        book(&app, None).await;

        send(
            &app,
            Method::POST,
            &format!("/api/v1/sessions/{}/status", first),
            Some("student"),
            Some(json!({ "status": "CANCELLED" })),
        )
        .await;

        let (status, body) = send(
            &app,
            Method::GET,
            "/api/v1/sessions?status=SCHEDULED&per_page=10",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["per_page"], 10);
        assert_eq!(body["sessions"][0]["status"], "SCHEDULED");
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_non_numeric_id_uses_error_envelope() {
        let app = test_app().await;

        for (method, uri, body) in [
            (Method::GET, "/api/v1/sessions/abc", None),
            (Method::GET, "/api/v1/sessions/abc/transitions", None),
            (
                Method::POST,
                "/api/v1/sessions/abc/status",
                Some(json!({ "status": "CANCELLED" })),
            ),
            (
                Method::PUT,
                "/api/v1/sessions/abc/tutor",
                Some(json!({ "tutor_id": "T1" })),
            ),
        ] {
            let (status, body) = send(&app, method, uri, Some("admin"), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_list_reports_next_page() {
        let app = test_app().await;
        for _ in 0..3 {
            book(&app, None).await;
        }

        let (_, first) =
            send(&app, Method::GET, "/api/v1/sessions?per_page=2", Some("admin"), None).await;
        assert_eq!(first["total_pages"], 2);
        assert_eq!(first["has_next"], true);

        let (_, last) = send(
            &app,
            Method::GET,
            "/api/v1/sessions?page=2&per_page=2",
            Some("admin"),
            None,
        )
        .await;
        assert_eq!(last["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(last["has_next"], false);
    }
}
