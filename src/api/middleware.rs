//! API middleware
//!
//! Contains:
//! - `AppState`, the shared services handed to every handler
//! - `ApiError`, the JSON error envelope and its status mapping
//! - Actor role extraction from the gateway-supplied `X-User-Role` header
//! - Request statistics

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::models::ActorRole;
use crate::services::{AccessPolicy, PolicyError, SessionLifecycleError};

/// Header the upstream gateway uses to pass the caller's role
pub const ROLE_HEADER: &str = "x-user-role";

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    start_time: Instant,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: crate::db::DynDatabasePool,
    pub lifecycle: Arc<crate::services::SessionLifecycleService>,
    pub policy: AccessPolicy,
    pub request_stats: Arc<RequestStats>,
}

/// Role of the caller, placed in request extensions by `require_role`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub ActorRole);

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "INVALID_TRANSITION" | "CONCURRENT_MODIFICATION" => StatusCode::CONFLICT,
            "PRECONDITION_FAILED" => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<SessionLifecycleError> for ApiError {
    fn from(err: SessionLifecycleError) -> Self {
        let message = err.to_string();
        match err {
            SessionLifecycleError::NotFound(_) => Self::not_found(message),
            SessionLifecycleError::Validation(_) => Self::validation_error(message),
            SessionLifecycleError::InvalidTransition {
                from, valid_next, ..
            } => Self::with_details(
                "INVALID_TRANSITION",
                message,
                serde_json::json!({
                    "current_status": from,
                    "valid_next_states": valid_next,
                }),
            ),
            SessionLifecycleError::NotSchedulable { current, .. } => Self::with_details(
                "INVALID_TRANSITION",
                message,
                serde_json::json!({
                    "current_status": current,
                    "valid_next_states": current.next_states(),
                }),
            ),
            SessionLifecycleError::PreconditionFailed(_) => {
                Self::new("PRECONDITION_FAILED", message)
            }
            SessionLifecycleError::ConcurrentModification { current, .. } => Self::with_details(
                "CONCURRENT_MODIFICATION",
                message,
                serde_json::json!({ "current_status": current }),
            ),
            SessionLifecycleError::Internal(e) => {
                tracing::error!("Session store failure: {:#}", e);
                Self::internal_error("Internal server error")
            }
        }
    }
}

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        Self::forbidden(err.to_string())
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Role middleware
///
/// Rejects requests without a recognised `X-User-Role` header and stores the
/// parsed role as an `Actor` extension for handlers.
pub async fn require_role(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let raw = request
        .headers()
        .get(ROLE_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Missing X-User-Role header"))?
        .to_str()
        .map_err(|_| ApiError::unauthorized("Malformed X-User-Role header"))?;

    let role: ActorRole = raw
        .parse()
        .map_err(|_| ApiError::unauthorized(format!("Unknown role: {}", raw.trim())))?;

    request.extensions_mut().insert(Actor(role));
    Ok(next.run(request).await)
}

/// Request statistics middleware
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let response = next.run(request).await;
    state.request_stats.record();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionStatus;

    #[test]
    fn test_lifecycle_errors_map_to_codes() {
        let cases = vec![
            (SessionLifecycleError::NotFound(1), "NOT_FOUND", StatusCode::NOT_FOUND),
            (
                SessionLifecycleError::Validation("bad".into()),
                "VALIDATION_ERROR",
                StatusCode::BAD_REQUEST,
            ),
            (
                SessionLifecycleError::PreconditionFailed("no tutor".into()),
                "PRECONDITION_FAILED",
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                SessionLifecycleError::ConcurrentModification {
                    id: 1,
                    current: SessionStatus::Live,
                },
                "CONCURRENT_MODIFICATION",
                StatusCode::CONFLICT,
            ),
            (
                SessionLifecycleError::Internal(anyhow::anyhow!("disk gone")),
                "INTERNAL_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, code, status) in cases {
            let api: ApiError = err.into();
            assert_eq!(api.error.code, code);
            assert_eq!(api.status(), status);
        }
    }

    #[test]
    fn test_invalid_transition_carries_details() {
        let api: ApiError = SessionLifecycleError::InvalidTransition {
            from: SessionStatus::Live,
            to: SessionStatus::Cancelled,
            valid_next: SessionStatus::Live.next_states().to_vec(),
        }
        .into();

        assert_eq!(api.status(), StatusCode::CONFLICT);
        let details = api.error.details.expect("details expected");
        assert_eq!(details["current_status"], "LIVE");
        assert_eq!(
            details["valid_next_states"],
            serde_json::json!(["COMPLETED", "NO_SHOW"])
        );
    }

    #[test]
    fn test_internal_error_hides_cause() {
        let api: ApiError =
            SessionLifecycleError::Internal(anyhow::anyhow!("password=hunter2")).into();
        assert!(!api.error.message.contains("hunter2"));
    }
}
