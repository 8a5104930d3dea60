//! Session lifecycle service
//!
//! Owns every write to a tutoring session's `status`, `started_at` and
//! `ended_at`. Moves are checked against the transition table on
//! `SessionStatus` and then written with a compare-and-swap against the
//! status that was read, so two callers racing on a stale read cannot both
//! succeed.
//!
//! The service never retries: a lost race surfaces as
//! `SessionLifecycleError::ConcurrentModification` and the caller decides
//! whether to re-read and try again.

use crate::config::SessionConfig;
use crate::db::repositories::{ConditionalUpdate, SessionRepository};
use crate::models::{
    BookingRequest, ListParams, NewTutoringSession, PagedResult, SessionFilter, SessionStatus,
    StatusUpdate, TutoringSession,
};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Longest tutor/student reference the store accepts
const MAX_PARTICIPANT_ID_LEN: usize = 64;

/// Longest lesson topic the store accepts
const MAX_TOPIC_LEN: usize = 255;

/// Error types for session lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum SessionLifecycleError {
    /// No session with that id
    #[error("Session not found: {0}")]
    NotFound(i64),

    /// The requested edge is not in the transition table
    #[error("Cannot move session from {from} to {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
        valid_next: Vec<SessionStatus>,
    },

    /// Tutor assignment attempted outside SCHEDULED
    #[error("Session {id} is {current}; a tutor can only be assigned while SCHEDULED")]
    NotSchedulable { id: i64, current: SessionStatus },

    /// The edge is permitted but the session is not ready for it
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Another caller changed the status between our read and our write
    #[error("Session {id} was modified concurrently (now {current})")]
    ConcurrentModification { id: i64, current: SessionStatus },

    /// Invalid booking or assignment input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store failure
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Whether `current -> requested` is a permitted edge
pub fn validate_session_transition(current: SessionStatus, requested: SessionStatus) -> bool {
    current.can_transition_to(requested)
}

/// Statuses reachable from `current` in one edge (empty when terminal)
pub fn get_valid_next_states(current: SessionStatus) -> Vec<SessionStatus> {
    current.next_states().to_vec()
}

/// Session lifecycle engine
pub struct SessionLifecycleService {
    repo: Arc<dyn SessionRepository>,
    schedule_grace: Duration,
}

impl SessionLifecycleService {
    /// Create a service using the policy values from configuration
    pub fn new(repo: Arc<dyn SessionRepository>, config: &SessionConfig) -> Self {
        Self {
            repo,
            schedule_grace: config.schedule_grace(),
        }
    }

    /// Create a service with an explicit booking grace tolerance
    pub fn with_grace(repo: Arc<dyn SessionRepository>, schedule_grace: Duration) -> Self {
        Self {
            repo,
            schedule_grace,
        }
    }

    /// Book a new session.
    ///
    /// The session starts SCHEDULED with no `started_at`/`ended_at`.
    ///
    /// # Errors
    /// - `Validation` if the student is missing or blank, the scheduled time
    ///   is missing or further in the past than the grace tolerance, or a
    ///   field exceeds its storage limit
    pub async fn create_session_with_validation(
        &self,
        booking: BookingRequest,
    ) -> Result<TutoringSession, SessionLifecycleError> {
        let student_id = normalize_id(booking.student_id.as_deref())
            .ok_or_else(|| validation("student_id is required"))?;
        check_id_len("student_id", &student_id)?;

        let tutor_id = normalize_id(booking.tutor_id.as_deref());
        if let Some(ref tutor) = tutor_id {
            check_id_len("tutor_id", tutor)?;
        }

        let scheduled_at = booking
            .scheduled_at
            .ok_or_else(|| validation("scheduled_at is required"))?;
        let earliest = Utc::now()
            .checked_sub_signed(self.schedule_grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        if scheduled_at < earliest {
            return Err(validation(format!(
                "scheduled_at {} is in the past",
                scheduled_at.to_rfc3339()
            )));
        }

        let topic = booking
            .topic
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if topic.as_ref().is_some_and(|t| t.chars().count() > MAX_TOPIC_LEN) {
            return Err(validation(format!(
                "topic must be at most {} characters",
                MAX_TOPIC_LEN
            )));
        }

        let created = self
            .repo
            .create(&NewTutoringSession {
                scheduled_at,
                tutor_id,
                student_id,
                topic,
            })
            .await
            .context("Failed to create tutoring session")?;

        tracing::info!(
            session_id = created.id,
            student_id = %created.student_id,
            tutor_id = created.tutor_id.as_deref().unwrap_or("-"),
            scheduled_at = %created.scheduled_at,
            "Session booked"
        );
        Ok(created)
    }

    /// Move a session to `requested`, atomically with its timestamp side
    /// effects.
    ///
    /// Entering LIVE fills `started_at` (if unset); entering a terminal status
    /// fills `ended_at`. Nothing is written unless the stored status still
    /// equals the one read here.
    ///
    /// # Errors
    /// - `NotFound` if the session does not exist
    /// - `InvalidTransition` if the edge is not permitted
    /// - `PreconditionFailed` if the target is LIVE and no tutor is assigned
    /// - `ConcurrentModification` if another caller changed the status first
    pub async fn atomic_update_session_status(
        &self,
        session_id: i64,
        requested: SessionStatus,
    ) -> Result<TutoringSession, SessionLifecycleError> {
        let session = self.load(session_id).await?;
        let current = session.status;

        if !validate_session_transition(current, requested) {
            return Err(SessionLifecycleError::InvalidTransition {
                from: current,
                to: requested,
                valid_next: get_valid_next_states(current),
            });
        }

        if requested == SessionStatus::Live && !session.has_tutor() {
            return Err(SessionLifecycleError::PreconditionFailed(
                "cannot start a session with no tutor assigned".to_string(),
            ));
        }

        let update = StatusUpdate::for_transition(&session, requested, Utc::now());
        let outcome = self
            .repo
            .conditional_update_status(session_id, current, &update)
            .await
            .context("Failed to write session status")?;

        match outcome {
            ConditionalUpdate::Applied(updated) => {
                tracing::info!(
                    session_id,
                    from = %current,
                    to = %requested,
                    "Session status changed"
                );
                Ok(updated)
            }
            ConditionalUpdate::Conflict { current: now_status } => {
                tracing::debug!(
                    session_id,
                    expected = %current,
                    found = %now_status,
                    "Lost status race"
                );
                Err(SessionLifecycleError::ConcurrentModification {
                    id: session_id,
                    current: now_status,
                })
            }
            ConditionalUpdate::NotFound => Err(SessionLifecycleError::NotFound(session_id)),
        }
    }

    /// Assign (or reassign) the tutor of a SCHEDULED session.
    ///
    /// A tutor is never cleared once set.
    pub async fn assign_tutor(
        &self,
        session_id: i64,
        tutor_id: &str,
    ) -> Result<TutoringSession, SessionLifecycleError> {
        let tutor_id =
            normalize_id(Some(tutor_id)).ok_or_else(|| validation("tutor_id is required"))?;
        check_id_len("tutor_id", &tutor_id)?;

        let session = self.load(session_id).await?;
        if session.status != SessionStatus::Scheduled {
            return Err(SessionLifecycleError::NotSchedulable {
                id: session_id,
                current: session.status,
            });
        }

        let outcome = self
            .repo
            .conditional_assign_tutor(session_id, SessionStatus::Scheduled, &tutor_id, Utc::now())
            .await
            .context("Failed to assign tutor")?;

        match outcome {
            ConditionalUpdate::Applied(updated) => {
                tracing::info!(session_id, tutor_id = %tutor_id, "Tutor assigned");
                Ok(updated)
            }
            ConditionalUpdate::Conflict { current } => {
                Err(SessionLifecycleError::ConcurrentModification {
                    id: session_id,
                    current,
                })
            }
            ConditionalUpdate::NotFound => Err(SessionLifecycleError::NotFound(session_id)),
        }
    }

    /// Get a session by ID
    pub async fn get_session(
        &self,
        session_id: i64,
    ) -> Result<TutoringSession, SessionLifecycleError> {
        self.load(session_id).await
    }

    /// List sessions matching `filter`
    pub async fn list_sessions(
        &self,
        filter: &SessionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<TutoringSession>, SessionLifecycleError> {
        self.repo
            .list(filter, params)
            .await
            .context("Failed to list tutoring sessions")
            .map_err(Into::into)
    }

    /// SCHEDULED sessions booked for earlier than `cutoff`, oldest first
    pub async fn list_overdue(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TutoringSession>, SessionLifecycleError> {
        self.repo
            .list_scheduled_before(cutoff, limit)
            .await
            .context("Failed to list overdue sessions")
            .map_err(Into::into)
    }

    async fn load(&self, session_id: i64) -> Result<TutoringSession, SessionLifecycleError> {
        self.repo
            .get_by_id(session_id)
            .await
            .context("Failed to read tutoring session")?
            .ok_or(SessionLifecycleError::NotFound(session_id))
    }
}

fn validation(message: impl Into<String>) -> SessionLifecycleError {
    SessionLifecycleError::Validation(message.into())
}

/// Trim a participant reference, treating blank as absent
fn normalize_id(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn check_id_len(field: &str, value: &str) -> Result<(), SessionLifecycleError> {
    if value.len() > MAX_PARTICIPANT_ID_LEN {
        return Err(validation(format!(
            "{} must be at most {} bytes",
            field, MAX_PARTICIPANT_ID_LEN
        )));
    }
    Ok(())
}
