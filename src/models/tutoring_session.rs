//! Tutoring session model
//!
//! A tutoring session is one scheduled tutor–student lesson. Its `status`
//! follows a small state machine:
//!
//! ```text
//! SCHEDULED ──▶ LIVE ──▶ COMPLETED
//!     │           │
//!     │           └────▶ NO_SHOW
//!     ├────────────────▶ NO_SHOW
//!     └────────────────▶ CANCELLED
//! ```
//!
//! COMPLETED, NO_SHOW and CANCELLED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a tutoring session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Booked, not yet started (initial state)
    Scheduled,
    /// In progress
    Live,
    /// Finished normally
    Completed,
    /// A participant never joined
    NoShow,
    /// Called off before it started
    Cancelled,
}

impl SessionStatus {
    /// Every status, in declaration order
    pub const ALL: [SessionStatus; 5] = [
        SessionStatus::Scheduled,
        SessionStatus::Live,
        SessionStatus::Completed,
        SessionStatus::NoShow,
        SessionStatus::Cancelled,
    ];

    /// Statuses reachable from `self` in exactly one edge.
    ///
    /// Terminal statuses have no outgoing edges.
    pub fn next_states(self) -> &'static [SessionStatus] {
        match self {
            SessionStatus::Scheduled => &[
                SessionStatus::Live,
                SessionStatus::Cancelled,
                SessionStatus::NoShow,
            ],
            SessionStatus::Live => &[SessionStatus::Completed, SessionStatus::NoShow],
            SessionStatus::Completed | SessionStatus::NoShow | SessionStatus::Cancelled => &[],
        }
    }

    /// Whether `self -> target` is a permitted edge
    pub fn can_transition_to(self, target: SessionStatus) -> bool {
        self.next_states().contains(&target)
    }

    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        self.next_states().is_empty()
    }

    /// Wire/storage representation
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::Live => "LIVE",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::NoShow => "NO_SHOW",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SCHEDULED" => Ok(SessionStatus::Scheduled),
            "LIVE" => Ok(SessionStatus::Live),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "NO_SHOW" => Ok(SessionStatus::NoShow),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            _ => Err(anyhow::anyhow!("Invalid session status: {}", s)),
        }
    }
}

/// Tutoring session entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutoringSession {
    /// Unique identifier (assigned by the store)
    pub id: i64,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// When the lesson is booked for
    pub scheduled_at: DateTime<Utc>,
    /// Set once, on entering LIVE
    pub started_at: Option<DateTime<Utc>>,
    /// Set once, on entering a terminal status
    pub ended_at: Option<DateTime<Utc>>,
    /// Assigned tutor, if any
    pub tutor_id: Option<String>,
    /// Booking student
    pub student_id: String,
    /// Optional lesson focus
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TutoringSession {
    /// Whether a tutor has been assigned
    pub fn has_tutor(&self) -> bool {
        self.tutor_id.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    /// How long the session ran, once both timestamps are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Fields for inserting a new session row.
///
/// Status and lifecycle timestamps are not part of the input: a new row is
/// always SCHEDULED with no `started_at`/`ended_at`.
#[derive(Debug, Clone)]
pub struct NewTutoringSession {
    pub scheduled_at: DateTime<Utc>,
    pub tutor_id: Option<String>,
    pub student_id: String,
    pub topic: Option<String>,
}

/// Fields written together by a conditional status update
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: SessionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Compute the update for moving `session` to `target` at time `now`.
    ///
    /// `started_at` is only filled when entering LIVE and never overwritten;
    /// `ended_at` is filled when entering a terminal status.
    pub fn for_transition(
        session: &TutoringSession,
        target: SessionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let started_at = match target {
            SessionStatus::Live => session.started_at.or(Some(now)),
            _ => session.started_at,
        };
        let ended_at = if target.is_terminal() {
            session.ended_at.or(Some(now))
        } else {
            session.ended_at
        };
        Self {
            status: target,
            started_at,
            ended_at,
            updated_at: now,
        }
    }
}

/// Booking request for a new session (API input)
#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    #[serde(default)]
    pub tutor_id: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub topic: Option<String>,
}

/// Filter for listing sessions
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionFilter {
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub tutor_id: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

impl SessionFilter {
    /// Check a session against the filter (used by the in-memory store)
    pub fn matches(&self, session: &TutoringSession) -> bool {
        self.status.map_or(true, |s| session.status == s)
            && self
                .tutor_id
                .as_deref()
                .map_or(true, |t| session.tutor_id.as_deref() == Some(t))
            && self
                .student_id
                .as_deref()
                .map_or(true, |s| session.student_id == s)
    }
}
