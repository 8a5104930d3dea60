//! Role-based access policy
//!
//! One table decides which actor roles may perform which session actions.
//! Callers check it before invoking the lifecycle service, which stays
//! role-agnostic.

use crate::models::{ActorRole, SessionStatus};

/// Something an actor wants to do to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Read,
    Book,
    AssignTutor,
    Transition(SessionStatus),
}

impl std::fmt::Display for SessionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionAction::Read => write!(f, "read sessions"),
            SessionAction::Book => write!(f, "book a session"),
            SessionAction::AssignTutor => write!(f, "assign a tutor"),
            SessionAction::Transition(to) => write!(f, "move a session to {}", to),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Role '{role}' may not {action}")]
    Forbidden {
        role: ActorRole,
        action: SessionAction,
    },
}

/// Capability table for session actions
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Whether `role` may perform `action`
    pub fn allows(&self, role: ActorRole, action: SessionAction) -> bool {
        use ActorRole::*;
        match action {
            SessionAction::Read => true,
            SessionAction::Book => matches!(role, Admin | Student),
            SessionAction::AssignTutor => role == Admin,
            SessionAction::Transition(SessionStatus::Cancelled) => true,
            SessionAction::Transition(
                SessionStatus::Live | SessionStatus::Completed | SessionStatus::NoShow,
            ) => matches!(role, Admin | Tutor),
            // Nothing transitions into SCHEDULED; let the engine report it
            SessionAction::Transition(SessionStatus::Scheduled) => matches!(role, Admin | Tutor),
        }
    }

    /// Check `action` for `role`.
    ///
    /// # Errors
    /// Returns `PolicyError::Forbidden` when the role lacks the capability.
    pub fn authorize(&self, role: ActorRole, action: SessionAction) -> Result<(), PolicyError> {
        if self.allows(role, action) {
            Ok(())
        } else {
            tracing::debug!(%role, %action, "Access denied");
            Err(PolicyError::Forbidden { role, action })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [ActorRole; 3] = [ActorRole::Admin, ActorRole::Tutor, ActorRole::Student];

    fn allowed_roles(action: SessionAction) -> Vec<ActorRole> {
        let policy = AccessPolicy::new();
        ROLES
            .iter()
            .copied()
            .filter(|role| policy.allows(*role, action))
            .collect()
    }

    #[test]
    fn test_everyone_can_read() {
        assert_eq!(allowed_roles(SessionAction::Read), ROLES.to_vec());
    }

    #[test]
    fn test_booking_roles() {
        assert_eq!(
            allowed_roles(SessionAction::Book),
            vec![ActorRole::Admin, ActorRole::Student]
        );
    }

    #[test]
    fn test_only_admin_assigns_tutors() {
        assert_eq!(
            allowed_roles(SessionAction::AssignTutor),
            vec![ActorRole::Admin]
        );
    }

    #[test]
    fn test_transition_roles() {
        for to in [
            SessionStatus::Live,
            SessionStatus::Completed,
            SessionStatus::NoShow,
        ] {
            assert_eq!(
                allowed_roles(SessionAction::Transition(to)),
                vec![ActorRole::Admin, ActorRole::Tutor],
                "{}",
                to
            );
        }
        assert_eq!(
            allowed_roles(SessionAction::Transition(SessionStatus::Cancelled)),
            ROLES.to_vec()
        );
    }

    #[test]
    fn test_authorize_reports_role_and_action() {
        let err = AccessPolicy::new()
            .authorize(
                ActorRole::Student,
                SessionAction::Transition(SessionStatus::Live),
            )
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::Forbidden {
                role: ActorRole::Student,
                action: SessionAction::Transition(SessionStatus::Live),
            }
        );
        assert_eq!(err.to_string(), "Role 'student' may not move a session to LIVE");
    }
}
