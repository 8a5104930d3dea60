//! Caller roles
//!
//! The role of the caller is established upstream (by the gateway that
//! authenticates the user); this crate only consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of the actor invoking an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    /// Platform administrator
    Admin,
    /// Tutor running sessions
    Tutor,
    /// Student booking sessions
    Student,
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Admin => write!(f, "admin"),
            ActorRole::Tutor => write!(f, "tutor"),
            ActorRole::Student => write!(f, "student"),
        }
    }
}

impl FromStr for ActorRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(ActorRole::Admin),
            "tutor" => Ok(ActorRole::Tutor),
            "student" => Ok(ActorRole::Student),
            _ => Err(anyhow::anyhow!("Invalid actor role: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("Admin".parse::<ActorRole>().unwrap(), ActorRole::Admin);
        assert_eq!(" tutor ".parse::<ActorRole>().unwrap(), ActorRole::Tutor);
        assert_eq!("student".parse::<ActorRole>().unwrap(), ActorRole::Student);
        assert!("guest".parse::<ActorRole>().is_err());
    }
}
