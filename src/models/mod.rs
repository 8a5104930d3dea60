//! Data models
//!
//! This module contains the data structures used throughout lingocoach:
//! - The `TutoringSession` entity and its lifecycle `SessionStatus`
//! - Input types for booking and listing
//! - Caller roles and pagination helpers

mod pagination;
mod role;
mod tutoring_session;

pub use pagination::{ListParams, PagedResult};
pub use role::ActorRole;
pub use tutoring_session::{
    BookingRequest, NewTutoringSession, SessionFilter, SessionStatus, StatusUpdate,
    TutoringSession,
};
