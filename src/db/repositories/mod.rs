//! Database repositories
//!
//! Repository pattern implementations for session persistence.

pub mod memory;
pub mod tutoring_session;

pub use memory::InMemorySessionRepository;
pub use tutoring_session::{ConditionalUpdate, SessionRepository, SqlxSessionRepository};
