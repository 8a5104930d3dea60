//! Services layer - Business logic
//!
//! This module contains the business logic for tutoring sessions:
//! - `lifecycle`: the session state machine and its guarded writes
//! - `policy`: which roles may perform which session actions
//! - `sweeper`: the periodic no-show sweep

pub mod lifecycle;
pub mod policy;
pub mod sweeper;

pub use lifecycle::{
    get_valid_next_states, validate_session_transition, SessionLifecycleError,
    SessionLifecycleService,
};
pub use policy::{AccessPolicy, PolicyError, SessionAction};
pub use sweeper::{NoShowSweeper, SweepReport};
