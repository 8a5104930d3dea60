//! LingoCoach - Tutoring session lifecycle engine
//!
//! This library provides the session state machine, its persistence and the
//! HTTP API around it.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
