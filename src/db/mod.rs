//! Database layer
//!
//! Tutoring sessions are stored in SQLite (default, single-binary deployment)
//! or MySQL, selected by configuration. The pool is built once at startup and
//! handed to repositories explicitly.
//!
//! ```ignore
//! use lingocoach::config::DatabaseConfig;
//! use lingocoach::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
