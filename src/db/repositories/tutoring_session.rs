//! Tutoring session repository
//!
//! This module provides:
//! - `SessionRepository`, the persistence interface the lifecycle engine uses
//! - `SqlxSessionRepository`, implementing it for SQLite and MySQL
//!
//! Status changes are written with a compare-and-swap
//! `UPDATE ... WHERE id = ? AND status = ?`; zero affected rows means either
//! the row is gone or another writer changed its status first.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{
    ListParams, NewTutoringSession, PagedResult, SessionFilter, SessionStatus, StatusUpdate,
    TutoringSession,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Outcome of a conditional write
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionalUpdate {
    /// The guard matched and the row now looks like this
    Applied(TutoringSession),
    /// The row exists but its status no longer matched the expected one
    Conflict { current: SessionStatus },
    /// No row with that id
    NotFound,
}

/// Persistence interface for tutoring sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new SCHEDULED session
    async fn create(&self, session: &NewTutoringSession) -> Result<TutoringSession>;

    /// Get a session by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<TutoringSession>>;

    /// Write `update` only if the stored status still equals `expected`
    async fn conditional_update_status(
        &self,
        id: i64,
        expected: SessionStatus,
        update: &StatusUpdate,
    ) -> Result<ConditionalUpdate>;

    /// Set the tutor only if the stored status still equals `expected`
    async fn conditional_assign_tutor(
        &self,
        id: i64,
        expected: SessionStatus,
        tutor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConditionalUpdate>;

    /// List sessions matching `filter`, ordered by scheduled time
    async fn list(
        &self,
        filter: &SessionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<TutoringSession>>;

    /// SCHEDULED sessions whose scheduled time is before `cutoff`, oldest first
    async fn list_scheduled_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TutoringSession>>;
}

/// SQLx-based session repository (SQLite and MySQL)
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }

    fn sqlite(&self) -> Result<&SqlitePool> {
        self.pool
            .as_sqlite()
            .context("Database pool is not a SQLite pool")
    }

    fn mysql(&self) -> Result<&MySqlPool> {
        self.pool
            .as_mysql()
            .context("Database pool is not a MySQL pool")
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &NewTutoringSession) -> Result<TutoringSession> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_sqlite(self.sqlite()?, session).await,
            DatabaseDriver::Mysql => create_mysql(self.mysql()?, session).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TutoringSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_by_id_sqlite(self.sqlite()?, id).await,
            DatabaseDriver::Mysql => get_by_id_mysql(self.mysql()?, id).await,
        }
    }

    async fn conditional_update_status(
        &self,
        id: i64,
        expected: SessionStatus,
        update: &StatusUpdate,
    ) -> Result<ConditionalUpdate> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                update_status_sqlite(self.sqlite()?, id, expected, update).await
            }
            DatabaseDriver::Mysql => update_status_mysql(self.mysql()?, id, expected, update).await,
        }
    }

    async fn conditional_assign_tutor(
        &self,
        id: i64,
        expected: SessionStatus,
        tutor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConditionalUpdate> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                assign_tutor_sqlite(self.sqlite()?, id, expected, tutor_id, now).await
            }
            DatabaseDriver::Mysql => {
                assign_tutor_mysql(self.mysql()?, id, expected, tutor_id, now).await
            }
        }
    }

    async fn list(
        &self,
        filter: &SessionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<TutoringSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_sqlite(self.sqlite()?, filter, params).await,
            DatabaseDriver::Mysql => list_mysql(self.mysql()?, filter, params).await,
        }
    }

    async fn list_scheduled_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TutoringSession>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                list_scheduled_before_sqlite(self.sqlite()?, cutoff, limit).await
            }
            DatabaseDriver::Mysql => list_scheduled_before_mysql(self.mysql()?, cutoff, limit).await,
        }
    }
}

const SELECT_COLUMNS: &str = "SELECT id, status, scheduled_at, started_at, ended_at, tutor_id, \
                              student_id, topic, created_at, updated_at FROM tutoring_sessions";

const FILTER_CLAUSE: &str = "WHERE (? IS NULL OR status = ?) \
                             AND (? IS NULL OR tutor_id = ?) \
                             AND (? IS NULL OR student_id = ?)";

const UPDATE_STATUS_SQL: &str = "UPDATE tutoring_sessions \
                                 SET status = ?, started_at = ?, ended_at = ?, updated_at = ? \
                                 WHERE id = ? AND status = ?";

const ASSIGN_TUTOR_SQL: &str = "UPDATE tutoring_sessions SET tutor_id = ?, updated_at = ? \
                                WHERE id = ? AND status = ?";

const INSERT_SQL: &str = "INSERT INTO tutoring_sessions \
                          (status, scheduled_at, started_at, ended_at, tutor_id, student_id, topic, created_at, updated_at) \
                          VALUES (?, ?, NULL, NULL, ?, ?, ?, ?, ?)";

fn select_by_id() -> String {
    format!("{} WHERE id = ?", SELECT_COLUMNS)
}

fn select_filtered() -> String {
    format!(
        "{} {} ORDER BY scheduled_at ASC, id ASC LIMIT ? OFFSET ?",
        SELECT_COLUMNS, FILTER_CLAUSE
    )
}

fn count_filtered() -> String {
    format!("SELECT COUNT(*) AS count FROM tutoring_sessions {}", FILTER_CLAUSE)
}

fn select_scheduled_before() -> String {
    format!(
        "{} WHERE status = ? AND scheduled_at < ? ORDER BY scheduled_at ASC, id ASC LIMIT ?",
        SELECT_COLUMNS
    )
}

/// Decide between `Conflict` and `NotFound` after a guarded write matched no row
fn miss_outcome(current: Option<TutoringSession>) -> ConditionalUpdate {
    match current {
        Some(session) => ConditionalUpdate::Conflict {
            current: session.status,
        },
        None => ConditionalUpdate::NotFound,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_sqlite(pool: &SqlitePool, session: &NewTutoringSession) -> Result<TutoringSession> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
    .bind(SessionStatus::Scheduled.as_str())
    .bind(session.scheduled_at)
    .bind(&session.tutor_id)
    .bind(&session.student_id)
    .bind(&session.topic)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create tutoring session")?;

    get_by_id_sqlite(pool, result.last_insert_rowid())
        .await?
        .context("Tutoring session not found after insert")
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<TutoringSession>> {
    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tutoring session")?;
    row.map(|r| row_to_session_sqlite(&r)).transpose()
}

async fn update_status_sqlite(
    pool: &SqlitePool,
    id: i64,
    expected: SessionStatus,
    update: &StatusUpdate,
) -> Result<ConditionalUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(UPDATE_STATUS_SQL)
        .bind(update.status.as_str())
        .bind(update.started_at)
        .bind(update.ended_at)
        .bind(update.updated_at)
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to update tutoring session status")?;

    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read tutoring session after update")?;
    tx.commit().await.context("Failed to commit status update")?;

    let current = row.map(|r| row_to_session_sqlite(&r)).transpose()?;
    if result.rows_affected() == 0 {
        return Ok(miss_outcome(current));
    }
    current
        .map(ConditionalUpdate::Applied)
        .context("Tutoring session vanished during status update")
}

async fn assign_tutor_sqlite(
    pool: &SqlitePool,
    id: i64,
    expected: SessionStatus,
    tutor_id: &str,
    now: DateTime<Utc>,
) -> Result<ConditionalUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(ASSIGN_TUTOR_SQL)
        .bind(tutor_id)
        .bind(now)
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to assign tutor")?;

    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read tutoring session after tutor assignment")?;
    tx.commit().await.context("Failed to commit tutor assignment")?;

    let current = row.map(|r| row_to_session_sqlite(&r)).transpose()?;
    if result.rows_affected() == 0 {
        return Ok(miss_outcome(current));
    }
    current
        .map(ConditionalUpdate::Applied)
        .context("Tutoring session vanished during tutor assignment")
}

async fn list_sqlite(
    pool: &SqlitePool,
    filter: &SessionFilter,
    params: &ListParams,
) -> Result<PagedResult<TutoringSession>> {
    let status = filter.status.map(|s| s.as_str());

    let count_row = sqlx::query(&count_filtered())
        .bind(status)
        .bind(status)
        .bind(&filter.tutor_id)
        .bind(&filter.tutor_id)
        .bind(&filter.student_id)
        .bind(&filter.student_id)
        .fetch_one(pool)
        .await
        .context("Failed to count tutoring sessions")?;
    let total: i64 = count_row.get("count");

    let rows = sqlx::query(&select_filtered())
        .bind(status)
        .bind(status)
        .bind(&filter.tutor_id)
        .bind(&filter.tutor_id)
        .bind(&filter.student_id)
        .bind(&filter.student_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tutoring sessions")?;

    let items = rows
        .iter()
        .map(row_to_session_sqlite)
        .collect::<Result<Vec<_>>>()?;
    Ok(PagedResult::new(items, total, params))
}

async fn list_scheduled_before_sqlite(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TutoringSession>> {
    let rows = sqlx::query(&select_scheduled_before())
        .bind(SessionStatus::Scheduled.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list overdue tutoring sessions")?;
    rows.iter().map(row_to_session_sqlite).collect()
}

fn row_to_session_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<TutoringSession> {
    let status: String = row.get("status");
    Ok(TutoringSession {
        id: row.get("id"),
        status: status.parse()?,
        scheduled_at: row.get("scheduled_at"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        tutor_id: row.get("tutor_id"),
        student_id: row.get("student_id"),
        topic: row.get("topic"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_mysql(pool: &MySqlPool, session: &NewTutoringSession) -> Result<TutoringSession> {
    let now = Utc::now();
    let result = sqlx::query(INSERT_SQL)
    .bind(SessionStatus::Scheduled.as_str())
    .bind(session.scheduled_at)
    .bind(&session.tutor_id)
    .bind(&session.student_id)
    .bind(&session.topic)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create tutoring session")?;

    get_by_id_mysql(pool, result.last_insert_id() as i64)
        .await?
        .context("Tutoring session not found after insert")
}

async fn get_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<TutoringSession>> {
    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get tutoring session")?;
    row.map(|r| row_to_session_mysql(&r)).transpose()
}

async fn update_status_mysql(
    pool: &MySqlPool,
    id: i64,
    expected: SessionStatus,
    update: &StatusUpdate,
) -> Result<ConditionalUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(UPDATE_STATUS_SQL)
        .bind(update.status.as_str())
        .bind(update.started_at)
        .bind(update.ended_at)
        .bind(update.updated_at)
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to update tutoring session status")?;

    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read tutoring session after update")?;
    tx.commit().await.context("Failed to commit status update")?;

    let current = row.map(|r| row_to_session_mysql(&r)).transpose()?;
    if result.rows_affected() == 0 {
        return Ok(miss_outcome(current));
    }
    current
        .map(ConditionalUpdate::Applied)
        .context("Tutoring session vanished during status update")
}

async fn assign_tutor_mysql(
    pool: &MySqlPool,
    id: i64,
    expected: SessionStatus,
    tutor_id: &str,
    now: DateTime<Utc>,
) -> Result<ConditionalUpdate> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(ASSIGN_TUTOR_SQL)
        .bind(tutor_id)
        .bind(now)
        .bind(id)
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to assign tutor")?;

    let row = sqlx::query(&select_by_id())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read tutoring session after tutor assignment")?;
    tx.commit().await.context("Failed to commit tutor assignment")?;

    let current = row.map(|r| row_to_session_mysql(&r)).transpose()?;
    // MySQL reports matched-but-unchanged rows as 0 affected, so reassigning
    // the same tutor must still count as applied when the guard held.
    match current {
        Some(session) if result.rows_affected() > 0 || session.status == expected => {
            Ok(ConditionalUpdate::Applied(session))
        }
        other => Ok(miss_outcome(other)),
    }
}

async fn list_mysql(
    pool: &MySqlPool,
    filter: &SessionFilter,
    params: &ListParams,
) -> Result<PagedResult<TutoringSession>> {
    let status = filter.status.map(|s| s.as_str());

    let count_row = sqlx::query(&count_filtered())
        .bind(status)
        .bind(status)
        .bind(&filter.tutor_id)
        .bind(&filter.tutor_id)
        .bind(&filter.student_id)
        .bind(&filter.student_id)
        .fetch_one(pool)
        .await
        .context("Failed to count tutoring sessions")?;
    let total: i64 = count_row.get("count");

    let rows = sqlx::query(&select_filtered())
        .bind(status)
        .bind(status)
        .bind(&filter.tutor_id)
        .bind(&filter.tutor_id)
        .bind(&filter.student_id)
        .bind(&filter.student_id)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list tutoring sessions")?;

    let items = rows
        .iter()
        .map(row_to_session_mysql)
        .collect::<Result<Vec<_>>>()?;
    Ok(PagedResult::new(items, total, params))
}

async fn list_scheduled_before_mysql(
    pool: &MySqlPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<TutoringSession>> {
    let rows = sqlx::query(&select_scheduled_before())
        .bind(SessionStatus::Scheduled.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list overdue tutoring sessions")?;
    rows.iter().map(row_to_session_mysql).collect()
}

fn row_to_session_mysql(row: &sqlx::mysql::MySqlRow) -> Result<TutoringSession> {
    let status: String = row.get("status");
    Ok(TutoringSession {
        id: row.get("id"),
        status: status.parse()?,
        scheduled_at: row.get("scheduled_at"),
        started_at: row.get("started_at"),
        ended_at: row.get("ended_at"),
        tutor_id: row.get("tutor_id"),
        student_id: row.get("student_id"),
        topic: row.get("topic"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
