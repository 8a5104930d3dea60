//! In-memory session repository
//!
//! Keeps rows in a `BTreeMap` behind a `tokio::sync::RwLock`. The compare and
//! the write of a conditional update happen under one write guard, which gives
//! the same compare-and-swap semantics as the SQL store. Used for tests and
//! for embedding the engine without a database.

use crate::db::repositories::{ConditionalUpdate, SessionRepository};
use crate::models::{
    ListParams, NewTutoringSession, PagedResult, SessionFilter, SessionStatus, StatusUpdate,
    TutoringSession,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Rows {
    next_id: i64,
    sessions: BTreeMap<i64, TutoringSession>,
}

/// Session store held entirely in process memory
#[derive(Default)]
pub struct InMemorySessionRepository {
    rows: RwLock<Rows>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Arc<dyn SessionRepository> {
        Arc::new(Self::new())
    }

    /// Insert a row as-is, bypassing the SCHEDULED-only `create`.
    ///
    /// Lets tests start from any lifecycle state.
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, mut session: TutoringSession) -> TutoringSession {
        let mut rows = self.rows.write().await;
        if session.id <= 0 {
            rows.next_id += 1;
            session.id = rows.next_id;
        } else {
            rows.next_id = rows.next_id.max(session.id);
        }
        rows.sessions.insert(session.id, session.clone());
        session
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: &NewTutoringSession) -> Result<TutoringSession> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        rows.next_id += 1;
        let created = TutoringSession {
            id: rows.next_id,
            status: SessionStatus::Scheduled,
            scheduled_at: session.scheduled_at,
            started_at: None,
            ended_at: None,
            tutor_id: session.tutor_id.clone(),
            student_id: session.student_id.clone(),
            topic: session.topic.clone(),
            created_at: now,
            updated_at: now,
        };
        rows.sessions.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<TutoringSession>> {
        Ok(self.rows.read().await.sessions.get(&id).cloned())
    }

    async fn conditional_update_status(
        &self,
        id: i64,
        expected: SessionStatus,
        update: &StatusUpdate,
    ) -> Result<ConditionalUpdate> {
        let mut rows = self.rows.write().await;
        let Some(session) = rows.sessions.get_mut(&id) else {
            return Ok(ConditionalUpdate::NotFound);
        };
        if session.status != expected {
            return Ok(ConditionalUpdate::Conflict {
                current: session.status,
            });
        }

        session.status = update.status;
        session.started_at = update.started_at;
        session.ended_at = update.ended_at;
        session.updated_at = update.updated_at;
        Ok(ConditionalUpdate::Applied(session.clone()))
    }

    async fn conditional_assign_tutor(
        &self,
        id: i64,
        expected: SessionStatus,
        tutor_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConditionalUpdate> {
        let mut rows = self.rows.write().await;
        let Some(session) = rows.sessions.get_mut(&id) else {
            return Ok(ConditionalUpdate::NotFound);
        };
        if session.status != expected {
            return Ok(ConditionalUpdate::Conflict {
                current: session.status,
            });
        }

        session.tutor_id = Some(tutor_id.to_string());
        session.updated_at = now;
        Ok(ConditionalUpdate::Applied(session.clone()))
    }

    async fn list(
        &self,
        filter: &SessionFilter,
        params: &ListParams,
    ) -> Result<PagedResult<TutoringSession>> {
        let rows = self.rows.read().await;
        let mut matching: Vec<TutoringSession> = rows
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));

        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();
        Ok(PagedResult::new(items, total, params))
    }

    async fn list_scheduled_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<TutoringSession>> {
        let rows = self.rows.read().await;
        let mut overdue: Vec<TutoringSession> = rows
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::Scheduled && s.scheduled_at < cutoff)
            .cloned()
            .collect();
        overdue.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at).then(a.id.cmp(&b.id)));
        overdue.truncate(limit.max(0) as usize);
        Ok(overdue)
    }
}
