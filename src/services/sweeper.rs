//! No-show sweep
//!
//! Periodically marks SCHEDULED sessions as NO_SHOW once they are more than
//! `no_show_after` past their scheduled time. Every move goes through
//! `SessionLifecycleService::atomic_update_session_status`, so a session that
//! a tutor starts at the same moment is never clobbered.

use crate::config::SessionConfig;
use crate::models::SessionStatus;
use crate::services::lifecycle::{SessionLifecycleError, SessionLifecycleService};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Most sessions examined per run
const SWEEP_BATCH_SIZE: i64 = 500;

/// Outcome of one sweep run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub marked_no_show: usize,
    pub skipped: usize,
}

pub struct NoShowSweeper {
    lifecycle: Arc<SessionLifecycleService>,
    no_show_after: Duration,
}

impl NoShowSweeper {
    pub fn new(lifecycle: Arc<SessionLifecycleService>, config: &SessionConfig) -> Self {
        Self {
            lifecycle,
            no_show_after: config.no_show_after(),
        }
    }

    /// Sweep using the current time
    pub async fn run_once(&self) -> Result<SweepReport, SessionLifecycleError> {
        self.run_once_at(Utc::now()).await
    }

    /// Sweep as if the clock read `now`.
    ///
    /// Fails only if the overdue sessions cannot be listed; per-session
    /// failures are logged and counted as skipped.
    pub async fn run_once_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<SweepReport, SessionLifecycleError> {
        // Nothing can be scheduled before the earliest representable instant
        let Some(cutoff) = now.checked_sub_signed(self.no_show_after) else {
            return Ok(SweepReport::default());
        };
        let overdue = self.lifecycle.list_overdue(cutoff, SWEEP_BATCH_SIZE).await?;

        let mut report = SweepReport {
            examined: overdue.len(),
            ..SweepReport::default()
        };

        for session in overdue {
            match self
                .lifecycle
                .atomic_update_session_status(session.id, SessionStatus::NoShow)
                .await
            {
                Ok(_) => report.marked_no_show += 1,
                Err(
                    err @ (SessionLifecycleError::ConcurrentModification { .. }
                    | SessionLifecycleError::InvalidTransition { .. }
                    | SessionLifecycleError::NotFound(_)),
                ) => {
                    tracing::debug!(session_id = session.id, "Sweep skipped session: {}", err);
                    report.skipped += 1;
                }
                Err(err) => {
                    tracing::warn!(session_id = session.id, "Sweep failed for session: {}", err);
                    report.skipped += 1;
                }
            }
        }

        if report.marked_no_show > 0 {
            tracing::info!(
                examined = report.examined,
                marked = report.marked_no_show,
                skipped = report.skipped,
                "No-show sweep finished"
            );
        }

        Ok(report)
    }

    /// Run the sweep every `interval` on a background task.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::warn!("No-show sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{InMemorySessionRepository, SessionRepository};
    use crate::models::TutoringSession;

    fn session(status: SessionStatus, scheduled_at: DateTime<Utc>) -> TutoringSession {
        TutoringSession {
            id: 0,
            status,
            scheduled_at,
            started_at: None,
            ended_at: None,
            tutor_id: Some("T1".to_string()),
            student_id: "S1".to_string(),
            topic: None,
            created_at: scheduled_at - Duration::days(1),
            updated_at: scheduled_at - Duration::days(1),
        }
    }

    fn sweeper_over(repo: Arc<InMemorySessionRepository>) -> NoShowSweeper {
        let config = SessionConfig {
            no_show_after_minutes: 15,
            ..SessionConfig::default()
        };
        let lifecycle = Arc::new(SessionLifecycleService::new(repo, &config));
        NoShowSweeper::new(lifecycle, &config)
    }

    #[tokio::test]
    async fn test_marks_only_overdue_scheduled_sessions() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let now = Utc::now();

        let overdue = repo
            .insert_raw(session(SessionStatus::Scheduled, now - Duration::minutes(30)))
            .await;
        let recent = repo
            .insert_raw(session(SessionStatus::Scheduled, now - Duration::minutes(5)))
            .await;
        let mut live = session(SessionStatus::Live, now - Duration::minutes(40));
        live.started_at = Some(now - Duration::minutes(40));
        let live = repo.insert_raw(live).await;

        let report = sweeper_over(repo.clone()).run_once_at(now).await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                examined: 1,
                marked_no_show: 1,
                skipped: 0
            }
        );

        let swept = repo.get_by_id(overdue.id).await.unwrap().unwrap();
        assert_eq!(swept.status, SessionStatus::NoShow);
        assert!(swept.ended_at.is_some());
        assert!(swept.started_at.is_none());

        let untouched = repo.get_by_id(recent.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, SessionStatus::Scheduled);
        let still_live = repo.get_by_id(live.id).await.unwrap().unwrap();
        assert_eq!(still_live.status, SessionStatus::Live);
    }

    #[tokio::test]
    async fn test_second_run_finds_nothing() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let now = Utc::now();
        repo.insert_raw(session(SessionStatus::Scheduled, now - Duration::hours(2)))
            .await;

        let sweeper = sweeper_over(repo);
        assert_eq!(sweeper.run_once_at(now).await.unwrap().marked_no_show, 1);
        assert_eq!(
            sweeper.run_once_at(now).await.unwrap(),
            SweepReport::default()
        );
    }

    #[tokio::test]
    async fn test_cutoff_before_earliest_instant_sweeps_nothing() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let pending = repo
            .insert_raw(session(
                SessionStatus::Scheduled,
                Utc::now() - Duration::hours(2),
            ))
            .await;

        let report = sweeper_over(repo.clone())
            .run_once_at(DateTime::<Utc>::MIN_UTC)
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());

        let untouched = repo.get_by_id(pending.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, SessionStatus::Scheduled);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let report = sweeper_over(repo).run_once().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
