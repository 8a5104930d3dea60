//! Database migrations
//!
//! Schema migrations are embedded as SQL strings, one variant per backend,
//! and tracked in the `_migrations` table so each runs exactly once.
//!
//! ```ignore
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::Row;

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and increasing)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

impl Migration {
    /// The individual statements to run for `driver`
    pub fn statements(&self, driver: DatabaseDriver) -> Vec<&'static str> {
        let sql = match driver {
            DatabaseDriver::Sqlite => self.up_sqlite,
            DatabaseDriver::Mysql => self.up_mysql,
        };
        split_sql_statements(sql)
    }
}

/// All schema migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_tutoring_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tutoring_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                status VARCHAR(16) NOT NULL DEFAULT 'SCHEDULED'
                    CHECK (status IN ('SCHEDULED', 'LIVE', 'COMPLETED', 'NO_SHOW', 'CANCELLED')),
                scheduled_at TIMESTAMP NOT NULL,
                started_at TIMESTAMP,
                ended_at TIMESTAMP,
                tutor_id VARCHAR(64),
                student_id VARCHAR(64) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_tutoring_sessions_status_scheduled
                ON tutoring_sessions(status, scheduled_at);
            CREATE INDEX IF NOT EXISTS idx_tutoring_sessions_tutor ON tutoring_sessions(tutor_id);
            CREATE INDEX IF NOT EXISTS idx_tutoring_sessions_student ON tutoring_sessions(student_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tutoring_sessions (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                status VARCHAR(16) NOT NULL DEFAULT 'SCHEDULED',
                scheduled_at DATETIME(6) NOT NULL,
                started_at DATETIME(6) NULL,
                ended_at DATETIME(6) NULL,
                tutor_id VARCHAR(64) NULL,
                student_id VARCHAR(64) NOT NULL,
                created_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                updated_at DATETIME(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
                CONSTRAINT chk_tutoring_sessions_status
                    CHECK (status IN ('SCHEDULED', 'LIVE', 'COMPLETED', 'NO_SHOW', 'CANCELLED'))
            );
            CREATE INDEX idx_tutoring_sessions_status_scheduled
                ON tutoring_sessions(status, scheduled_at);
            CREATE INDEX idx_tutoring_sessions_tutor ON tutoring_sessions(tutor_id);
            CREATE INDEX idx_tutoring_sessions_student ON tutoring_sessions(student_id);
        "#,
    },
    Migration {
        version: 2,
        name: "add_tutoring_session_topic",
        up_sqlite: r#"
            ALTER TABLE tutoring_sessions ADD COLUMN topic VARCHAR(255);
        "#,
        up_mysql: r#"
            ALTER TABLE tutoring_sessions ADD COLUMN topic VARCHAR(255) NULL;
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = applied_versions(pool).await?;
    let mut count = 0;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        tracing::info!("Applying migration {}: {}", migration.version, migration.name);
        apply_migration(pool, migration)
            .await
            .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
        count += 1;
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    const SQL: &str = "SELECT version FROM _migrations ORDER BY version";

    let versions = if let Some(sqlite) = pool.as_sqlite() {
        sqlx::query(SQL)
            .fetch_all(sqlite)
            .await?
            .iter()
            .map(|row| row.get::<i64, _>("version") as i32)
            .collect()
    } else if let Some(mysql) = pool.as_mysql() {
        sqlx::query(SQL)
            .fetch_all(mysql)
            .await?
            .iter()
            .map(|row| row.get::<i32, _>("version"))
            .collect()
    } else {
        anyhow::bail!("Database pool exposes no backend");
    };

    Ok(versions)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    for statement in migration.statements(pool.driver()) {
        pool.execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    let record = format!(
        "INSERT INTO _migrations (version, name) VALUES ({}, '{}')",
        migration.version, migration.name
    );
    pool.execute(&record).await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_status_check_constraint() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let ok = pool
            .execute(
                "INSERT INTO tutoring_sessions (status, scheduled_at, student_id) \
                 VALUES ('SCHEDULED', '2030-01-01T10:00:00Z', 'S1')",
            )
            .await;
        assert!(ok.is_ok());

        let bad = pool
            .execute(
                "INSERT INTO tutoring_sessions (status, scheduled_at, student_id) \
                 VALUES ('PAUSED', '2030-01-01T10:00:00Z', 'S1')",
            )
            .await;
        assert!(bad.is_err(), "unknown status must be rejected by the schema");
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- comment only\n;\nCREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE INDEX i ON a(id)"]);
    }

    #[test]
    fn test_every_migration_has_statements() {
        for migration in MIGRATIONS {
            assert!(!migration.statements(DatabaseDriver::Sqlite).is_empty());
            assert!(!migration.statements(DatabaseDriver::Mysql).is_empty());
        }
    }
}
