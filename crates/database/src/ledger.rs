//! Per-provider migration ledger.
//!
//! Every provider is a separate database with its own history, so each one
//! records applied migrations in its own `<provider>_migrations` table.
//!
//! A migration is claimed before its body runs: the ledger row is inserted
//! with `ON CONFLICT DO NOTHING` and only the applier that gets the row back
//! executes the statements. On pooled sessions the claim and the body share
//! one transaction, so a concurrent claimer waits on the unique index and a
//! failed body leaves no row behind.

use crate::provider::Provider;
use crate::session::{decode_all, Session, Statement};
use crate::{DbError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STATEMENT_BREAKPOINT: &str = "--> statement-breakpoint";

/// SQLSTATEs raised when two sessions create the same table at once.
const CONCURRENT_CREATE_CODES: [&str; 2] = ["23505", "42P07"];

/// A migration as produced by a migration-file enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub name: String,
    pub contents: String,
    pub checksum: Option<String>,
}

impl MigrationFile {
    /// Build a migration, computing the SHA-256 checksum of its contents.
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents = contents.into();
        let checksum = format!("{:x}", Sha256::digest(contents.as_bytes()));
        Self {
            name: name.into(),
            contents,
            checksum: Some(checksum),
        }
    }

    /// Individual statements, split on breakpoint markers.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.contents
            .split(STATEMENT_BREAKPOINT)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// A row of the ledger table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub name: String,
    pub executed_at: DateTime<Utc>,
    pub checksum: Option<String>,
}

/// Derived view of a provider's migration state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationStatus {
    pub provider: Provider,
    /// Applied names, oldest first.
    pub applied: Vec<String>,
    /// Supplied names not yet in the ledger, in supplied order.
    pub pending: Vec<String>,
    pub last_applied: Option<String>,
    /// Applied names whose recorded checksum differs from the supplied file.
    pub drifted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyReport {
    pub provider: Provider,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
}

/// Ledger operations for the provider behind one session.
#[derive(Clone)]
pub struct MigrationLedger {
    session: Arc<dyn Session>,
}

impl MigrationLedger {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }

    pub fn provider(&self) -> Provider {
        self.session.provider()
    }

    pub fn table(&self) -> &'static str {
        self.provider().ledger_table()
    }

    pub(crate) fn confirmation_required(provider: Provider) -> DbError {
        DbError::ConfirmationRequired {
            operation: "reset_migrations",
            provider,
        }
    }

    /// Create the ledger table if it does not exist.
    ///
    /// `CREATE TABLE IF NOT EXISTS` can still fail when another session
    /// creates the table concurrently; that case counts as success once the
    /// table is visible.
    pub async fn ensure(&self) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id SERIAL PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                executed_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                checksum TEXT
            )",
            self.table()
        );
        match self.session.execute(&Statement::new(sql)).await {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .sqlstate()
                    .is_some_and(|code| CONCURRENT_CREATE_CODES.iter().any(|c| *c == code)) =>
            {
                if self.exists().await? {
                    debug!(provider = %self.provider(), "Ledger table created by a concurrent session");
                    Ok(())
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Whether the ledger table exists in the current schema.
    pub async fn exists(&self) -> Result<bool> {
        let rows = self
            .session
            .execute(
                &Statement::new(
                    "SELECT EXISTS (
                        SELECT 1 FROM information_schema.tables
                        WHERE table_schema = current_schema() AND table_name = $1
                    ) AS present",
                )
                .bind(self.table()),
            )
            .await?;

        match rows.first() {
            Some(row) => row.get("present"),
            None => Ok(false),
        }
    }

    /// Ledger rows in execution order. An absent table reads as empty.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        if !self.exists().await? {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT name, executed_at, checksum FROM {} ORDER BY executed_at ASC, id ASC",
            self.table()
        );
        decode_all(self.session.execute(&Statement::new(sql)).await?)
    }

    /// Record a migration as applied. Returns `false` when it was already
    /// recorded.
    pub async fn record_applied(&self, name: &str, checksum: Option<&str>) -> Result<bool> {
        let rows = self
            .session
            .execute(&Statement::new(self.claim_sql()).bind(name).bind(checksum))
            .await?;
        Ok(!rows.is_empty())
    }

    fn claim_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, checksum) VALUES ($1, $2)
             ON CONFLICT (name) DO NOTHING
             RETURNING name",
            self.table()
        )
    }

    /// Compare the ledger against an ordered list of known migrations.
    pub async fn status(&self, migrations: &[MigrationFile]) -> Result<MigrationStatus> {
        let applied = self.applied().await?;
        Ok(build_status(self.provider(), &applied, migrations))
    }

    /// Run every migration not yet in the ledger, in order. A migration whose
    /// name another applier claimed first is reported as skipped and its body
    /// is not executed.
    pub async fn apply(&self, migrations: &[MigrationFile]) -> Result<ApplyReport> {
        self.ensure().await?;

        let mut done: HashSet<String> = self.applied().await?.into_iter().map(|m| m.name).collect();
        let mut report = ApplyReport {
            provider: self.provider(),
            applied: Vec::new(),
            skipped: Vec::new(),
        };

        for migration in migrations {
            if done.contains(&migration.name) {
                report.skipped.push(migration.name.clone());
                continue;
            }

            let claimed = match self.session.pg_pool() {
                Some(pool) => self.run_in_transaction(pool, migration).await?,
                None => self.claim_then_run(migration).await?,
            };

            if claimed {
                info!(provider = %self.provider(), migration = %migration.name, "Migration applied");
                report.applied.push(migration.name.clone());
            } else {
                debug!(provider = %self.provider(), migration = %migration.name, "Migration claimed by another applier");
                report.skipped.push(migration.name.clone());
            }
            done.insert(migration.name.clone());
        }

        Ok(report)
    }

    /// Claim and body in one transaction. Returns `false` when the name was
    /// already recorded.
    async fn run_in_transaction(&self, pool: &PgPool, migration: &MigrationFile) -> Result<bool> {
        let provider = self.provider();
        let backend = |e: sqlx::Error| DbError::backend(provider, e);
        let claim = self.claim_sql();

        let mut tx = pool.begin().await.map_err(backend)?;
        let claimed = sqlx::query(&claim)
            .bind(migration.name.as_str())
            .bind(migration.checksum.as_deref())
            .fetch_optional(&mut *tx)
            .await
            .map_err(backend)?
            .is_some();

        if !claimed {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        // Dropping the transaction on error rolls the claim back.
        for sql in migration.statements() {
            sqlx::query(sql).execute(&mut *tx).await.map_err(backend)?;
        }
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    /// Claim first, then run the body. Used where statements cannot share a
    /// transaction; a failed body deletes the claim again.
    async fn claim_then_run(&self, migration: &MigrationFile) -> Result<bool> {
        if !self
            .record_applied(&migration.name, migration.checksum.as_deref())
            .await?
        {
            return Ok(false);
        }

        for sql in migration.statements() {
            if let Err(err) = self.session.execute(&Statement::new(sql)).await {
                self.release_claim(&migration.name).await;
                return Err(err);
            }
        }
        Ok(true)
    }

    async fn release_claim(&self, name: &str) {
        let sql = format!("DELETE FROM {} WHERE name = $1", self.table());
        if let Err(e) = self.session.execute(&Statement::new(sql).bind(name)).await {
            warn!(provider = %self.provider(), migration = name, error = %e, "Failed to release migration claim");
        }
    }

    /// Drop the ledger table. Refused unless `confirm` is set.
    pub async fn reset(&self, confirm: bool) -> Result<()> {
        if !confirm {
            return Err(Self::confirmation_required(self.provider()));
        }

        let sql = format!("DROP TABLE IF EXISTS {}", self.table());
        self.session.execute(&Statement::new(sql)).await?;
        warn!(provider = %self.provider(), table = self.table(), "Migration ledger dropped");
        Ok(())
    }
}

fn build_status(
    provider: Provider,
    applied: &[AppliedMigration],
    migrations: &[MigrationFile],
) -> MigrationStatus {
    let recorded: HashMap<&str, Option<&str>> = applied
        .iter()
        .map(|m| (m.name.as_str(), m.checksum.as_deref()))
        .collect();

    let pending = migrations
        .iter()
        .filter(|m| !recorded.contains_key(m.name.as_str()))
        .map(|m| m.name.clone())
        .collect();

    let drifted = migrations
        .iter()
        .filter(|m| match (recorded.get(m.name.as_str()), m.checksum.as_deref()) {
            (Some(Some(stored)), Some(current)) => *stored != current,
            _ => false,
        })
        .map(|m| m.name.clone())
        .collect();

    MigrationStatus {
        provider,
        applied: applied.iter().map(|m| m.name.clone()).collect(),
        pending,
        last_applied: applied.last().map(|m| m.name.clone()),
        drifted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Row, SqlValue};
    use crate::testing::ScriptedSession;

    fn ledger(session: &Arc<ScriptedSession>) -> MigrationLedger {
        MigrationLedger::new(session.clone())
    }

    fn applied_row(name: &str, at: &str, checksum: Option<&str>) -> Row {
        Row::new()
            .with("name", name)
            .with("executed_at", at)
            .with("checksum", checksum)
    }

    #[test]
    fn test_checksum_and_statement_split() {
        let m = MigrationFile::new(
            "0001_init",
            "CREATE TABLE a (id INT);\n--> statement-breakpoint\n\nCREATE TABLE b (id INT);\n--> statement-breakpoint\n",
        );
        assert_eq!(m.checksum.as_deref().map(str::len), Some(64));
        let statements: Vec<_> = m.statements().collect();
        assert_eq!(statements, vec!["CREATE TABLE a (id INT);", "CREATE TABLE b (id INT);"]);
        assert_eq!(MigrationFile::new("x", "SELECT 1").checksum, MigrationFile::new("y", "SELECT 1").checksum);
    }

    #[tokio::test]
    async fn test_status_treats_missing_table_as_empty() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledCloud));
        session.push_rows(vec![Row::new().with("present", false)]);

        let known = vec![MigrationFile::new("0001", "SELECT 1"), MigrationFile::new("0002", "SELECT 2")];
        let status = ledger(&session).status(&known).await.unwrap();

        assert_eq!(status.provider, Provider::PooledCloud);
        assert!(status.applied.is_empty());
        assert_eq!(status.pending, vec!["0001", "0002"]);
        assert!(status.last_applied.is_none());
        assert_eq!(session.statements().len(), 1);
        assert_eq!(session.statements()[0].params, vec![SqlValue::from("pooled_cloud_migrations")]);
    }

    #[tokio::test]
    async fn test_status_reports_order_and_drift() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledLocal));
        let first = MigrationFile::new("0001", "SELECT 1");
        let second = MigrationFile::new("0002", "SELECT 2");
        session.push_rows(vec![Row::new().with("present", true)]);
        session.push_rows(vec![
            applied_row("0001", "2024-01-01T00:00:00+00:00", first.checksum.as_deref()),
            applied_row("0002", "2024-01-02T00:00:00+00:00", Some("stale")),
        ]);

        let known = vec![first, second, MigrationFile::new("0003", "SELECT 3")];
        let status = ledger(&session).status(&known).await.unwrap();

        assert_eq!(status.applied, vec!["0001", "0002"]);
        assert_eq!(status.pending, vec!["0003"]);
        assert_eq!(status.last_applied.as_deref(), Some("0002"));
        assert_eq!(status.drifted, vec!["0002"]);
        assert!(session.statements()[1].sql.contains("ORDER BY executed_at ASC"));
    }

    #[tokio::test]
    async fn test_apply_runs_pending_only() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledLocal));
        session.push_empty(); // ensure
        session.push_rows(vec![Row::new().with("present", true)]);
        session.push_rows(vec![applied_row("0001", "2024-01-01T00:00:00+00:00", None)]);
        session.push_rows(vec![Row::new().with("name", "0002")]); // claim
        session.push_empty(); // 0002 first statement
        session.push_empty(); // 0002 second statement

        let migrations = vec![
            MigrationFile::new("0001", "CREATE TABLE a (id INT)"),
            MigrationFile::new("0002", "CREATE TABLE b (id INT)\n--> statement-breakpoint\nCREATE INDEX b_id ON b (id)"),
        ];
        let report = ledger(&session).apply(&migrations).await.unwrap();

        assert_eq!(report.applied, vec!["0002"]);
        assert_eq!(report.skipped, vec!["0001"]);

        let statements = session.statements();
        let sql: Vec<_> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(sql.len(), 6);
        assert!(sql[0].starts_with("CREATE TABLE IF NOT EXISTS pooled_local_migrations"));
        assert!(sql[3].contains("ON CONFLICT (name) DO NOTHING"));
        assert_eq!(statements[3].params[0], SqlValue::from("0002"));
        assert_eq!(sql[4], "CREATE TABLE b (id INT)");
        assert_eq!(sql[5], "CREATE INDEX b_id ON b (id)");
        assert!(!sql.iter().any(|s| s.contains("CREATE TABLE a")));
    }

    #[tokio::test]
    async fn test_apply_skips_body_when_claim_is_lost() {
        let session = Arc::new(ScriptedSession::new(Provider::EdgeHttp));
        session.push_empty(); // ensure
        session.push_rows(vec![Row::new().with("present", true)]);
        session.push_empty(); // nothing applied yet
        session.push_empty(); // another applier holds the name

        let report = ledger(&session)
            .apply(&[MigrationFile::new("0001", "INSERT INTO counter VALUES (1)")])
            .await
            .unwrap();

        assert!(report.applied.is_empty());
        assert_eq!(report.skipped, vec!["0001"]);
        let sql: Vec<_> = session.statements().into_iter().map(|s| s.sql).collect();
        assert_eq!(sql.len(), 4);
        assert!(sql[3].starts_with("INSERT INTO edge_http_migrations"));
        assert!(!sql.iter().any(|s| s.contains("counter")));
    }

    #[tokio::test]
    async fn test_apply_releases_claim_on_failed_statement() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledLocal));
        session.push_empty();
        session.push_rows(vec![Row::new().with("present", true)]);
        session.push_empty();
        session.push_rows(vec![Row::new().with("name", "0001")]);
        session.push_error("relation \"b\" already exists");

        let err = ledger(&session)
            .apply(&[
                MigrationFile::new("0001", "CREATE TABLE b (id INT)"),
                MigrationFile::new("0002", "CREATE TABLE c (id INT)"),
            ])
            .await
            .unwrap_err();

        assert!(err.is_backend());
        let statements = session.statements();
        let last = statements.last().unwrap();
        assert_eq!(last.sql, "DELETE FROM pooled_local_migrations WHERE name = $1");
        assert_eq!(last.params, vec![SqlValue::from("0001")]);
        assert!(!statements.iter().any(|s| s.sql.contains("CREATE TABLE c")));
    }

    #[tokio::test]
    async fn test_ensure_tolerates_concurrent_create() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledLocal));
        session.push_error_code(
            "23505",
            "duplicate key value violates unique constraint \"pg_type_typname_nsp_index\"",
        );
        session.push_rows(vec![Row::new().with("present", true)]);

        ledger(&session).ensure().await.unwrap();
        assert_eq!(session.statements().len(), 2);
        assert!(session.statements()[1].sql.contains("information_schema.tables"));

        session.push_error_code("42P07", "relation already exists");
        session.push_rows(vec![Row::new().with("present", true)]);
        ledger(&session).ensure().await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_propagates_other_failures() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledCloud));
        session.push_error_code("42501", "permission denied for schema public");

        let err = ledger(&session).ensure().await.unwrap_err();
        assert_eq!(err.sqlstate().as_deref(), Some("42501"));
        assert_eq!(session.statements().len(), 1);

        // A duplicate that still leaves no table is a real failure
        session.push_error_code("23505", "duplicate key");
        session.push_rows(vec![Row::new().with("present", false)]);
        let err = ledger(&session).ensure().await.unwrap_err();
        assert_eq!(err.sqlstate().as_deref(), Some("23505"));
    }

    #[tokio::test]
    async fn test_reset_requires_confirmation() {
        let session = Arc::new(ScriptedSession::new(Provider::PooledCloud));
        let err = ledger(&session).reset(false).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::ConfirmationRequired { operation: "reset_migrations", provider: Provider::PooledCloud }
        ));
        assert!(session.statements().is_empty());

        ledger(&session).reset(true).await.unwrap();
        assert_eq!(session.statements()[0].sql, "DROP TABLE IF EXISTS pooled_cloud_migrations");
    }
}
