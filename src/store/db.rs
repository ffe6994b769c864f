use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use crate::audit::{self, AuditEvent, NewAuditEvent};
use crate::errors::GateError;
use crate::gates::{ConstraintEnforcer, Violation};

/// Timestamp expression used for every row written by the store.
pub(crate) const SQL_NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub struct GateDb {
    conn: Connection,
    enforcer: ConstraintEnforcer,
}

impl GateDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("Failed to enable WAL journal")?;
        tracing::debug!(path = %path.display(), journal_mode = %mode, "opened gate database");
        let db = Self {
            conn,
            enforcer: ConstraintEnforcer::new(),
        };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self {
            conn,
            enforcer: ConstraintEnforcer::new(),
        };
        db.init()?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Begin a write transaction that takes the database write lock up front.
    ///
    /// A deferred transaction upgrading from read to write fails with
    /// SQLITE_BUSY without waiting when another connection holds the lock;
    /// an immediate one waits out `busy_timeout` at BEGIN instead.
    pub(crate) fn begin(&self) -> rusqlite::Result<Transaction<'_>> {
        Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
    }

    pub(crate) fn enforcer(&self) -> &ConstraintEnforcer {
        &self.enforcer
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure connection")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS directives (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'draft'
                        CHECK (status IN ('draft', 'active', 'in_progress', 'completed', 'deferred')),
                    current_phase TEXT NOT NULL DEFAULT 'INITIATION'
                        CHECK (current_phase IN ('INITIATION', 'PLANNING', 'IMPLEMENTATION', 'VERIFICATION', 'FINAL_APPROVAL')),
                    progress_percentage INTEGER NOT NULL DEFAULT 0
                        CHECK (progress_percentage BETWEEN 0 AND 100),
                    parent_id INTEGER REFERENCES directives(id),
                    metadata TEXT NOT NULL DEFAULT '{}',
                    created_by TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS plan_documents (
                    directive_id INTEGER PRIMARY KEY REFERENCES directives(id),
                    content TEXT NOT NULL,
                    updated_by TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS deliverables (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    directive_id INTEGER NOT NULL REFERENCES directives(id),
                    name TEXT NOT NULL,
                    kind TEXT NOT NULL DEFAULT 'artifact',
                    status TEXT NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'completed')),
                    completed_at TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    UNIQUE(directive_id, name)
                );

                CREATE TABLE IF NOT EXISTS handoffs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    directive_id INTEGER NOT NULL REFERENCES directives(id),
                    handoff_type TEXT NOT NULL,
                    from_phase TEXT NOT NULL,
                    to_phase TEXT NOT NULL,
                    attempt_number INTEGER NOT NULL CHECK (attempt_number >= 1),
                    status TEXT NOT NULL DEFAULT 'pending_acceptance'
                        CHECK (status IN ('pending_acceptance', 'accepted', 'rejected')),
                    validation_score INTEGER NOT NULL CHECK (validation_score BETWEEN 0 AND 100),
                    executive_summary TEXT NOT NULL,
                    completeness_report TEXT NOT NULL,
                    deliverables_manifest TEXT NOT NULL,
                    key_decisions TEXT NOT NULL,
                    known_issues TEXT NOT NULL,
                    resource_utilization TEXT NOT NULL,
                    action_items TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    validation_details TEXT NOT NULL DEFAULT '[]',
                    created_by TEXT NOT NULL,
                    created_by_role TEXT NOT NULL,
                    acceptance_threshold INTEGER
                        CHECK (acceptance_threshold IS NULL OR acceptance_threshold BETWEEN 1 AND 100),
                    decided_by TEXT,
                    rejection_reason TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    UNIQUE(directive_id, handoff_type, attempt_number),
                    CHECK (status != 'accepted'
                        OR (acceptance_threshold IS NOT NULL AND validation_score >= acceptance_threshold))
                );

                CREATE TABLE IF NOT EXISTS reviewer_results (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    directive_id INTEGER NOT NULL REFERENCES directives(id),
                    reviewer_code TEXT NOT NULL,
                    verdict TEXT NOT NULL CHECK (verdict IN ('PASS', 'FAIL', 'CONDITIONAL')),
                    confidence INTEGER NOT NULL CHECK (confidence BETWEEN 0 AND 100),
                    issues TEXT NOT NULL DEFAULT '[]',
                    warnings TEXT NOT NULL DEFAULT '[]',
                    recommendations TEXT NOT NULL DEFAULT '[]',
                    recorded_by TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                );

                CREATE TABLE IF NOT EXISTS reviewer_activations (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    directive_id INTEGER NOT NULL REFERENCES directives(id),
                    handoff_id INTEGER REFERENCES handoffs(id),
                    reviewer_code TEXT NOT NULL,
                    priority INTEGER NOT NULL CHECK (priority BETWEEN 0 AND 100),
                    matched_phrase TEXT NOT NULL,
                    delivery_key TEXT NOT NULL UNIQUE,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    delivered_at TEXT,
                    last_error TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                    UNIQUE(directive_id, reviewer_code)
                );

                CREATE TABLE IF NOT EXISTS audit_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    kind TEXT NOT NULL CHECK (kind IN ('constraint_violation', 'circuit_breaker_block')),
                    actor_id TEXT NOT NULL,
                    actor_role TEXT NOT NULL,
                    attempted_operation TEXT NOT NULL,
                    reason TEXT NOT NULL,
                    directive_id INTEGER,
                    handoff_id INTEGER,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_directives_parent ON directives(parent_id);
                CREATE INDEX IF NOT EXISTS idx_deliverables_directive ON deliverables(directive_id);
                CREATE INDEX IF NOT EXISTS idx_handoffs_directive ON handoffs(directive_id, handoff_type);
                CREATE INDEX IF NOT EXISTS idx_handoffs_status ON handoffs(status);
                CREATE INDEX IF NOT EXISTS idx_reviewer_results_directive ON reviewer_results(directive_id);
                CREATE INDEX IF NOT EXISTS idx_audit_events_directive ON audit_events(directive_id);

                CREATE UNIQUE INDEX IF NOT EXISTS idx_handoffs_one_accepted
                    ON handoffs(directive_id, handoff_type)
                    WHERE status = 'accepted';
                ",
            )
            .context("Failed to create tables")?;

        // Row-level guards. Triggers are the last line behind the store API.
        self.conn
            .execute_batch(
                "
                CREATE TRIGGER IF NOT EXISTS directives_no_delete
                BEFORE DELETE ON directives
                BEGIN
                    SELECT RAISE(ABORT, 'directives are never deleted');
                END;

                CREATE TRIGGER IF NOT EXISTS directives_identity_immutable
                BEFORE UPDATE OF id, title, description, parent_id, metadata, created_by, created_at
                ON directives
                BEGIN
                    SELECT RAISE(ABORT, 'directive identity columns are immutable');
                END;

                CREATE TRIGGER IF NOT EXISTS directives_phase_requires_handoff
                BEFORE UPDATE OF current_phase ON directives
                WHEN OLD.current_phase != NEW.current_phase
                    AND NOT EXISTS (
                        SELECT 1 FROM handoffs
                        WHERE directive_id = NEW.id
                          AND from_phase = OLD.current_phase
                          AND to_phase = NEW.current_phase
                          AND status = 'accepted'
                    )
                BEGIN
                    SELECT RAISE(ABORT, 'phase changes require an accepted handoff');
                END;

                CREATE TRIGGER IF NOT EXISTS handoffs_no_delete
                BEFORE DELETE ON handoffs
                BEGIN
                    SELECT RAISE(ABORT, 'handoffs are append-only');
                END;

                CREATE TRIGGER IF NOT EXISTS handoffs_closed_immutable
                BEFORE UPDATE ON handoffs
                WHEN OLD.status != 'pending_acceptance'
                BEGIN
                    SELECT RAISE(ABORT, 'closed handoffs are immutable');
                END;

                CREATE TRIGGER IF NOT EXISTS handoffs_content_immutable
                BEFORE UPDATE OF directive_id, handoff_type, from_phase, to_phase, attempt_number,
                    validation_score, executive_summary, completeness_report, deliverables_manifest,
                    key_decisions, known_issues, resource_utilization, action_items, payload,
                    validation_details, created_by, created_by_role, created_at
                ON handoffs
                BEGIN
                    SELECT RAISE(ABORT, 'handoff content is immutable');
                END;

                CREATE TRIGGER IF NOT EXISTS audit_events_no_update
                BEFORE UPDATE ON audit_events
                BEGIN
                    SELECT RAISE(ABORT, 'audit events are insert-only');
                END;

                CREATE TRIGGER IF NOT EXISTS audit_events_no_delete
                BEFORE DELETE ON audit_events
                BEGIN
                    SELECT RAISE(ABORT, 'audit events are insert-only');
                END;
                ",
            )
            .context("Failed to create triggers")?;

        Ok(())
    }

    /// Audit a denied write and turn it into the caller-facing error.
    ///
    /// Callers must have dropped any open transaction first, otherwise the
    /// audit row would roll back with it.
    pub(crate) fn deny(&self, violation: Violation, directive_id: Option<i64>) -> GateError {
        tracing::warn!(
            actor = %violation.actor,
            operation = %violation.operation.describe(),
            reason = %violation.reason,
            directive_id,
            "constraint violation"
        );
        if let Err(e) = audit::record(&self.conn, &NewAuditEvent::violation(&violation, directive_id))
        {
            return GateError::Store(e);
        }
        violation.into()
    }

    pub(crate) fn record_audit(&self, event: &NewAuditEvent) -> Result<i64> {
        audit::record(&self.conn, event)
    }

    pub fn audit_trail(&self, directive_id: Option<i64>) -> Result<Vec<AuditEvent>> {
        audit::list(&self.conn, directive_id)
    }
}

/// True when a SQLite error is a constraint failure (unique index, CHECK, trigger abort).
pub(crate) fn is_constraint_error(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// True when another connection held the write lock past `busy_timeout`.
pub(crate) fn is_busy_error(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let db = GateDb::new_in_memory()?;
        db.run_migrations()?;
        db.run_migrations()?;
        Ok(())
    }

    #[test]
    fn test_directive_rows_cannot_be_deleted() -> Result<()> {
        let db = GateDb::new_in_memory()?;
        db.conn().execute(
            "INSERT INTO directives (title, created_by) VALUES ('t', 'lead-1')",
            [],
        )?;
        let err = db
            .conn()
            .execute("DELETE FROM directives WHERE id = 1", [])
            .unwrap_err();
        assert!(err.to_string().contains("never deleted"));
        Ok(())
    }

    #[test]
    fn test_direct_phase_update_is_rejected_by_trigger() -> Result<()> {
        let db = GateDb::new_in_memory()?;
        db.conn().execute(
            "INSERT INTO directives (title, created_by) VALUES ('t', 'lead-1')",
            [],
        )?;
        let err = db
            .conn()
            .execute(
                "UPDATE directives SET current_phase = 'VERIFICATION' WHERE id = ?1",
                params![1],
            )
            .unwrap_err();
        assert!(is_constraint_error(&err));
        Ok(())
    }

    #[test]
    fn test_file_database_uses_wal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let db = GateDb::new(&dir.path().join("gate.db"))?;
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        assert_eq!(mode.to_lowercase(), "wal");
        Ok(())
    }

    #[test]
    fn test_second_writer_waits_then_sees_busy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("gate.db");
        let first = GateDb::new(&path)?;
        let second = GateDb::new(&path)?;
        second.conn().busy_timeout(std::time::Duration::from_millis(50))?;

        let held = first.begin()?;
        let err = second.begin().unwrap_err();
        assert!(is_busy_error(&err));
        held.commit()?;
        second.begin()?.commit()?;
        Ok(())
    }

    #[test]
    fn test_file_database_creates_parent_dirs() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("gate.db");
        let _db = GateDb::new(&path)?;
        assert!(path.exists());
        Ok(())
    }
}
