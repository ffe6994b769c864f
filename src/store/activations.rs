use std::str::FromStr;

use anyhow::{Context, Result};
use gatekeeper_common::Priority;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::db::{GateDb, SQL_NOW};
use crate::review::{ActivationRecord, ReviewerActivation, ReviewerCode};

const ACTIVATION_COLUMNS: &str = "id, directive_id, handoff_id, reviewer_code, priority, matched_phrase, delivery_key, attempts, delivered_at, last_error";

/// Persist reviewer activations in the caller's transaction.
///
/// One row per `(directive, reviewer)`. A later activation only replaces the
/// stored priority and phrase when it outranks the existing one; delivery
/// state and the delivery key are never reset.
pub(crate) fn insert_activations(
    conn: &Connection,
    directive_id: i64,
    handoff_id: Option<i64>,
    activations: &[ReviewerActivation],
) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO reviewer_activations (directive_id, handoff_id, reviewer_code, priority, matched_phrase, delivery_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(directive_id, reviewer_code) DO UPDATE SET
                priority = excluded.priority,
                matched_phrase = excluded.matched_phrase,
                handoff_id = COALESCE(excluded.handoff_id, reviewer_activations.handoff_id)
             WHERE excluded.priority > reviewer_activations.priority",
        )
        .context("Failed to prepare activation insert")?;
    for activation in activations {
        stmt.execute(params![
            directive_id,
            handoff_id,
            activation.reviewer.as_code(),
            activation.priority.value(),
            activation.matched_phrase,
            Uuid::new_v4().to_string(),
        ])
        .context("Failed to insert reviewer activation")?;
    }
    Ok(())
}

/// Reviewers a directive is waiting on, highest priority first.
pub(crate) fn expected_reviewers(conn: &Connection, directive_id: i64) -> Result<Vec<ReviewerCode>> {
    Ok(list_activations(conn, Some(directive_id))?
        .into_iter()
        .map(|a| a.reviewer_code)
        .collect())
}

pub(crate) fn list_activations(conn: &Connection, directive_id: Option<i64>) -> Result<Vec<ActivationRecord>> {
    query(
        conn,
        &format!(
            "SELECT {} FROM reviewer_activations
             WHERE ?1 IS NULL OR directive_id = ?1
             ORDER BY priority DESC, id",
            ACTIVATION_COLUMNS
        ),
        params![directive_id],
    )
}

fn query(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ActivationRecord>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare activation query")?;
    let rows = stmt
        .query_map(params, |row| {
            Ok(ActivationRow {
                id: row.get(0)?,
                directive_id: row.get(1)?,
                handoff_id: row.get(2)?,
                reviewer_code: row.get(3)?,
                priority: row.get(4)?,
                matched_phrase: row.get(5)?,
                delivery_key: row.get(6)?,
                attempts: row.get(7)?,
                delivered_at: row.get(8)?,
                last_error: row.get(9)?,
            })
        })
        .context("Failed to query activations")?;
    let mut records = Vec::new();
    for row in rows {
        let r = row.context("Failed to read activation row")?;
        records.push(r.into_record()?);
    }
    Ok(records)
}

impl GateDb {
    pub fn list_activations(&self, directive_id: Option<i64>) -> Result<Vec<ActivationRecord>> {
        list_activations(self.conn(), directive_id)
    }

    /// Undelivered activations with attempts left, oldest first.
    pub fn pending_deliveries(&self, max_attempts: u32) -> Result<Vec<ActivationRecord>> {
        query(
            self.conn(),
            &format!(
                "SELECT {} FROM reviewer_activations
                 WHERE delivered_at IS NULL AND attempts < ?1
                 ORDER BY id",
                ACTIVATION_COLUMNS
            ),
            params![max_attempts],
        )
    }

    pub fn mark_delivered(&self, activation_id: i64) -> Result<()> {
        self.conn()
            .execute(
                &format!(
                    "UPDATE reviewer_activations
                     SET attempts = attempts + 1, delivered_at = {}, last_error = NULL
                     WHERE id = ?1 AND delivered_at IS NULL",
                    SQL_NOW
                ),
                params![activation_id],
            )
            .context("Failed to mark activation delivered")?;
        Ok(())
    }

    pub fn mark_delivery_failed(&self, activation_id: i64, error: &str) -> Result<()> {
        self.conn()
            .execute(
                "UPDATE reviewer_activations SET attempts = attempts + 1, last_error = ?2
                 WHERE id = ?1 AND delivered_at IS NULL",
                params![activation_id, error],
            )
            .context("Failed to record delivery failure")?;
        Ok(())
    }
}

struct ActivationRow {
    id: i64,
    directive_id: i64,
    handoff_id: Option<i64>,
    reviewer_code: String,
    priority: i64,
    matched_phrase: String,
    delivery_key: String,
    attempts: u32,
    delivered_at: Option<String>,
    last_error: Option<String>,
}

impl ActivationRow {
    fn into_record(self) -> Result<ActivationRecord> {
        let reviewer_code = match ReviewerCode::from_str(&self.reviewer_code) {
            Ok(code) => code,
            Err(never) => match never {},
        };
        Ok(ActivationRecord {
            id: self.id,
            directive_id: self.directive_id,
            handoff_id: self.handoff_id,
            reviewer_code,
            priority: Priority::new(self.priority).context("Invalid activation priority")?,
            matched_phrase: self.matched_phrase,
            delivery_key: Uuid::parse_str(&self.delivery_key).context("Invalid delivery key")?,
            attempts: self.attempts,
            delivered_at: self.delivered_at,
            last_error: self.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::TriggerContext;
    use crate::store::NewDirective;
    use gatekeeper_common::Actor;

    fn activation(code: ReviewerCode, priority: u8, phrase: &str) -> ReviewerActivation {
        ReviewerActivation {
            reviewer: code,
            priority: Priority::saturating(priority),
            matched_phrase: phrase.to_string(),
            context: TriggerContext::Directive,
        }
    }

    #[test]
    fn test_activation_upsert_keeps_highest_priority_and_key() -> Result<()> {
        let db = GateDb::new_in_memory()?;
        let d = db.create_directive(
            &NewDirective::new("Refactor", ""),
            &Actor::lead("lead-1"),
            &[activation(ReviewerCode::Regression, 80, "refactor")],
        )?;
        let before = db.list_activations(Some(d.id))?;
        assert_eq!(before.len(), 1);

        insert_activations(
            db.conn(),
            d.id,
            None,
            &[
                activation(ReviewerCode::Regression, 60, "rename"),
                activation(ReviewerCode::Testing, 70, "e2e"),
            ],
        )?;
        let after = db.list_activations(Some(d.id))?;
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].reviewer_code, ReviewerCode::Regression);
        assert_eq!(after[0].matched_phrase, "refactor");
        assert_eq!(after[0].delivery_key, before[0].delivery_key);

        insert_activations(
            db.conn(),
            d.id,
            None,
            &[activation(ReviewerCode::Regression, 95, "backward compatibility")],
        )?;
        let upgraded = db.list_activations(Some(d.id))?;
        assert_eq!(upgraded[0].priority.value(), 95);
        assert_eq!(upgraded[0].delivery_key, before[0].delivery_key);
        Ok(())
    }

    #[test]
    fn test_delivery_bookkeeping() -> Result<()> {
        let db = GateDb::new_in_memory()?;
        let d = db.create_directive(
            &NewDirective::new("Security fix", ""),
            &Actor::lead("lead-1"),
            &[activation(ReviewerCode::Security, 90, "security")],
        )?;
        let pending = db.pending_deliveries(2)?;
        assert_eq!(pending.len(), 1);

        db.mark_delivery_failed(pending[0].id, "sink offline")?;
        let retry = db.pending_deliveries(2)?;
        assert_eq!(retry[0].attempts, 1);
        assert_eq!(retry[0].last_error.as_deref(), Some("sink offline"));

        db.mark_delivery_failed(pending[0].id, "sink offline")?;
        assert!(db.pending_deliveries(2)?.is_empty());
        assert_eq!(expected_reviewers(db.conn(), d.id)?, vec![ReviewerCode::Security]);
        Ok(())
    }
}
