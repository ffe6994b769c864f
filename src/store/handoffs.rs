use std::str::FromStr;

use anyhow::{Context, Result};
use gatekeeper_common::{Actor, HandoffType, Phase, Role, Score};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use super::activations;
use super::db::{GateDb, SQL_NOW, is_busy_error, is_constraint_error};
use super::directives::{refresh_progress, require_directive};
use super::models::*;
use crate::audit::NewAuditEvent;
use crate::errors::{GateError, GateResult};
use crate::gates::{CircuitBreaker, GateDecision, Operation};
use crate::review::{ReviewerActivation, remediation};

const HANDOFF_COLUMNS: &str = "id, directive_id, handoff_type, from_phase, to_phase, attempt_number, status, validation_score, \
    executive_summary, completeness_report, deliverables_manifest, key_decisions, known_issues, resource_utilization, action_items, \
    payload, validation_details, created_by, created_by_role, acceptance_threshold, decided_by, rejection_reason, created_at, updated_at";

/// Result of accepting a handoff.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AcceptResult {
    /// This call advanced the directive.
    Accepted {
        handoff: Handoff,
        directive: Directive,
        progress: u8,
    },
    /// The handoff had already been accepted; nothing changed.
    AlreadyAccepted { handoff_id: i64 },
}

// ── Loaders ──────────────────────────────────────────────────────────

pub(crate) fn load_handoffs(conn: &Connection, directive_id: i64) -> Result<Vec<Handoff>> {
    query_handoffs(
        conn,
        &format!(
            "SELECT {} FROM handoffs WHERE directive_id = ?1 ORDER BY id",
            HANDOFF_COLUMNS
        ),
        params![directive_id],
    )
}

pub(crate) fn load_handoff(conn: &Connection, id: i64) -> Result<Option<Handoff>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM handoffs WHERE id = ?1", HANDOFF_COLUMNS),
            params![id],
            HandoffRow::from_row,
        )
        .optional()
        .context("Failed to query handoff")?;
    row.map(HandoffRow::into_handoff).transpose()
}

pub(crate) fn require_handoff(conn: &Connection, id: i64) -> GateResult<Handoff> {
    load_handoff(conn, id)?.ok_or(GateError::HandoffNotFound { id })
}

fn query_handoffs(conn: &Connection, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Handoff>> {
    let mut stmt = conn.prepare(sql).context("Failed to prepare handoff query")?;
    let rows = stmt
        .query_map(params, HandoffRow::from_row)
        .context("Failed to query handoffs")?;
    let mut handoffs = Vec::new();
    for row in rows {
        let r = row.context("Failed to read handoff row")?;
        handoffs.push(r.into_handoff()?);
    }
    Ok(handoffs)
}

fn has_accepted(conn: &Connection, directive_id: i64, handoff_type: HandoffType) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM handoffs
         WHERE directive_id = ?1 AND handoff_type = ?2 AND status = 'accepted')",
        params![directive_id, handoff_type.as_str()],
        |row| row.get(0),
    )
    .context("Failed to check accepted handoffs")
}

// ── Handoff operations ───────────────────────────────────────────────

impl GateDb {
    /// Append a scored handoff attempt in `pending_acceptance` and queue its
    /// reviewer activations in the same transaction.
    pub fn insert_handoff_attempt(
        &self,
        input: &NewHandoff,
        actor: &Actor,
        activations: &[ReviewerActivation],
    ) -> GateResult<Handoff> {
        let from = input.handoff_type.from_phase();
        let to = input.handoff_type.to_phase();
        let conflict = || GateError::ConcurrentTransitionConflict {
            directive_id: input.directive_id,
            handoff_type: input.handoff_type,
        };
        let tx = match self.begin() {
            Ok(tx) => tx,
            Err(e) if is_busy_error(&e) => return Err(conflict()),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to begin transaction").into()),
        };
        let directive = require_directive(&tx, input.directive_id)?;
        if let Err(v) = self.enforcer().check(
            actor,
            Operation::CreateHandoff { from },
            Some(directive.current_phase),
        ) {
            drop(tx);
            return Err(self.deny(v, Some(directive.id)));
        }
        input.payload.ensure_matches(input.handoff_type)?;
        if directive.current_phase != from {
            return Err(GateError::InvalidTransition {
                from: directive.current_phase,
                to,
                reason: format!("directive is in {}, handoff leaves {}", directive.current_phase, from),
            });
        }
        if directive.status == DirectiveStatus::Completed {
            return Err(GateError::InvalidTransition {
                from,
                to,
                reason: "directive is completed".to_string(),
            });
        }

        let attempt: u32 = tx
            .query_row(
                "SELECT COALESCE(MAX(attempt_number), 0) + 1 FROM handoffs
                 WHERE directive_id = ?1 AND handoff_type = ?2",
                params![directive.id, input.handoff_type.as_str()],
                |row| row.get(0),
            )
            .context("Failed to compute attempt number")?;
        let f = &input.fields;
        let inserted = tx
            .execute(
                "INSERT INTO handoffs (directive_id, handoff_type, from_phase, to_phase, attempt_number, validation_score,
                    executive_summary, completeness_report, deliverables_manifest, key_decisions, known_issues,
                    resource_utilization, action_items, payload, validation_details, created_by, created_by_role)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
                 ON CONFLICT(directive_id, handoff_type, attempt_number) DO NOTHING",
                params![
                    directive.id,
                    input.handoff_type.as_str(),
                    from.as_str(),
                    to.as_str(),
                    attempt,
                    input.validation_score.value(),
                    f.executive_summary,
                    f.completeness_report,
                    f.deliverables_manifest,
                    f.key_decisions,
                    f.known_issues,
                    f.resource_utilization,
                    f.action_items,
                    serde_json::to_string(&input.payload).context("Failed to serialize payload")?,
                    serde_json::to_string(&input.validation_details)
                        .context("Failed to serialize validation details")?,
                    actor.id,
                    actor.role.as_str(),
                ],
            )
            .context("Failed to insert handoff")?;
        if inserted == 0 {
            return Err(conflict());
        }
        let id = tx.last_insert_rowid();
        activations::insert_activations(&tx, directive.id, Some(id), activations)?;
        let handoff = require_handoff(&tx, id)?;
        match tx.commit() {
            Ok(()) => {}
            Err(e) if is_busy_error(&e) => return Err(conflict()),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to commit handoff").into()),
        }

        tracing::info!(
            handoff_id = id,
            directive_id = directive.id,
            handoff_type = %input.handoff_type,
            attempt,
            score = input.validation_score.value(),
            "handoff attempt recorded"
        );
        Ok(handoff)
    }

    /// Accept a pending handoff if its score clears the breaker.
    ///
    /// Status change, phase advance, deliverable completion and progress
    /// refresh commit together or not at all. The handoff row is marked
    /// accepted before the directive moves; the phase trigger requires it.
    ///
    /// Losing the write lock to another connection surfaces as
    /// `ConcurrentTransitionConflict` so the caller can retry on fresh state.
    pub fn accept_handoff(
        &self,
        handoff_id: i64,
        actor: &Actor,
        breaker: &CircuitBreaker,
    ) -> GateResult<AcceptResult> {
        let snapshot = require_handoff(self.conn(), handoff_id)?;
        let conflict = || GateError::ConcurrentTransitionConflict {
            directive_id: snapshot.directive_id,
            handoff_type: snapshot.handoff_type,
        };
        let tx = match self.begin() {
            Ok(tx) => tx,
            Err(e) if is_busy_error(&e) => return Err(conflict()),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to begin transaction").into()),
        };
        let handoff = require_handoff(&tx, handoff_id)?;
        let directive = require_directive(&tx, handoff.directive_id)?;
        if let Err(v) = self.enforcer().check(
            actor,
            Operation::AcceptHandoff {
                from: handoff.from_phase,
            },
            Some(directive.current_phase),
        ) {
            drop(tx);
            return Err(self.deny(v, Some(directive.id)));
        }

        match handoff.status {
            HandoffStatus::Accepted => return Ok(AcceptResult::AlreadyAccepted { handoff_id }),
            HandoffStatus::Rejected => {
                return Err(GateError::HandoffClosed {
                    id: handoff_id,
                    status: handoff.status.as_str().to_string(),
                });
            }
            HandoffStatus::PendingAcceptance => {}
        }

        if directive.current_phase != handoff.from_phase
            || directive.status == DirectiveStatus::Completed
        {
            if has_accepted(&tx, directive.id, handoff.handoff_type)? {
                return Err(conflict());
            }
            return Err(GateError::InvalidTransition {
                from: directive.current_phase,
                to: handoff.to_phase,
                reason: format!("handoff {} leaves {}", handoff_id, handoff.from_phase),
            });
        }

        if let GateDecision::Reject { score, threshold } = breaker.decide(handoff.validation_score) {
            drop(tx);
            return Err(self.block(actor, &handoff, score, threshold));
        }
        // A score can clear a lower threshold than the one it was scored
        // against; parked or unactivated directives still never advance.
        if !directive.status.is_workable() {
            return Err(GateError::InvalidTransition {
                from: directive.current_phase,
                to: handoff.to_phase,
                reason: format!("directive is {}, activate it before accepting", directive.status.as_str()),
            });
        }

        let marked = tx.execute(
            &format!(
                "UPDATE handoffs SET status = 'accepted', acceptance_threshold = ?1, decided_by = ?2, updated_at = {}
                 WHERE id = ?3 AND status = 'pending_acceptance'",
                SQL_NOW
            ),
            params![breaker.threshold().value(), actor.id, handoff_id],
        );
        match marked {
            Ok(1) => {}
            Ok(_) => return Err(conflict()),
            Err(e) if is_constraint_error(&e) || is_busy_error(&e) => return Err(conflict()),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to accept handoff").into()),
        }

        let advanced = if handoff.handoff_type.is_terminal() {
            tx.execute(
                &format!(
                    "UPDATE directives SET status = 'completed', updated_at = {}
                     WHERE id = ?1 AND current_phase = ?2 AND status != 'completed'",
                    SQL_NOW
                ),
                params![directive.id, Phase::FinalApproval.as_str()],
            )
        } else {
            tx.execute(
                &format!(
                    "UPDATE directives SET current_phase = ?1,
                        status = CASE WHEN status = 'active' THEN 'in_progress' ELSE status END,
                        updated_at = {}
                     WHERE id = ?2 AND current_phase = ?3",
                    SQL_NOW
                ),
                params![handoff.to_phase.as_str(), directive.id, handoff.from_phase.as_str()],
            )
        };
        match advanced {
            Ok(1) => {}
            Ok(_) => return Err(conflict()),
            Err(e) if is_constraint_error(&e) || is_busy_error(&e) => return Err(conflict()),
            Err(e) => return Err(anyhow::Error::new(e).context("Failed to advance directive").into()),
        }

        if handoff.handoff_type == HandoffType::ImplementationToVerification {
            tx.execute(
                &format!(
                    "UPDATE deliverables SET status = 'completed', completed_at = {}
                     WHERE directive_id = ?1 AND status = 'pending'",
                    SQL_NOW
                ),
                params![directive.id],
            )
            .context("Failed to complete deliverables")?;
        }

        let progress = refresh_progress(&tx, directive.id)?;
        let handoff = require_handoff(&tx, handoff_id)?;
        let directive = require_directive(&tx, directive.id)?;
        match tx.commit() {
            Ok(()) => {}
            Err(e) if is_busy_error(&e) => return Err(conflict()),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context("Failed to commit handoff acceptance")
                    .into());
            }
        }

        tracing::info!(
            handoff_id,
            directive_id = directive.id,
            handoff_type = %handoff.handoff_type,
            phase = %directive.current_phase,
            progress,
            actor = %actor,
            "handoff accepted"
        );
        Ok(AcceptResult::Accepted {
            handoff,
            directive,
            progress,
        })
    }

    /// Audit a circuit breaker block and build the caller-facing error.
    fn block(&self, actor: &Actor, handoff: &Handoff, score: Score, threshold: Score) -> GateError {
        let (handoff_id, directive_id) = (handoff.id, handoff.directive_id);
        let plan = remediation::plan(&handoff.validation_details);
        tracing::warn!(
            handoff_id,
            directive_id,
            score = score.value(),
            threshold = threshold.value(),
            reviewers = ?remediation::reviewers(&plan),
            actor = %actor,
            "circuit breaker tripped"
        );
        let err = GateError::CircuitBreakerTripped {
            handoff_id,
            score,
            threshold,
            remediation: plan,
        };
        if let Err(e) = self.record_audit(&NewAuditEvent::breaker_block(actor, directive_id, &err)) {
            return GateError::Store(e);
        }
        err
    }

    pub fn reject_handoff(&self, handoff_id: i64, actor: &Actor, reason: &str) -> GateResult<Handoff> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let handoff = require_handoff(&tx, handoff_id)?;
        let directive = require_directive(&tx, handoff.directive_id)?;
        if let Err(v) = self.enforcer().check(
            actor,
            Operation::RejectHandoff {
                from: handoff.from_phase,
            },
            Some(directive.current_phase),
        ) {
            drop(tx);
            return Err(self.deny(v, Some(directive.id)));
        }
        let updated = tx
            .execute(
                &format!(
                    "UPDATE handoffs SET status = 'rejected', decided_by = ?1, rejection_reason = ?2, updated_at = {}
                     WHERE id = ?3 AND status = 'pending_acceptance'",
                    SQL_NOW
                ),
                params![actor.id, reason.trim(), handoff_id],
            )
            .context("Failed to reject handoff")?;
        if updated == 0 {
            return Err(GateError::HandoffClosed {
                id: handoff_id,
                status: handoff.status.as_str().to_string(),
            });
        }
        let rejected = require_handoff(&tx, handoff_id)?;
        tx.commit().context("Failed to commit handoff rejection")?;
        tracing::info!(handoff_id, directive_id = directive.id, reason, actor = %actor, "handoff rejected");
        Ok(rejected)
    }

    pub fn get_handoff(&self, id: i64) -> GateResult<Handoff> {
        require_handoff(self.conn(), id)
    }

    pub fn list_pending_handoffs(&self, filter: &HandoffFilter) -> Result<Vec<Handoff>> {
        let handoffs = query_handoffs(
            self.conn(),
            &format!(
                "SELECT {} FROM handoffs
                 WHERE status = 'pending_acceptance'
                   AND (?1 IS NULL OR directive_id = ?1)
                   AND (?2 IS NULL OR handoff_type = ?2)
                 ORDER BY id",
                HANDOFF_COLUMNS
            ),
            params![filter.directive_id, filter.handoff_type.map(|t| t.as_str())],
        )?;
        Ok(handoffs.into_iter().filter(|h| filter.matches(h)).collect())
    }

    /// Every attempt for a directive, oldest first.
    pub fn handoff_history(&self, directive_id: i64) -> GateResult<Vec<Handoff>> {
        require_directive(self.conn(), directive_id)?;
        Ok(load_handoffs(self.conn(), directive_id)?)
    }
}

// ── Row types ────────────────────────────────────────────────────────

struct HandoffRow {
    id: i64,
    directive_id: i64,
    handoff_type: String,
    from_phase: String,
    to_phase: String,
    attempt_number: u32,
    status: String,
    validation_score: i64,
    fields: HandoffFields,
    payload: String,
    validation_details: String,
    created_by: String,
    created_by_role: String,
    acceptance_threshold: Option<i64>,
    decided_by: Option<String>,
    rejection_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl HandoffRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            directive_id: row.get(1)?,
            handoff_type: row.get(2)?,
            from_phase: row.get(3)?,
            to_phase: row.get(4)?,
            attempt_number: row.get(5)?,
            status: row.get(6)?,
            validation_score: row.get(7)?,
            fields: HandoffFields {
                executive_summary: row.get(8)?,
                completeness_report: row.get(9)?,
                deliverables_manifest: row.get(10)?,
                key_decisions: row.get(11)?,
                known_issues: row.get(12)?,
                resource_utilization: row.get(13)?,
                action_items: row.get(14)?,
            },
            payload: row.get(15)?,
            validation_details: row.get(16)?,
            created_by: row.get(17)?,
            created_by_role: row.get(18)?,
            acceptance_threshold: row.get(19)?,
            decided_by: row.get(20)?,
            rejection_reason: row.get(21)?,
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }

    fn into_handoff(self) -> Result<Handoff> {
        let parse_phase = |s: &str| {
            Phase::from_str(s)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse handoff phase")
        };
        Ok(Handoff {
            id: self.id,
            directive_id: self.directive_id,
            handoff_type: HandoffType::from_str(&self.handoff_type)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse handoff type")?,
            from_phase: parse_phase(&self.from_phase)?,
            to_phase: parse_phase(&self.to_phase)?,
            attempt_number: self.attempt_number,
            status: HandoffStatus::from_str(&self.status)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse handoff status")?,
            validation_score: Score::new(self.validation_score).context("Invalid validation score")?,
            fields: self.fields,
            payload: serde_json::from_str(&self.payload).context("Failed to parse handoff payload")?,
            validation_details: serde_json::from_str(&self.validation_details)
                .context("Failed to parse validation details")?,
            created_by: self.created_by,
            created_by_role: Role::from_str(&self.created_by_role)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse creator role")?,
            acceptance_threshold: self
                .acceptance_threshold
                .map(Score::new)
                .transpose()
                .context("Invalid acceptance threshold")?,
            decided_by: self.decided_by,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
