use std::str::FromStr;

use anyhow::{Context, Result};
use gatekeeper_common::{Actor, Phase, Score};
use rusqlite::{Connection, OptionalExtension, params};

use super::activations;
use super::db::{GateDb, SQL_NOW};
use super::evidence::Evidence;
use super::models::*;
use crate::errors::{GateError, GateResult};
use crate::gates::Operation;
use crate::progress::ProgressAggregator;
use crate::review::{NewReviewerResult, ReviewerActivation, ReviewerCode, ReviewerResult, Verdict};

const DIRECTIVE_COLUMNS: &str = "id, title, description, status, current_phase, progress_percentage, parent_id, metadata, created_by, created_at, updated_at";

// ── Loaders (usable inside a transaction) ────────────────────────────

pub(crate) fn load_directive(conn: &Connection, id: i64) -> Result<Option<Directive>> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM directives WHERE id = ?1", DIRECTIVE_COLUMNS),
            params![id],
            DirectiveRow::from_row,
        )
        .optional()
        .context("Failed to query directive")?;
    row.map(DirectiveRow::into_directive).transpose()
}

pub(crate) fn require_directive(conn: &Connection, id: i64) -> GateResult<Directive> {
    load_directive(conn, id)?.ok_or(GateError::DirectiveNotFound { id })
}

fn query_directives(conn: &Connection, filter: &str, param: Option<i64>) -> Result<Vec<Directive>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM directives {} ORDER BY id",
            DIRECTIVE_COLUMNS, filter
        ))
        .context("Failed to prepare directive query")?;
    let rows = match param {
        Some(p) => stmt.query_map(params![p], DirectiveRow::from_row),
        None => stmt.query_map([], DirectiveRow::from_row),
    }
    .context("Failed to query directives")?;
    let mut directives = Vec::new();
    for row in rows {
        let r = row.context("Failed to read directive row")?;
        directives.push(r.into_directive()?);
    }
    Ok(directives)
}

pub(crate) fn load_children(conn: &Connection, parent_id: i64) -> Result<Vec<Directive>> {
    query_directives(conn, "WHERE parent_id = ?1", Some(parent_id))
}

pub(crate) fn load_plan(conn: &Connection, directive_id: i64) -> Result<Option<PlanDocument>> {
    conn.query_row(
        "SELECT directive_id, content, updated_by, updated_at FROM plan_documents WHERE directive_id = ?1",
        params![directive_id],
        |row| {
            Ok(PlanDocument {
                directive_id: row.get(0)?,
                content: row.get(1)?,
                updated_by: row.get(2)?,
                updated_at: row.get(3)?,
            })
        },
    )
    .optional()
    .context("Failed to query plan document")
}

pub(crate) fn load_deliverables(conn: &Connection, directive_id: i64) -> Result<Vec<Deliverable>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, directive_id, name, kind, status, completed_at, created_at
             FROM deliverables WHERE directive_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare deliverables query")?;
    let rows = stmt
        .query_map(params![directive_id], DeliverableRow::from_row)
        .context("Failed to query deliverables")?;
    let mut deliverables = Vec::new();
    for row in rows {
        let r = row.context("Failed to read deliverable row")?;
        deliverables.push(r.into_deliverable()?);
    }
    Ok(deliverables)
}

fn load_deliverable(conn: &Connection, id: i64) -> Result<Option<Deliverable>> {
    let row = conn
        .query_row(
            "SELECT id, directive_id, name, kind, status, completed_at, created_at
             FROM deliverables WHERE id = ?1",
            params![id],
            DeliverableRow::from_row,
        )
        .optional()
        .context("Failed to query deliverable")?;
    row.map(DeliverableRow::into_deliverable).transpose()
}

pub(crate) fn load_reviewer_results(conn: &Connection, directive_id: i64) -> Result<Vec<ReviewerResult>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, directive_id, reviewer_code, verdict, confidence, issues, warnings, recommendations, recorded_by, created_at
             FROM reviewer_results WHERE directive_id = ?1 ORDER BY id",
        )
        .context("Failed to prepare reviewer results query")?;
    let rows = stmt
        .query_map(params![directive_id], |row| {
            Ok(ReviewerResultRow {
                id: row.get(0)?,
                directive_id: row.get(1)?,
                reviewer_code: row.get(2)?,
                verdict: row.get(3)?,
                confidence: row.get(4)?,
                issues: row.get(5)?,
                warnings: row.get(6)?,
                recommendations: row.get(7)?,
                recorded_by: row.get(8)?,
                created_at: row.get(9)?,
            })
        })
        .context("Failed to query reviewer results")?;
    let mut results = Vec::new();
    for row in rows {
        let r = row.context("Failed to read reviewer result row")?;
        results.push(r.into_result()?);
    }
    Ok(results)
}

/// Recompute and store a directive's progress from its persisted evidence.
pub(crate) fn refresh_progress(conn: &Connection, directive_id: i64) -> GateResult<u8> {
    let evidence = Evidence::load(conn, directive_id)?;
    let overall = ProgressAggregator::new().breakdown(&evidence).overall;
    conn.execute(
        &format!(
            "UPDATE directives SET progress_percentage = ?1, updated_at = {} WHERE id = ?2",
            SQL_NOW
        ),
        params![overall, directive_id],
    )
    .context("Failed to update directive progress")?;
    Ok(overall)
}

// ── Directive operations ─────────────────────────────────────────────

impl GateDb {
    pub fn create_directive(
        &self,
        input: &NewDirective,
        actor: &Actor,
        activations: &[ReviewerActivation],
    ) -> GateResult<Directive> {
        if let Err(v) = self.enforcer().check(actor, Operation::CreateDirective, None) {
            return Err(self.deny(v, None));
        }
        if input.title.trim().is_empty() {
            return Err(GateError::ValidationFailure {
                validator: "directive".to_string(),
                message: "title must not be blank".to_string(),
            });
        }

        let tx = self.begin().context("Failed to begin transaction")?;
        if let Some(parent_id) = input.parent_id {
            require_directive(&tx, parent_id)?;
        }
        let metadata = input
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));
        tx.execute(
            "INSERT INTO directives (title, description, parent_id, metadata, created_by)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                input.title.trim(),
                input.description,
                input.parent_id,
                serde_json::to_string(&metadata).context("Failed to serialize metadata")?,
                actor.id,
            ],
        )
        .context("Failed to insert directive")?;
        let id = tx.last_insert_rowid();
        activations::insert_activations(&tx, id, None, activations)?;
        let directive = require_directive(&tx, id)?;
        tx.commit().context("Failed to commit directive")?;
        Ok(directive)
    }

    pub fn get_directive(&self, id: i64) -> GateResult<Directive> {
        require_directive(self.conn(), id)
    }

    pub fn list_directives(&self) -> Result<Vec<Directive>> {
        query_directives(self.conn(), "", None)
    }

    pub fn list_children(&self, parent_id: i64) -> Result<Vec<Directive>> {
        load_children(self.conn(), parent_id)
    }

    pub fn activate_directive(&self, id: i64, actor: &Actor) -> GateResult<Directive> {
        self.set_status(id, actor, Operation::ActivateDirective, DirectiveStatus::Active)
    }

    pub fn defer_directive(&self, id: i64, actor: &Actor) -> GateResult<Directive> {
        self.set_status(id, actor, Operation::DeferDirective, DirectiveStatus::Deferred)
    }

    fn set_status(
        &self,
        id: i64,
        actor: &Actor,
        op: Operation,
        status: DirectiveStatus,
    ) -> GateResult<Directive> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let directive = require_directive(&tx, id)?;
        if let Err(v) = self.enforcer().check(actor, op, Some(directive.current_phase)) {
            drop(tx);
            return Err(self.deny(v, Some(id)));
        }
        if directive.status == DirectiveStatus::Completed {
            return Err(GateError::InvalidTransition {
                from: directive.current_phase,
                to: directive.current_phase,
                reason: "directive is completed".to_string(),
            });
        }
        // Activating work already under way keeps it in progress.
        if status == DirectiveStatus::Active && directive.status.is_workable() {
            return Ok(directive);
        }
        tx.execute(
            &format!(
                "UPDATE directives SET status = ?1, updated_at = {} WHERE id = ?2",
                SQL_NOW
            ),
            params![status.as_str(), id],
        )
        .context("Failed to update directive status")?;
        let updated = require_directive(&tx, id)?;
        tx.commit().context("Failed to commit status change")?;
        tracing::info!(directive_id = id, status = status.as_str(), actor = %actor, "directive status changed");
        Ok(updated)
    }

    /// Direct phase assignment. Always refused and audited; phases move only
    /// through accepted handoffs.
    pub fn set_phase(&self, id: i64, to: Phase, actor: &Actor) -> GateResult<Directive> {
        let directive = self.get_directive(id)?;
        match self
            .enforcer()
            .check(actor, Operation::SetPhase { to }, Some(directive.current_phase))
        {
            Err(v) => Err(self.deny(v, Some(id))),
            Ok(()) => Err(GateError::InvalidTransition {
                from: directive.current_phase,
                to,
                reason: "phases change only through an accepted handoff".to_string(),
            }),
        }
    }

    // ── Evidence writes ──────────────────────────────────────────────

    pub fn set_plan_document(
        &self,
        directive_id: i64,
        content: &str,
        actor: &Actor,
    ) -> GateResult<PlanDocument> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let directive = require_directive(&tx, directive_id)?;
        if let Err(v) = self
            .enforcer()
            .check(actor, Operation::WritePlan, Some(directive.current_phase))
        {
            drop(tx);
            return Err(self.deny(v, Some(directive_id)));
        }
        tx.execute(
            &format!(
                "INSERT INTO plan_documents (directive_id, content, updated_by) VALUES (?1, ?2, ?3)
                 ON CONFLICT(directive_id) DO UPDATE SET
                    content = excluded.content,
                    updated_by = excluded.updated_by,
                    updated_at = {}",
                SQL_NOW
            ),
            params![directive_id, content, actor.id],
        )
        .context("Failed to upsert plan document")?;
        refresh_progress(&tx, directive_id)?;
        let plan = load_plan(&tx, directive_id)?.context("Plan document not found after upsert")?;
        tx.commit().context("Failed to commit plan document")?;
        Ok(plan)
    }

    /// Track a deliverable by name. Tracking an existing name returns the existing row.
    pub fn track_deliverable(
        &self,
        directive_id: i64,
        name: &str,
        kind: &str,
        actor: &Actor,
    ) -> GateResult<Deliverable> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let directive = require_directive(&tx, directive_id)?;
        if let Err(v) = self
            .enforcer()
            .check(actor, Operation::TrackDeliverable, Some(directive.current_phase))
        {
            drop(tx);
            return Err(self.deny(v, Some(directive_id)));
        }
        if name.trim().is_empty() {
            return Err(GateError::ValidationFailure {
                validator: "deliverable".to_string(),
                message: "name must not be blank".to_string(),
            });
        }
        tx.execute(
            "INSERT INTO deliverables (directive_id, name, kind) VALUES (?1, ?2, ?3)
             ON CONFLICT(directive_id, name) DO NOTHING",
            params![directive_id, name.trim(), kind],
        )
        .context("Failed to insert deliverable")?;
        let id: i64 = tx
            .query_row(
                "SELECT id FROM deliverables WHERE directive_id = ?1 AND name = ?2",
                params![directive_id, name.trim()],
                |row| row.get(0),
            )
            .context("Failed to look up deliverable")?;
        refresh_progress(&tx, directive_id)?;
        let deliverable = load_deliverable(&tx, id)?.ok_or(GateError::DeliverableNotFound { id })?;
        tx.commit().context("Failed to commit deliverable")?;
        Ok(deliverable)
    }

    pub fn complete_deliverable(&self, deliverable_id: i64, actor: &Actor) -> GateResult<Deliverable> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let deliverable = load_deliverable(&tx, deliverable_id)?.ok_or(GateError::DeliverableNotFound {
            id: deliverable_id,
        })?;
        let directive = require_directive(&tx, deliverable.directive_id)?;
        if let Err(v) = self
            .enforcer()
            .check(actor, Operation::CompleteDeliverable, Some(directive.current_phase))
        {
            drop(tx);
            return Err(self.deny(v, Some(directive.id)));
        }
        tx.execute(
            &format!(
                "UPDATE deliverables SET status = 'completed', completed_at = {}
                 WHERE id = ?1 AND status = 'pending'",
                SQL_NOW
            ),
            params![deliverable_id],
        )
        .context("Failed to complete deliverable")?;
        refresh_progress(&tx, directive.id)?;
        let updated = load_deliverable(&tx, deliverable_id)?.ok_or(GateError::DeliverableNotFound {
            id: deliverable_id,
        })?;
        tx.commit().context("Failed to commit deliverable completion")?;
        Ok(updated)
    }

    pub fn record_reviewer_result(
        &self,
        directive_id: i64,
        input: &NewReviewerResult,
        actor: &Actor,
    ) -> GateResult<ReviewerResult> {
        let tx = self.begin().context("Failed to begin transaction")?;
        let directive = require_directive(&tx, directive_id)?;
        if let Err(v) = self
            .enforcer()
            .check(actor, Operation::RecordReviewerResult, Some(directive.current_phase))
        {
            drop(tx);
            return Err(self.deny(v, Some(directive_id)));
        }
        tx.execute(
            "INSERT INTO reviewer_results (directive_id, reviewer_code, verdict, confidence, issues, warnings, recommendations, recorded_by)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                directive_id,
                input.reviewer_code.as_code(),
                input.verdict.as_str(),
                input.confidence.value(),
                serde_json::to_string(&input.issues).context("Failed to serialize issues")?,
                serde_json::to_string(&input.warnings).context("Failed to serialize warnings")?,
                serde_json::to_string(&input.recommendations)
                    .context("Failed to serialize recommendations")?,
                actor.id,
            ],
        )
        .context("Failed to insert reviewer result")?;
        let id = tx.last_insert_rowid();
        refresh_progress(&tx, directive_id)?;
        let result = load_reviewer_results(&tx, directive_id)?
            .into_iter()
            .find(|r| r.id == id)
            .context("Reviewer result not found after insert")?;
        tx.commit().context("Failed to commit reviewer result")?;
        tracing::info!(
            directive_id,
            reviewer = %result.reviewer_code,
            verdict = %result.verdict,
            "reviewer result recorded"
        );
        Ok(result)
    }
}

// ── Row types ────────────────────────────────────────────────────────

struct DirectiveRow {
    id: i64,
    title: String,
    description: String,
    status: String,
    current_phase: String,
    progress_percentage: i64,
    parent_id: Option<i64>,
    metadata: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl DirectiveRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            status: row.get(3)?,
            current_phase: row.get(4)?,
            progress_percentage: row.get(5)?,
            parent_id: row.get(6)?,
            metadata: row.get(7)?,
            created_by: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_directive(self) -> Result<Directive> {
        let status = DirectiveStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse directive status")?;
        let current_phase = Phase::from_str(&self.current_phase)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse directive phase")?;
        let progress = Score::new(self.progress_percentage).context("Invalid progress percentage")?;
        let metadata =
            serde_json::from_str(&self.metadata).context("Failed to parse directive metadata")?;
        Ok(Directive {
            id: self.id,
            title: self.title,
            description: self.description,
            status,
            current_phase,
            progress_percentage: progress.value(),
            parent_id: self.parent_id,
            metadata,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct DeliverableRow {
    id: i64,
    directive_id: i64,
    name: String,
    kind: String,
    status: String,
    completed_at: Option<String>,
    created_at: String,
}

impl DeliverableRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            directive_id: row.get(1)?,
            name: row.get(2)?,
            kind: row.get(3)?,
            status: row.get(4)?,
            completed_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_deliverable(self) -> Result<Deliverable> {
        let status = DeliverableStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse deliverable status")?;
        Ok(Deliverable {
            id: self.id,
            directive_id: self.directive_id,
            name: self.name,
            kind: self.kind,
            status,
            completed_at: self.completed_at,
            created_at: self.created_at,
        })
    }
}

struct ReviewerResultRow {
    id: i64,
    directive_id: i64,
    reviewer_code: String,
    verdict: String,
    confidence: i64,
    issues: String,
    warnings: String,
    recommendations: String,
    recorded_by: String,
    created_at: String,
}

impl ReviewerResultRow {
    fn into_result(self) -> Result<ReviewerResult> {
        let verdict = Verdict::from_str(&self.verdict)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse verdict")?;
        let reviewer_code = match ReviewerCode::from_str(&self.reviewer_code) {
            Ok(code) => code,
            Err(never) => match never {},
        };
        Ok(ReviewerResult {
            id: self.id,
            directive_id: self.directive_id,
            reviewer_code,
            verdict,
            confidence: Score::new(self.confidence).context("Invalid reviewer confidence")?,
            issues: serde_json::from_str(&self.issues).context("Failed to parse issues JSON")?,
            warnings: serde_json::from_str(&self.warnings).context("Failed to parse warnings JSON")?,
            recommendations: serde_json::from_str(&self.recommendations)
                .context("Failed to parse recommendations JSON")?,
            recorded_by: self.recorded_by,
            created_at: self.created_at,
        })
    }
}
