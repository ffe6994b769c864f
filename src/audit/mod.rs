//! Insert-only governance audit trail.
//!
//! Every constraint violation and every circuit breaker block writes exactly
//! one row to `audit_events`. The table rejects updates and deletes at the
//! database level, so rows written here are permanent.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use gatekeeper_common::{Actor, Role};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::GateError;
use crate::gates::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    ConstraintViolation,
    CircuitBreakerBlock,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConstraintViolation => "constraint_violation",
            Self::CircuitBreakerBlock => "circuit_breaker_block",
        }
    }
}

impl FromStr for AuditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constraint_violation" => Ok(Self::ConstraintViolation),
            "circuit_breaker_block" => Ok(Self::CircuitBreakerBlock),
            _ => Err(format!("Invalid audit kind: {}", s)),
        }
    }
}

/// A persisted audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: i64,
    pub kind: AuditKind,
    pub actor_id: String,
    pub actor_role: Role,
    pub attempted_operation: String,
    pub reason: String,
    pub directive_id: Option<i64>,
    pub handoff_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// An audit row about to be written.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub kind: AuditKind,
    pub actor: Actor,
    pub attempted_operation: String,
    pub reason: String,
    pub directive_id: Option<i64>,
    pub handoff_id: Option<i64>,
}

impl NewAuditEvent {
    pub fn violation(violation: &Violation, directive_id: Option<i64>) -> Self {
        Self {
            kind: AuditKind::ConstraintViolation,
            actor: violation.actor.clone(),
            attempted_operation: violation.operation.describe(),
            reason: violation.reason.clone(),
            directive_id,
            handoff_id: None,
        }
    }

    /// Audit row for a tripped circuit breaker, built from the error it accompanies.
    pub fn breaker_block(actor: &Actor, directive_id: i64, err: &GateError) -> Self {
        let handoff_id = match err {
            GateError::CircuitBreakerTripped { handoff_id, .. } => Some(*handoff_id),
            _ => None,
        };
        Self {
            kind: AuditKind::CircuitBreakerBlock,
            actor: actor.clone(),
            attempted_operation: "accept handoff".to_string(),
            reason: err.to_string(),
            directive_id: Some(directive_id),
            handoff_id,
        }
    }

    pub fn with_handoff(mut self, handoff_id: i64) -> Self {
        self.handoff_id = Some(handoff_id);
        self
    }
}

/// Append one audit row. Must not run inside a transaction that may roll back.
pub fn record(conn: &Connection, event: &NewAuditEvent) -> Result<i64> {
    conn.execute(
        "INSERT INTO audit_events (kind, actor_id, actor_role, attempted_operation, reason, directive_id, handoff_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.kind.as_str(),
            event.actor.id,
            event.actor.role.as_str(),
            event.attempted_operation,
            event.reason,
            event.directive_id,
            event.handoff_id,
            Utc::now().to_rfc3339(),
        ],
    )
    .context("Failed to insert audit event")?;
    Ok(conn.last_insert_rowid())
}

/// Audit rows in insertion order, optionally scoped to one directive.
pub fn list(conn: &Connection, directive_id: Option<i64>) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, kind, actor_id, actor_role, attempted_operation, reason, directive_id, handoff_id, created_at
             FROM audit_events
             WHERE ?1 IS NULL OR directive_id = ?1
             ORDER BY id",
        )
        .context("Failed to prepare audit query")?;
    let rows = stmt
        .query_map(params![directive_id], |row| {
            Ok(AuditRow {
                id: row.get(0)?,
                kind: row.get(1)?,
                actor_id: row.get(2)?,
                actor_role: row.get(3)?,
                attempted_operation: row.get(4)?,
                reason: row.get(5)?,
                directive_id: row.get(6)?,
                handoff_id: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .context("Failed to query audit events")?;
    let mut events = Vec::new();
    for row in rows {
        let r = row.context("Failed to read audit row")?;
        events.push(r.into_event()?);
    }
    Ok(events)
}

struct AuditRow {
    id: i64,
    kind: String,
    actor_id: String,
    actor_role: String,
    attempted_operation: String,
    reason: String,
    directive_id: Option<i64>,
    handoff_id: Option<i64>,
    created_at: String,
}

impl AuditRow {
    fn into_event(self) -> Result<AuditEvent> {
        let kind = AuditKind::from_str(&self.kind)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse audit kind")?;
        let actor_role = Role::from_str(&self.actor_role)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse audit actor role")?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .context("Failed to parse audit timestamp")?
            .with_timezone(&Utc);
        Ok(AuditEvent {
            id: self.id,
            kind,
            actor_id: self.actor_id,
            actor_role,
            attempted_operation: self.attempted_operation,
            reason: self.reason,
            directive_id: self.directive_id,
            handoff_id: self.handoff_id,
            created_at,
        })
    }
}
