//! Immutable evidence snapshot for one directive.
//!
//! Validators, executors and the progress aggregator all read from an
//! [`Evidence`] value rather than from the database, so they are pure
//! functions of what was persisted at load time.

use std::collections::BTreeMap;

use gatekeeper_common::HandoffType;
use rusqlite::Connection;

use super::activations;
use super::directives::{
    load_children, load_deliverables, load_plan, load_reviewer_results, require_directive,
};
use super::handoffs::load_handoffs;
use super::models::*;
use crate::errors::GateResult;
use crate::review::{ReviewerCode, ReviewerResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Evidence {
    pub directive: Directive,
    pub plan: Option<PlanDocument>,
    pub deliverables: Vec<Deliverable>,
    pub reviewer_results: Vec<ReviewerResult>,
    pub expected_reviewers: Vec<ReviewerCode>,
    pub handoffs: Vec<Handoff>,
    pub children: Vec<Directive>,
}

impl Evidence {
    /// Load a consistent snapshot. Works on a plain connection or inside a transaction.
    pub fn load(conn: &Connection, directive_id: i64) -> GateResult<Self> {
        let directive = require_directive(conn, directive_id)?;
        Ok(Self {
            plan: load_plan(conn, directive_id)?,
            deliverables: load_deliverables(conn, directive_id)?,
            reviewer_results: load_reviewer_results(conn, directive_id)?,
            expected_reviewers: activations::expected_reviewers(conn, directive_id)?,
            handoffs: load_handoffs(conn, directive_id)?,
            children: load_children(conn, directive_id)?,
            directive,
        })
    }

    /// Snapshot of a directive with no recorded evidence yet.
    pub fn bare(directive: Directive) -> Self {
        Self {
            directive,
            plan: None,
            deliverables: Vec::new(),
            reviewer_results: Vec::new(),
            expected_reviewers: Vec::new(),
            handoffs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn is_accepted(&self, handoff_type: HandoffType) -> bool {
        self.handoffs
            .iter()
            .any(|h| h.handoff_type == handoff_type && h.status == HandoffStatus::Accepted)
    }

    pub fn plan_populated(&self) -> bool {
        self.plan.as_ref().is_some_and(PlanDocument::is_populated)
    }

    pub fn plan_text(&self) -> &str {
        self.plan.as_ref().map(|p| p.content.as_str()).unwrap_or("")
    }

    pub fn completed_deliverables(&self) -> usize {
        self.deliverables
            .iter()
            .filter(|d| d.status == DeliverableStatus::Completed)
            .count()
    }

    /// Most recent result per reviewer, keyed by reviewer code.
    pub fn latest_results(&self) -> BTreeMap<&ReviewerCode, &ReviewerResult> {
        let mut latest = BTreeMap::new();
        for result in &self.reviewer_results {
            latest.insert(&result.reviewer_code, result);
        }
        latest
    }

    /// Reviewers whose verdict counts toward verification: every expected
    /// reviewer, or every reviewer that reported when none were expected.
    pub fn reviewers_in_scope(&self) -> Vec<ReviewerCode> {
        if self.expected_reviewers.is_empty() {
            self.latest_results().into_keys().cloned().collect()
        } else {
            self.expected_reviewers.clone()
        }
    }
}
