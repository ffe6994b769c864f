//! Pluggable validators and score aggregation.
//!
//! A [`Validator`] inspects an immutable [`ValidationContext`] and returns a
//! [`ValidatorOutcome`]. The [`ValidatorRegistry`] runs every applicable
//! validator concurrently, normalizes outcomes into [`ValidationResult`]s and
//! folds them into one aggregate [`Score`] for the circuit breaker.

pub mod builtin;
pub mod registry;

use async_trait::async_trait;
use gatekeeper_common::{HandoffType, Score};
use serde::{Deserialize, Serialize};

use crate::handoff::HandoffPayload;
use crate::store::{Evidence, HandoffFields};

pub use registry::{ValidatorRegistry, aggregate};

/// Everything a validator may look at. Shared read-only across validator tasks.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub evidence: Evidence,
    pub handoff_type: HandoffType,
    pub fields: HandoffFields,
    pub payload: HandoffPayload,
}

/// What a validator reports before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorOutcome {
    pub score: Score,
    pub passed: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidatorOutcome {
    pub fn pass() -> Self {
        Self {
            score: Score::MAX,
            passed: true,
            issues: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn fail(score: Score, issue: impl Into<String>) -> Self {
        Self {
            score,
            passed: false,
            issues: vec![issue.into()],
            warnings: Vec::new(),
        }
    }

    /// Passed iff no issues were collected.
    pub fn from_issues(score: Score, issues: Vec<String>) -> Self {
        Self {
            score,
            passed: issues.is_empty(),
            issues,
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One validator's normalized result, persisted in a handoff's `validation_details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub name: String,
    pub score: Score,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl ValidationResult {
    pub fn from_outcome(name: &str, outcome: ValidatorOutcome, critical: bool, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            score: outcome.score,
            passed: outcome.passed,
            issues: outcome.issues,
            warnings: outcome.warnings,
            critical,
            weight,
        }
    }

    /// A zero-score failure standing in for a validator that could not report.
    pub fn errored(name: &str, issue: &str, critical: bool, weight: f64) -> Self {
        Self {
            name: name.to_string(),
            score: Score::MIN,
            passed: false,
            issues: vec![issue.to_string()],
            warnings: Vec::new(),
            critical,
            weight,
        }
    }

    pub fn is_critical_failure(&self) -> bool {
        self.critical && !self.passed
    }
}

/// A single check run against a draft handoff.
///
/// Implementations must be side-effect-free: they may run concurrently and
/// more than once for the same handoff.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn weight(&self) -> f64 {
        1.0
    }

    /// A failed critical validator caps the aggregate below threshold.
    fn critical(&self) -> bool {
        false
    }

    fn applies_to(&self, _handoff_type: HandoffType) -> bool {
        true
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome>;
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use crate::store::{Directive, DirectiveStatus};

    /// Narrative fields that clear every content check.
    pub fn complete_fields() -> HandoffFields {
        HandoffFields {
            executive_summary: "Login endpoint now rate limits by account and by source address; \
                lockout and audit logging verified against the agreed acceptance criteria."
                .into(),
            completeness_report: "All planned work finished.".into(),
            deliverables_manifest: "- rate limiter\n- lockout policy".into(),
            key_decisions: "Token bucket per account, stored in SQLite.".into(),
            known_issues: "None outstanding.".into(),
            resource_utilization: "Two engineer days.".into(),
            action_items: "- monitor lockouts\n- tune limits\n- update runbook".into(),
        }
    }

    /// A context for an active directive sitting in the handoff's from-phase.
    pub fn context_for(handoff_type: HandoffType) -> ValidationContext {
        let directive = Directive {
            id: 1,
            title: "Harden login".into(),
            description: "Rate limit the login endpoint".into(),
            status: DirectiveStatus::Active,
            current_phase: handoff_type.from_phase(),
            progress_percentage: 0,
            parent_id: None,
            metadata: serde_json::json!({}),
            created_by: "lead-1".into(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let evidence = Evidence::bare(directive);
        let payload = crate::handoff::executor_for(handoff_type).payload(&evidence);
        ValidationContext {
            evidence,
            handoff_type,
            fields: complete_fields(),
            payload,
        }
    }
}
