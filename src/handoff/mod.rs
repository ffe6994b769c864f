//! Phase handoffs: what a handoff carries and how one is produced.
//!
//! A handoff moves a directive from one phase to the next. The caller supplies
//! a [`HandoffDraft`] with the narrative fields it knows; the
//! [`PhaseExecutor`](executors::PhaseExecutor) for the phase pair gathers
//! evidence, fills generated fields and builds the typed [`HandoffPayload`].
//! [`GateEngine`](engine::GateEngine) scores the result and drives it through
//! the circuit breaker.

pub mod engine;
pub mod executors;

use gatekeeper_common::{HandoffType, Score};
use serde::{Deserialize, Serialize};

use crate::errors::{GateError, GateResult};
use crate::review::{ReviewerCode, Verdict};
use crate::store::{Directive, Handoff, HandoffFields};

pub use engine::GateEngine;
pub use executors::{PhaseExecutor, PreparedHandoff, executor_for};

/// Caller-authored narrative for a handoff. Blank fields are filled by the
/// executor where it can generate them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandoffDraft {
    #[serde(flatten)]
    pub fields: HandoffFields,
}

impl HandoffDraft {
    pub fn new(executive_summary: impl Into<String>) -> Self {
        Self {
            fields: HandoffFields {
                executive_summary: executive_summary.into(),
                ..HandoffFields::default()
            },
        }
    }

    pub fn with_key_decisions(mut self, text: impl Into<String>) -> Self {
        self.fields.key_decisions = text.into();
        self
    }

    pub fn with_known_issues(mut self, text: impl Into<String>) -> Self {
        self.fields.known_issues = text.into();
        self
    }

    pub fn with_resource_utilization(mut self, text: impl Into<String>) -> Self {
        self.fields.resource_utilization = text.into();
        self
    }

    pub fn with_action_items(mut self, text: impl Into<String>) -> Self {
        self.fields.action_items = text.into();
        self
    }

    pub fn with_completeness_report(mut self, text: impl Into<String>) -> Self {
        self.fields.completeness_report = text.into();
        self
    }

    pub fn with_deliverables_manifest(mut self, text: impl Into<String>) -> Self {
        self.fields.deliverables_manifest = text.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub reviewer: ReviewerCode,
    pub verdict: Verdict,
    pub confidence: Score,
}

/// Phase-specific evidence captured with a handoff, keyed by handoff type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "handoff_type", rename_all = "snake_case")]
pub enum HandoffPayload {
    InitiationToPlanning {
        title: String,
        description: String,
        expected_reviewers: Vec<ReviewerCode>,
    },
    PlanningToImplementation {
        plan_chars: usize,
        deliverables: Vec<String>,
    },
    ImplementationToVerification {
        completed: Vec<String>,
        pending: Vec<String>,
    },
    VerificationToFinalApproval {
        verdicts: Vec<VerdictSummary>,
        awaiting: Vec<ReviewerCode>,
    },
    FinalApproval {
        accepted: Vec<HandoffType>,
        open_children: Vec<i64>,
    },
}

impl HandoffPayload {
    pub fn handoff_type(&self) -> HandoffType {
        match self {
            Self::InitiationToPlanning { .. } => HandoffType::InitiationToPlanning,
            Self::PlanningToImplementation { .. } => HandoffType::PlanningToImplementation,
            Self::ImplementationToVerification { .. } => HandoffType::ImplementationToVerification,
            Self::VerificationToFinalApproval { .. } => HandoffType::VerificationToFinalApproval,
            Self::FinalApproval { .. } => HandoffType::FinalApproval,
        }
    }

    /// Reject a payload built for a different handoff type than the row it goes into.
    pub fn ensure_matches(&self, handoff_type: HandoffType) -> GateResult<()> {
        if self.handoff_type() == handoff_type {
            return Ok(());
        }
        Err(GateError::ValidationFailure {
            validator: "payload".to_string(),
            message: format!(
                "payload for {} cannot be stored on a {} handoff",
                self.handoff_type(),
                handoff_type
            ),
        })
    }
}

/// Outcome of a handoff that cleared the circuit breaker.
#[derive(Debug, Clone, Serialize)]
pub struct HandoffResult {
    pub handoff: Handoff,
    pub directive: Directive,
    pub progress: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_is_tagged_by_handoff_type() {
        let payload = HandoffPayload::PlanningToImplementation {
            plan_chars: 240,
            deliverables: vec!["migration".into()],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["handoff_type"], "planning_to_implementation");

        let back: HandoffPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back.handoff_type(), HandoffType::PlanningToImplementation);
    }

    #[test]
    fn test_ensure_matches_rejects_mismatch() {
        let payload = HandoffPayload::FinalApproval {
            accepted: vec![],
            open_children: vec![],
        };
        assert!(payload.ensure_matches(HandoffType::FinalApproval).is_ok());
        let err = payload
            .ensure_matches(HandoffType::InitiationToPlanning)
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_FAILURE");
    }

    #[test]
    fn test_draft_deserializes_partial_fields() {
        let draft: HandoffDraft = toml::from_str(
            r#"
executive_summary = "Scope agreed with stakeholders"
action_items = "- ship"
"#,
        )
        .unwrap();
        assert_eq!(draft.fields.action_items, "- ship");
        assert!(draft.fields.key_decisions.is_empty());
    }
}
