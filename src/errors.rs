//! Typed error hierarchy for the gatekeeper engine.
//!
//! `GateError` is the single error surfaced by caller-facing operations. Every
//! variant maps to a stable machine-readable [`GateError::code`] and a short
//! [`GateError::remediation`] hint. Store plumbing uses `anyhow` internally and
//! is wrapped as `GateError::Store` at the boundary.

use gatekeeper_common::{HandoffType, Phase, Role, Score};
use thiserror::Error;

use crate::review::remediation::Remediation;

/// Errors from gate evaluation, constraint enforcement and the store.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Validation failed for {validator}: {message}")]
    ValidationFailure { validator: String, message: String },

    #[error(
        "Circuit breaker tripped for handoff {handoff_id}: score {score} is below threshold {threshold}"
    )]
    CircuitBreakerTripped {
        handoff_id: i64,
        score: Score,
        threshold: Score,
        /// Who should fix each failing check.
        remediation: Vec<Remediation>,
    },

    #[error("Constraint violation: {actor_id} ({role}) may not {operation}: {reason}")]
    ConstraintViolation {
        actor_id: String,
        role: Role,
        operation: String,
        reason: String,
    },

    #[error("Missing evidence for {phase}: {detail}")]
    MissingEvidence { phase: Phase, detail: String },

    #[error("Concurrent transition conflict on directive {directive_id} ({handoff_type})")]
    ConcurrentTransitionConflict {
        directive_id: i64,
        handoff_type: HandoffType,
    },

    #[error("Directive {id} not found")]
    DirectiveNotFound { id: i64 },

    #[error("Handoff {id} not found")]
    HandoffNotFound { id: i64 },

    #[error("Deliverable {id} not found")]
    DeliverableNotFound { id: i64 },

    #[error("Invalid transition {from} -> {to}: {reason}")]
    InvalidTransition {
        from: Phase,
        to: Phase,
        reason: String,
    },

    #[error("Handoff {id} is closed ({status})")]
    HandoffClosed { id: i64, status: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl GateError {
    /// Stable code for machine consumers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailure { .. } => "VALIDATION_FAILURE",
            Self::CircuitBreakerTripped { .. } => "CIRCUIT_BREAKER_TRIPPED",
            Self::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            Self::MissingEvidence { .. } => "MISSING_EVIDENCE",
            Self::ConcurrentTransitionConflict { .. } => "CONCURRENT_TRANSITION_CONFLICT",
            Self::DirectiveNotFound { .. } => "DIRECTIVE_NOT_FOUND",
            Self::HandoffNotFound { .. } => "HANDOFF_NOT_FOUND",
            Self::DeliverableNotFound { .. } => "DELIVERABLE_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::HandoffClosed { .. } => "HANDOFF_CLOSED",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    pub fn remediation(&self) -> String {
        match self {
            Self::ValidationFailure { validator, .. } => {
                format!("Address the issues reported by '{}' and resubmit", validator)
            }
            Self::CircuitBreakerTripped {
                score,
                threshold,
                remediation,
                ..
            } => {
                let mut hint = format!(
                    "Raise the validation score from {} to at least {} by fixing the reported issues, then create a new handoff attempt",
                    score, threshold
                );
                if !remediation.is_empty() {
                    let routed: Vec<String> = remediation
                        .iter()
                        .map(|r| match &r.reviewer {
                            Some(code) => format!("{} -> {}", r.validator, code.as_code()),
                            None => format!("{} -> phase owner", r.validator),
                        })
                        .collect();
                    hint.push_str(&format!(" (remediate: {})", routed.join(", ")));
                }
                hint
            }
            Self::ConstraintViolation { .. } => {
                "Perform the operation as the role that owns the directive's current phase".to_string()
            }
            Self::MissingEvidence { phase, .. } => {
                format!("Record the {} evidence before handing off", phase)
            }
            Self::ConcurrentTransitionConflict { .. } => {
                "Another actor advanced the directive; reload its state before retrying".to_string()
            }
            Self::DirectiveNotFound { .. } => "Check the directive id".to_string(),
            Self::HandoffNotFound { .. } => "Check the handoff id".to_string(),
            Self::DeliverableNotFound { .. } => "Check the deliverable id".to_string(),
            Self::InvalidTransition { .. } => {
                "Hand off from the directive's current phase to the next phase".to_string()
            }
            Self::HandoffClosed { .. } => {
                "Closed handoffs are immutable; create a new attempt".to_string()
            }
            Self::Config(_) => "Fix gatekeeper.toml and re-run `gatekeeper config validate`".to_string(),
            Self::Store(_) => "Check the database path and permissions".to_string(),
        }
    }

    /// Per-check remediation routing; empty for everything but breaker trips.
    pub fn remediation_plan(&self) -> &[Remediation] {
        match self {
            Self::CircuitBreakerTripped { remediation, .. } => remediation,
            _ => &[],
        }
    }

    /// True for errors a caller can retry against fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentTransitionConflict { .. } | Self::CircuitBreakerTripped { .. }
        )
    }
}

pub type GateResult<T> = std::result::Result<T, GateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_breaker_error_carries_score_and_threshold() {
        let err = GateError::CircuitBreakerTripped {
            handoff_id: 7,
            score: Score::new(70).unwrap(),
            threshold: Score::new(85).unwrap(),
            remediation: Vec::new(),
        };
        assert_eq!(err.code(), "CIRCUIT_BREAKER_TRIPPED");
        let msg = err.to_string();
        assert!(msg.contains("70"));
        assert!(msg.contains("85"));
        assert!(err.remediation().contains("at least 85"));
        assert!(err.is_retryable());
    }

    #[test]
    fn circuit_breaker_hint_routes_failing_checks() {
        use crate::review::ReviewerCode;
        use crate::review::remediation;

        let err = GateError::CircuitBreakerTripped {
            handoff_id: 7,
            score: Score::new(60).unwrap(),
            threshold: Score::new(85).unwrap(),
            remediation: vec![
                remediation::for_validator("plan_document"),
                remediation::for_validator("directive_active"),
            ],
        };
        let hint = err.remediation();
        assert!(hint.contains("plan_document -> DESIGN"));
        assert!(hint.contains("directive_active -> phase owner"));
        assert_eq!(err.remediation_plan()[0].reviewer, Some(ReviewerCode::Design));
        assert!(GateError::HandoffNotFound { id: 1 }.remediation_plan().is_empty());
    }

    #[test]
    fn constraint_violation_is_matchable() {
        let err = GateError::ConstraintViolation {
            actor_id: "exec-1".to_string(),
            role: Role::Exec,
            operation: "create directive".to_string(),
            reason: "requires lead".to_string(),
        };
        match &err {
            GateError::ConstraintViolation { role, .. } => assert_eq!(*role, Role::Exec),
            _ => panic!("Expected ConstraintViolation variant"),
        }
        assert_eq!(err.code(), "CONSTRAINT_VIOLATION");
        assert!(!err.is_retryable());
    }

    #[test]
    fn store_error_wraps_anyhow() {
        let err: GateError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.code(), "STORE_ERROR");
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn not_found_codes_are_distinct() {
        assert_eq!(GateError::DirectiveNotFound { id: 1 }.code(), "DIRECTIVE_NOT_FOUND");
        assert_eq!(GateError::HandoffNotFound { id: 1 }.code(), "HANDOFF_NOT_FOUND");
    }
}
