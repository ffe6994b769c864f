//! Role-based write policy.
//!
//! Each phase is owned by one role. Writes are allowed only when the acting
//! role owns the operation in the directive's current phase; the Lead may
//! additionally decide any handoff. Nothing may set a phase directly. The
//! policy fails closed: a blank actor id, or a directive-scoped operation
//! evaluated without a directive, is a violation.

use gatekeeper_common::{Actor, Phase, Role};
use serde::{Deserialize, Serialize};

use crate::errors::GateError;

use Operation as Op;

/// A guarded write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    CreateDirective,
    ActivateDirective,
    DeferDirective,
    SetPhase { to: Phase },
    CreateHandoff { from: Phase },
    AcceptHandoff { from: Phase },
    RejectHandoff { from: Phase },
    WritePlan,
    TrackDeliverable,
    CompleteDeliverable,
    RecordReviewerResult,
}

impl Operation {
    pub fn describe(&self) -> String {
        match self {
            Self::CreateDirective => "create directive".to_string(),
            Self::ActivateDirective => "activate directive".to_string(),
            Self::DeferDirective => "defer directive".to_string(),
            Self::SetPhase { to } => format!("set phase to {} directly", to),
            Self::CreateHandoff { from } => format!("create handoff from {}", from),
            Self::AcceptHandoff { from } => format!("accept handoff from {}", from),
            Self::RejectHandoff { from } => format!("reject handoff from {}", from),
            Self::WritePlan => "write plan document".to_string(),
            Self::TrackDeliverable => "track deliverable".to_string(),
            Self::CompleteDeliverable => "complete deliverable".to_string(),
            Self::RecordReviewerResult => "record reviewer result".to_string(),
        }
    }

    fn requires_directive(&self) -> bool {
        !matches!(self, Self::CreateDirective)
    }
}

/// A denied write, ready to be audited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub actor: Actor,
    pub operation: Operation,
    pub reason: String,
}

impl From<Violation> for GateError {
    fn from(v: Violation) -> Self {
        GateError::ConstraintViolation {
            actor_id: v.actor.id,
            role: v.actor.role,
            operation: v.operation.describe(),
            reason: v.reason,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEnforcer;

impl ConstraintEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Check `actor` may perform `op` on a directive currently in `phase`.
    ///
    /// `phase` is `None` when no directive context exists (directive creation).
    pub fn check(
        &self,
        actor: &Actor,
        op: Operation,
        phase: Option<Phase>,
    ) -> Result<(), Violation> {
        let deny = |reason: String| {
            Err(Violation {
                actor: actor.clone(),
                operation: op,
                reason,
            })
        };

        if !actor.is_identified() {
            return deny("actor id is blank".to_string());
        }

        let current = match (op.requires_directive(), phase) {
            (true, None) => return deny("operation requires a directive context".to_string()),
            (_, current) => current,
        };

        let role = actor.role;
        match op {
            Op::CreateDirective | Op::ActivateDirective | Op::DeferDirective => {
                if role != Role::Lead {
                    return deny("only the lead role manages directive lifecycle".to_string());
                }
            }
            Op::SetPhase { .. } => {
                return deny("phases change only through an accepted handoff".to_string());
            }
            Op::CreateHandoff { from } => {
                if role != from.owner() {
                    return deny(format!("{} is owned by the {} role", from, from.owner()));
                }
            }
            Op::AcceptHandoff { from } | Op::RejectHandoff { from } => {
                if role != from.owner() && role != Role::Lead {
                    return deny(format!(
                        "handoffs from {} are decided by the {} role or the lead",
                        from,
                        from.owner()
                    ));
                }
            }
            Op::WritePlan => {
                if !(role == Role::Plan && current == Some(Phase::Planning)) {
                    return deny("the plan is written by the plan role during PLANNING".to_string());
                }
            }
            Op::TrackDeliverable => {
                let allowed = matches!(
                    (role, current),
                    (Role::Plan, Some(Phase::Planning)) | (Role::Exec, Some(Phase::Implementation))
                );
                if !allowed {
                    return deny(
                        "deliverables are tracked by plan during PLANNING or exec during IMPLEMENTATION"
                            .to_string(),
                    );
                }
            }
            Op::CompleteDeliverable => {
                if !(role == Role::Exec && current == Some(Phase::Implementation)) {
                    return deny(
                        "deliverables are completed by the exec role during IMPLEMENTATION"
                            .to_string(),
                    );
                }
            }
            Op::RecordReviewerResult => {
                if role != Role::Reviewer {
                    return deny("only reviewers record review verdicts".to_string());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enforcer() -> ConstraintEnforcer {
        ConstraintEnforcer::new()
    }

    #[test]
    fn test_only_lead_creates_directives() {
        assert!(enforcer().check(&Actor::lead("l"), Op::CreateDirective, None).is_ok());
        let v = enforcer()
            .check(&Actor::exec("e"), Op::CreateDirective, None)
            .unwrap_err();
        assert_eq!(v.operation, Op::CreateDirective);
        assert!(v.reason.contains("lead"));
    }

    #[test]
    fn test_blank_actor_fails_closed() {
        let v = enforcer()
            .check(&Actor::lead("  "), Op::CreateDirective, None)
            .unwrap_err();
        assert_eq!(v.reason, "actor id is blank");
    }

    #[test]
    fn test_missing_directive_context_fails_closed() {
        let v = enforcer()
            .check(&Actor::plan("p"), Op::WritePlan, None)
            .unwrap_err();
        assert!(v.reason.contains("directive context"));
    }

    #[test]
    fn test_set_phase_is_never_allowed() {
        for actor in [Actor::lead("l"), Actor::plan("p"), Actor::exec("e")] {
            assert!(
                enforcer()
                    .check(&actor, Op::SetPhase { to: Phase::Verification }, Some(Phase::Implementation))
                    .is_err()
            );
        }
    }

    #[test]
    fn test_handoff_creation_requires_phase_owner() {
        let op = Op::CreateHandoff {
            from: Phase::Implementation,
        };
        assert!(enforcer().check(&Actor::exec("e"), op, Some(Phase::Implementation)).is_ok());
        assert!(enforcer().check(&Actor::plan("p"), op, Some(Phase::Implementation)).is_err());
        assert!(enforcer().check(&Actor::lead("l"), op, Some(Phase::Implementation)).is_err());
    }

    #[test]
    fn test_lead_may_decide_any_handoff() {
        let op = Op::AcceptHandoff {
            from: Phase::Verification,
        };
        assert!(enforcer().check(&Actor::lead("l"), op, Some(Phase::Verification)).is_ok());
        assert!(enforcer().check(&Actor::plan("p"), op, Some(Phase::Verification)).is_ok());
        assert!(enforcer().check(&Actor::exec("e"), op, Some(Phase::Verification)).is_err());
        assert!(enforcer().check(&Actor::reviewer("r"), op, Some(Phase::Verification)).is_err());
    }

    #[test]
    fn test_plan_writes_are_phase_bound() {
        assert!(enforcer().check(&Actor::plan("p"), Op::WritePlan, Some(Phase::Planning)).is_ok());
        assert!(
            enforcer()
                .check(&Actor::plan("p"), Op::WritePlan, Some(Phase::Implementation))
                .is_err()
        );
        assert!(enforcer().check(&Actor::exec("e"), Op::WritePlan, Some(Phase::Planning)).is_err());
    }

    #[test]
    fn test_deliverable_tracking_by_phase() {
        let e = enforcer();
        assert!(e.check(&Actor::plan("p"), Op::TrackDeliverable, Some(Phase::Planning)).is_ok());
        assert!(e.check(&Actor::exec("x"), Op::TrackDeliverable, Some(Phase::Implementation)).is_ok());
        assert!(e.check(&Actor::exec("x"), Op::TrackDeliverable, Some(Phase::Planning)).is_err());
        assert!(e.check(&Actor::exec("x"), Op::CompleteDeliverable, Some(Phase::Implementation)).is_ok());
        assert!(e.check(&Actor::plan("p"), Op::CompleteDeliverable, Some(Phase::Implementation)).is_err());
    }

    #[test]
    fn test_violation_converts_to_gate_error() {
        let v = enforcer()
            .check(&Actor::plan("p"), Op::RecordReviewerResult, Some(Phase::Verification))
            .unwrap_err();
        let err: GateError = v.into();
        assert_eq!(err.code(), "CONSTRAINT_VIOLATION");
        assert!(err.to_string().contains("record reviewer result"));
    }
}
