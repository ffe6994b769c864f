//! Weighted progress per directive, derived only from persisted evidence.
//!
//! Each phase contributes a fixed weight times a completion fraction. The
//! breakdown is a pure function of an [`Evidence`] snapshot, so the stored
//! `progress_percentage` can always be recomputed and never drifts.

use std::collections::BTreeMap;

use gatekeeper_common::{HandoffType, Phase, Score};
use serde::{Deserialize, Serialize};

use crate::errors::GateError;
use crate::store::Evidence;

/// Phase weights. They sum to 100.
pub const PHASE_WEIGHTS: [(Phase, u8); 5] = [
    (Phase::Initiation, 20),
    (Phase::Planning, 20),
    (Phase::Implementation, 30),
    (Phase::Verification, 15),
    (Phase::FinalApproval, 15),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseProgress {
    pub weight: u8,
    /// Fraction of the phase's evidence present, in `0.0..=1.0`.
    pub completion: f64,
    pub notes: Vec<String>,
}

impl PhaseProgress {
    fn new(weight: u8) -> Self {
        Self {
            weight,
            completion: 0.0,
            notes: Vec::new(),
        }
    }

    fn contribution(&self) -> f64 {
        self.weight as f64 * self.completion.clamp(0.0, 1.0)
    }

    fn missing(&mut self, phase: Phase, detail: &str) {
        self.notes.push(
            GateError::MissingEvidence {
                phase,
                detail: detail.to_string(),
            }
            .to_string(),
        );
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressBreakdown {
    pub directive_id: i64,
    pub phases: BTreeMap<Phase, PhaseProgress>,
    pub overall: u8,
    pub can_complete: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressAggregator;

impl ProgressAggregator {
    pub fn new() -> Self {
        Self
    }

    pub fn breakdown(&self, evidence: &Evidence) -> ProgressBreakdown {
        let mut phases = BTreeMap::new();
        for (phase, weight) in PHASE_WEIGHTS {
            let mut progress = PhaseProgress::new(weight);
            match phase {
                Phase::Initiation => {
                    accepted(&mut progress, evidence, HandoffType::InitiationToPlanning, 1.0)
                }
                Phase::Planning => {
                    if evidence.plan_populated() {
                        progress.completion += 0.5;
                    } else {
                        progress.missing(phase, "plan document not populated");
                    }
                    accepted(&mut progress, evidence, HandoffType::PlanningToImplementation, 0.5);
                }
                Phase::Implementation => {
                    let tracked = evidence.deliverables.len();
                    if tracked == 0 {
                        progress.missing(phase, "no deliverables tracked");
                    } else {
                        let done = evidence.completed_deliverables();
                        progress.completion = done as f64 / tracked as f64;
                        if done < tracked {
                            progress
                                .notes
                                .push(format!("{} of {} deliverables completed", done, tracked));
                        }
                    }
                }
                Phase::Verification => verification(&mut progress, evidence),
                Phase::FinalApproval => {
                    accepted(&mut progress, evidence, HandoffType::FinalApproval, 1.0)
                }
            }
            phases.insert(phase, progress);
        }

        let total: f64 = phases.values().map(PhaseProgress::contribution).sum();
        let overall = Score::from_f64(total).value();
        ProgressBreakdown {
            directive_id: evidence.directive.id,
            phases,
            overall,
            can_complete: overall == 100,
        }
    }
}

fn accepted(progress: &mut PhaseProgress, evidence: &Evidence, handoff_type: HandoffType, share: f64) {
    if evidence.is_accepted(handoff_type) {
        progress.completion += share;
    } else {
        progress.missing(
            handoff_type.from_phase(),
            &format!("{} handoff not accepted", handoff_type),
        );
    }
}

fn verification(progress: &mut PhaseProgress, evidence: &Evidence) {
    if evidence.expected_reviewers.is_empty() {
        accepted(progress, evidence, HandoffType::VerificationToFinalApproval, 1.0);
        return;
    }
    let latest = evidence.latest_results();
    let expected = evidence.expected_reviewers.len();
    let mut cleared = 0;
    for code in &evidence.expected_reviewers {
        match latest.get(code) {
            Some(result) if !result.verdict.is_blocking() => cleared += 1,
            Some(result) => progress
                .notes
                .push(format!("{} returned {}", code, result.verdict)),
            None => progress.missing(Phase::Verification, &format!("awaiting {} review", code)),
        }
    }
    progress.completion = cleared as f64 / expected as f64;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handoff::HandoffPayload;
    use crate::review::{ReviewerCode, ReviewerResult, Verdict};
    use crate::store::{
        Deliverable, DeliverableStatus, Directive, DirectiveStatus, Handoff, HandoffFields,
        HandoffStatus, PlanDocument,
    };
    use gatekeeper_common::Role;

    fn directive() -> Directive {
        Directive {
            id: 9,
            title: "t".into(),
            description: "d".into(),
            status: DirectiveStatus::InProgress,
            current_phase: Phase::Initiation,
            progress_percentage: 0,
            parent_id: None,
            metadata: serde_json::json!({}),
            created_by: "lead-1".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn accepted_handoff(handoff_type: HandoffType) -> Handoff {
        Handoff {
            id: 1,
            directive_id: 9,
            handoff_type,
            from_phase: handoff_type.from_phase(),
            to_phase: handoff_type.to_phase(),
            attempt_number: 1,
            status: HandoffStatus::Accepted,
            validation_score: Score::MAX,
            fields: HandoffFields::default(),
            payload: HandoffPayload::FinalApproval {
                accepted: vec![],
                open_children: vec![],
            },
            validation_details: vec![],
            created_by: "lead-1".into(),
            created_by_role: Role::Lead,
            acceptance_threshold: Some(Score::saturating(85)),
            decided_by: Some("lead-1".into()),
            rejection_reason: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn result(code: ReviewerCode, verdict: Verdict) -> ReviewerResult {
        ReviewerResult {
            id: 1,
            directive_id: 9,
            reviewer_code: code,
            verdict,
            confidence: Score::saturating(90),
            issues: vec![],
            warnings: vec![],
            recommendations: vec![],
            recorded_by: "bot".into(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_weights_sum_to_100() {
        let sum: u32 = PHASE_WEIGHTS.iter().map(|(_, w)| *w as u32).sum();
        assert_eq!(sum, 100);
    }

    #[test]
    fn test_empty_evidence_is_zero_with_notes() {
        let b = ProgressAggregator::new().breakdown(&Evidence::bare(directive()));
        assert_eq!(b.overall, 0);
        assert!(!b.can_complete);
        assert!(b.phases.values().all(|p| !p.notes.is_empty()));
        assert!(b.phases[&Phase::Planning].notes[0].starts_with("Missing evidence for PLANNING"));
    }

    #[test]
    fn test_partial_evidence() {
        let mut e = Evidence::bare(directive());
        e.handoffs.push(accepted_handoff(HandoffType::InitiationToPlanning));
        e.plan = Some(PlanDocument {
            directive_id: 9,
            content: "plan".into(),
            updated_by: "plan-1".into(),
            updated_at: String::new(),
        });
        let statuses = [
            DeliverableStatus::Completed,
            DeliverableStatus::Pending,
            DeliverableStatus::Pending,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            e.deliverables.push(Deliverable {
                id: i as i64,
                directive_id: 9,
                name: format!("d{}", i),
                kind: "artifact".into(),
                status,
                completed_at: None,
                created_at: String::new(),
            });
        }
        e.expected_reviewers = vec![ReviewerCode::Security, ReviewerCode::Testing];
        e.reviewer_results.push(result(ReviewerCode::Security, Verdict::Conditional));
        e.reviewer_results.push(result(ReviewerCode::Testing, Verdict::Fail));

        let b = ProgressAggregator::new().breakdown(&e);
        // 20 + 10 + 30/3 + 15/2 + 0 = 47.5
        assert_eq!(b.overall, 48);
        assert_eq!(b.phases[&Phase::Verification].completion, 0.5);
        assert!(b.phases[&Phase::Verification].notes[0].contains("FAIL"));
    }

    #[test]
    fn test_full_evidence_can_complete() {
        let mut e = Evidence::bare(directive());
        for ht in HandoffType::ALL {
            e.handoffs.push(accepted_handoff(ht));
        }
        e.plan = Some(PlanDocument {
            directive_id: 9,
            content: "plan".into(),
            updated_by: "plan-1".into(),
            updated_at: String::new(),
        });
        e.deliverables.push(Deliverable {
            id: 1,
            directive_id: 9,
            name: "api".into(),
            kind: "artifact".into(),
            status: DeliverableStatus::Completed,
            completed_at: None,
            created_at: String::new(),
        });
        let b = ProgressAggregator::new().breakdown(&e);
        assert_eq!(b.overall, 100);
        assert!(b.can_complete);
    }

    #[test]
    fn test_latest_result_wins() {
        let mut e = Evidence::bare(directive());
        e.expected_reviewers = vec![ReviewerCode::Security];
        e.reviewer_results.push(result(ReviewerCode::Security, Verdict::Fail));
        e.reviewer_results.push(result(ReviewerCode::Security, Verdict::Pass));
        let b = ProgressAggregator::new().breakdown(&e);
        assert_eq!(b.phases[&Phase::Verification].completion, 1.0);
    }

    #[test]
    fn test_breakdown_is_deterministic() {
        let mut e = Evidence::bare(directive());
        e.handoffs.push(accepted_handoff(HandoffType::InitiationToPlanning));
        let a = ProgressAggregator::new().breakdown(&e);
        let b = ProgressAggregator::new().breakdown(&e);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }
}
