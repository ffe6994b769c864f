use gatekeeper_common::{HandoffType, Phase};

use super::{HandoffDraft, HandoffPayload, VerdictSummary};
use crate::errors::GateError;
use crate::store::{DeliverableStatus, Evidence, HandoffFields};

/// A draft merged with generated fields and the typed payload, ready to score.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedHandoff {
    pub handoff_type: HandoffType,
    pub fields: HandoffFields,
    pub payload: HandoffPayload,
    /// Evidence the phase should have produced but did not.
    pub gaps: Vec<String>,
}

/// Assembles the handoff for one ordered phase pair.
pub trait PhaseExecutor: Send + Sync {
    fn handoff_type(&self) -> HandoffType;

    /// Human-readable gaps in the evidence this phase requires.
    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String>;

    fn payload(&self, evidence: &Evidence) -> HandoffPayload;

    /// Merge the caller's draft with generated fields. Caller text always wins.
    fn prepare(&self, evidence: &Evidence, draft: &HandoffDraft) -> PreparedHandoff {
        let handoff_type = self.handoff_type();
        let gaps = self.missing_evidence(evidence);
        let mut fields = draft.fields.clone();
        if fields.completeness_report.trim().is_empty() {
            fields.completeness_report = completeness_report(handoff_type.from_phase(), &gaps);
        }
        if fields.deliverables_manifest.trim().is_empty() {
            fields.deliverables_manifest = deliverables_manifest(evidence);
        }
        PreparedHandoff {
            handoff_type,
            fields,
            payload: self.payload(evidence),
            gaps,
        }
    }
}

fn completeness_report(phase: Phase, gaps: &[String]) -> String {
    if gaps.is_empty() {
        return format!("{} evidence complete.", phase);
    }
    let mut report = format!("{} evidence incomplete:", phase);
    for gap in gaps {
        let line = GateError::MissingEvidence {
            phase,
            detail: gap.clone(),
        };
        report.push_str(&format!("\n- {}", line));
    }
    report
}

fn deliverables_manifest(evidence: &Evidence) -> String {
    if evidence.deliverables.is_empty() {
        return "No deliverables tracked.".to_string();
    }
    evidence
        .deliverables
        .iter()
        .map(|d| {
            let mark = match d.status {
                DeliverableStatus::Completed => "x",
                DeliverableStatus::Pending => " ",
            };
            format!("- [{}] {} ({})", mark, d.name, d.kind)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn deliverable_names(evidence: &Evidence, status: DeliverableStatus) -> Vec<String> {
    evidence
        .deliverables
        .iter()
        .filter(|d| d.status == status)
        .map(|d| d.name.clone())
        .collect()
}

// ── Executors ────────────────────────────────────────────────────────

pub struct InitiationExecutor;

impl PhaseExecutor for InitiationExecutor {
    fn handoff_type(&self) -> HandoffType {
        HandoffType::InitiationToPlanning
    }

    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String> {
        if evidence.directive.description.trim().is_empty() {
            vec!["directive has no description".to_string()]
        } else {
            Vec::new()
        }
    }

    fn payload(&self, evidence: &Evidence) -> HandoffPayload {
        HandoffPayload::InitiationToPlanning {
            title: evidence.directive.title.clone(),
            description: evidence.directive.description.clone(),
            expected_reviewers: evidence.expected_reviewers.clone(),
        }
    }
}

pub struct PlanningExecutor;

impl PhaseExecutor for PlanningExecutor {
    fn handoff_type(&self) -> HandoffType {
        HandoffType::PlanningToImplementation
    }

    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String> {
        let mut gaps = Vec::new();
        if !evidence.plan_populated() {
            gaps.push("plan document not populated".to_string());
        }
        if evidence.deliverables.is_empty() {
            gaps.push("no deliverables tracked".to_string());
        }
        gaps
    }

    fn payload(&self, evidence: &Evidence) -> HandoffPayload {
        HandoffPayload::PlanningToImplementation {
            plan_chars: evidence.plan_text().trim().chars().count(),
            deliverables: evidence.deliverables.iter().map(|d| d.name.clone()).collect(),
        }
    }
}

pub struct ImplementationExecutor;

impl PhaseExecutor for ImplementationExecutor {
    fn handoff_type(&self) -> HandoffType {
        HandoffType::ImplementationToVerification
    }

    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String> {
        if evidence.deliverables.is_empty() {
            vec!["no deliverables tracked".to_string()]
        } else {
            Vec::new()
        }
    }

    fn payload(&self, evidence: &Evidence) -> HandoffPayload {
        HandoffPayload::ImplementationToVerification {
            completed: deliverable_names(evidence, DeliverableStatus::Completed),
            pending: deliverable_names(evidence, DeliverableStatus::Pending),
        }
    }
}

pub struct VerificationExecutor;

impl VerificationExecutor {
    fn awaiting(evidence: &Evidence) -> Vec<crate::review::ReviewerCode> {
        let latest = evidence.latest_results();
        evidence
            .expected_reviewers
            .iter()
            .filter(|code| !latest.contains_key(code))
            .cloned()
            .collect()
    }
}

impl PhaseExecutor for VerificationExecutor {
    fn handoff_type(&self) -> HandoffType {
        HandoffType::VerificationToFinalApproval
    }

    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String> {
        if evidence.reviewer_results.is_empty() {
            return vec!["no reviewer results recorded".to_string()];
        }
        Self::awaiting(evidence)
            .into_iter()
            .map(|code| format!("awaiting {} review", code))
            .collect()
    }

    fn payload(&self, evidence: &Evidence) -> HandoffPayload {
        HandoffPayload::VerificationToFinalApproval {
            verdicts: evidence
                .latest_results()
                .into_values()
                .map(|r| VerdictSummary {
                    reviewer: r.reviewer_code.clone(),
                    verdict: r.verdict,
                    confidence: r.confidence,
                })
                .collect(),
            awaiting: Self::awaiting(evidence),
        }
    }
}

pub struct FinalApprovalExecutor;

impl FinalApprovalExecutor {
    const PRIOR: [HandoffType; 4] = [
        HandoffType::InitiationToPlanning,
        HandoffType::PlanningToImplementation,
        HandoffType::ImplementationToVerification,
        HandoffType::VerificationToFinalApproval,
    ];
}

impl PhaseExecutor for FinalApprovalExecutor {
    fn handoff_type(&self) -> HandoffType {
        HandoffType::FinalApproval
    }

    fn missing_evidence(&self, evidence: &Evidence) -> Vec<String> {
        let mut gaps: Vec<String> = Self::PRIOR
            .into_iter()
            .filter(|ht| !evidence.is_accepted(*ht))
            .map(|ht| format!("{} handoff not accepted", ht))
            .collect();
        gaps.extend(
            evidence
                .children
                .iter()
                .filter(|c| !c.status.is_settled())
                .map(|c| format!("child directive {} is {}", c.id, c.status.as_str())),
        );
        gaps
    }

    fn payload(&self, evidence: &Evidence) -> HandoffPayload {
        HandoffPayload::FinalApproval {
            accepted: Self::PRIOR
                .into_iter()
                .filter(|ht| evidence.is_accepted(*ht))
                .collect(),
            open_children: evidence
                .children
                .iter()
                .filter(|c| !c.status.is_settled())
                .map(|c| c.id)
                .collect(),
        }
    }
}

static INITIATION: InitiationExecutor = InitiationExecutor;
static PLANNING: PlanningExecutor = PlanningExecutor;
static IMPLEMENTATION: ImplementationExecutor = ImplementationExecutor;
static VERIFICATION: VerificationExecutor = VerificationExecutor;
static FINAL_APPROVAL: FinalApprovalExecutor = FinalApprovalExecutor;

/// The executor for a handoff type. Every type has exactly one.
pub fn executor_for(handoff_type: HandoffType) -> &'static dyn PhaseExecutor {
    match handoff_type {
        HandoffType::InitiationToPlanning => &INITIATION,
        HandoffType::PlanningToImplementation => &PLANNING,
        HandoffType::ImplementationToVerification => &IMPLEMENTATION,
        HandoffType::VerificationToFinalApproval => &VERIFICATION,
        HandoffType::FinalApproval => &FINAL_APPROVAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{ReviewerCode, ReviewerResult, Verdict};
    use crate::store::{Deliverable, Directive, DirectiveStatus, PlanDocument};
    use gatekeeper_common::Score;

    fn directive(description: &str) -> Directive {
        Directive {
            id: 1,
            title: "Harden login".into(),
            description: description.into(),
            status: DirectiveStatus::Active,
            current_phase: Phase::Initiation,
            progress_percentage: 0,
            parent_id: None,
            metadata: serde_json::json!({}),
            created_by: "lead-1".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn deliverable(name: &str, status: DeliverableStatus) -> Deliverable {
        Deliverable {
            id: 1,
            directive_id: 1,
            name: name.into(),
            kind: "artifact".into(),
            status,
            completed_at: None,
            created_at: String::new(),
        }
    }

    #[test]
    fn test_every_handoff_type_has_matching_executor() {
        for ht in HandoffType::ALL {
            let executor = executor_for(ht);
            assert_eq!(executor.handoff_type(), ht);
            let evidence = Evidence::bare(directive("d"));
            assert_eq!(executor.payload(&evidence).handoff_type(), ht);
        }
    }

    #[test]
    fn test_prepare_keeps_caller_text_and_fills_gaps() {
        let evidence = Evidence::bare(directive(""));
        let draft = HandoffDraft::new("Kickoff done").with_deliverables_manifest("none yet");
        let prepared = executor_for(HandoffType::InitiationToPlanning).prepare(&evidence, &draft);

        assert_eq!(prepared.fields.executive_summary, "Kickoff done");
        assert_eq!(prepared.fields.deliverables_manifest, "none yet");
        assert!(prepared.fields.completeness_report.contains("incomplete"));
        assert!(prepared.fields.completeness_report.contains("no description"));
        assert_eq!(prepared.gaps.len(), 1);
        assert!(prepared.fields.key_decisions.is_empty());
    }

    #[test]
    fn test_planning_gaps() {
        let mut evidence = Evidence::bare(directive("d"));
        assert_eq!(PlanningExecutor.missing_evidence(&evidence).len(), 2);

        evidence.plan = Some(PlanDocument {
            directive_id: 1,
            content: "Do the thing".into(),
            updated_by: "plan-1".into(),
            updated_at: String::new(),
        });
        evidence
            .deliverables
            .push(deliverable("rate limiter", DeliverableStatus::Pending));
        assert!(PlanningExecutor.missing_evidence(&evidence).is_empty());
        let manifest = deliverables_manifest(&evidence);
        assert_eq!(manifest, "- [ ] rate limiter (artifact)");
    }

    #[test]
    fn test_verification_reports_awaited_reviewers() {
        let mut evidence = Evidence::bare(directive("d"));
        evidence.expected_reviewers = vec![ReviewerCode::Security, ReviewerCode::Testing];
        evidence.reviewer_results.push(ReviewerResult {
            id: 1,
            directive_id: 1,
            reviewer_code: ReviewerCode::Security,
            verdict: Verdict::Pass,
            confidence: Score::saturating(90),
            issues: vec![],
            warnings: vec![],
            recommendations: vec![],
            recorded_by: "sec-bot".into(),
            created_at: String::new(),
        });

        let gaps = VerificationExecutor.missing_evidence(&evidence);
        assert_eq!(gaps, vec!["awaiting TESTING review".to_string()]);
        match VerificationExecutor.payload(&evidence) {
            HandoffPayload::VerificationToFinalApproval { verdicts, awaiting } => {
                assert_eq!(verdicts.len(), 1);
                assert_eq!(awaiting, vec![ReviewerCode::Testing]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_final_approval_lists_unaccepted_handoffs_and_open_children() {
        let mut evidence = Evidence::bare(directive("d"));
        let mut child = directive("child");
        child.id = 2;
        evidence.children.push(child);
        let gaps = FinalApprovalExecutor.missing_evidence(&evidence);
        assert_eq!(gaps.len(), 5);
        assert!(gaps.iter().any(|g| g.contains("child directive 2")));
    }
}
