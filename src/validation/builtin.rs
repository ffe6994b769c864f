//! The built-in gate set.

use std::sync::Arc;

use async_trait::async_trait;
use gatekeeper_common::{HandoffType, Score};

use super::{ValidationContext, Validator, ValidatorOutcome};
use crate::store::HandoffFields;

/// Minimum executive summary length before it counts as substantive.
pub const MIN_SUMMARY_CHARS: usize = 100;
/// Minimum plan document length for the planning gate.
pub const MIN_PLAN_CHARS: usize = 100;
/// Action items expected in a handoff.
pub const MIN_ACTION_ITEMS: usize = 3;

const BOILERPLATE: [&str; 4] = ["tbd", "to be defined", "placeholder", "lorem ipsum"];

/// Every built-in validator, in evaluation order.
pub fn all() -> Vec<Arc<dyn Validator>> {
    vec![
        Arc::new(MandatoryFields),
        Arc::new(DirectiveActive),
        Arc::new(HandoffContentQuality),
        Arc::new(PlanDocumentPresent),
        Arc::new(DeliverablesTracked),
        Arc::new(DeliverablesComplete),
        Arc::new(ReviewerVerdicts),
        Arc::new(ChildDirectivesComplete),
    ]
}

pub struct MandatoryFields;

#[async_trait]
impl Validator for MandatoryFields {
    fn name(&self) -> &str {
        "mandatory_fields"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let missing = ctx.fields.missing();
        let present = HandoffFields::NAMES.len() - missing.len();
        let issues = missing
            .into_iter()
            .map(|name| format!("missing mandatory field: {}", name))
            .collect();
        Ok(ValidatorOutcome::from_issues(
            Score::from_ratio(present, HandoffFields::NAMES.len()),
            issues,
        ))
    }
}

pub struct DirectiveActive;

#[async_trait]
impl Validator for DirectiveActive {
    fn name(&self) -> &str {
        "directive_active"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let status = ctx.evidence.directive.status;
        if status.is_workable() {
            Ok(ValidatorOutcome::pass())
        } else {
            Ok(ValidatorOutcome::fail(
                Score::MIN,
                format!("directive is {}, expected active or in_progress", status.as_str()),
            ))
        }
    }
}

/// Length and boilerplate checks on the narrative. Advisory only.
pub struct HandoffContentQuality;

impl HandoffContentQuality {
    fn action_item_count(text: &str) -> usize {
        text.lines().filter(|l| !l.trim().is_empty()).count()
    }
}

#[async_trait]
impl Validator for HandoffContentQuality {
    fn name(&self) -> &str {
        "handoff_content_quality"
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let fields = &ctx.fields;
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let summary_chars = fields.executive_summary.trim().chars().count();
        if summary_chars < MIN_SUMMARY_CHARS {
            issues.push(format!(
                "executive summary too short: {} chars, min {}",
                summary_chars, MIN_SUMMARY_CHARS
            ));
        }
        for (name, value) in fields.entries() {
            let lower = value.to_lowercase();
            if let Some(phrase) = BOILERPLATE.iter().find(|p| contains_word(&lower, p)) {
                issues.push(format!("{} contains boilerplate \"{}\"", name, phrase));
            }
        }
        let items = Self::action_item_count(&fields.action_items);
        if items < MIN_ACTION_ITEMS {
            warnings.push(format!(
                "only {} action items, {} recommended",
                items, MIN_ACTION_ITEMS
            ));
        }

        let penalty = issues.len() * 20 + warnings.len() * 5;
        let score = Score::from_f64(100.0 - penalty as f64);
        let mut outcome = ValidatorOutcome::from_issues(score, issues);
        outcome.warnings = warnings;
        Ok(outcome)
    }
}

/// Whole-word containment, so "tbd" does not match inside "outbdound".
fn contains_word(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

pub struct PlanDocumentPresent;

#[async_trait]
impl Validator for PlanDocumentPresent {
    fn name(&self) -> &str {
        "plan_document"
    }

    fn critical(&self) -> bool {
        true
    }

    fn applies_to(&self, handoff_type: HandoffType) -> bool {
        handoff_type == HandoffType::PlanningToImplementation
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        if !ctx.evidence.plan_populated() {
            return Ok(ValidatorOutcome::fail(Score::MIN, "plan document not populated"));
        }
        let chars = ctx.evidence.plan_text().trim().chars().count();
        if chars < MIN_PLAN_CHARS {
            return Ok(ValidatorOutcome::fail(
                Score::from_ratio(chars, MIN_PLAN_CHARS),
                format!("plan document too short: {} chars, min {}", chars, MIN_PLAN_CHARS),
            ));
        }
        Ok(ValidatorOutcome::pass())
    }
}

pub struct DeliverablesTracked;

#[async_trait]
impl Validator for DeliverablesTracked {
    fn name(&self) -> &str {
        "deliverables_tracked"
    }

    fn critical(&self) -> bool {
        true
    }

    fn applies_to(&self, handoff_type: HandoffType) -> bool {
        matches!(
            handoff_type,
            HandoffType::PlanningToImplementation | HandoffType::ImplementationToVerification
        )
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        if ctx.evidence.deliverables.is_empty() {
            Ok(ValidatorOutcome::fail(Score::MIN, "no deliverables tracked"))
        } else {
            Ok(ValidatorOutcome::pass())
        }
    }
}

pub struct DeliverablesComplete;

#[async_trait]
impl Validator for DeliverablesComplete {
    fn name(&self) -> &str {
        "deliverables_complete"
    }

    fn applies_to(&self, handoff_type: HandoffType) -> bool {
        handoff_type == HandoffType::ImplementationToVerification
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let tracked = ctx.evidence.deliverables.len();
        let done = ctx.evidence.completed_deliverables();
        let score = Score::from_ratio(done, tracked);
        if tracked > 0 && done == tracked {
            return Ok(ValidatorOutcome::pass());
        }
        Ok(ValidatorOutcome::fail(
            score,
            format!("{} of {} deliverables completed", done, tracked),
        ))
    }
}

/// No blocking verdicts, scored by the share of in-scope reviewers that cleared.
pub struct ReviewerVerdicts;

#[async_trait]
impl Validator for ReviewerVerdicts {
    fn name(&self) -> &str {
        "reviewer_verdicts"
    }

    fn critical(&self) -> bool {
        true
    }

    fn applies_to(&self, handoff_type: HandoffType) -> bool {
        handoff_type == HandoffType::VerificationToFinalApproval
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let scope = ctx.evidence.reviewers_in_scope();
        if scope.is_empty() {
            return Ok(ValidatorOutcome::fail(Score::MIN, "no reviewer results recorded"));
        }
        let latest = ctx.evidence.latest_results();
        let mut issues = Vec::new();
        let mut cleared = 0;
        for code in &scope {
            match latest.get(code) {
                Some(r) if r.verdict.is_blocking() => {
                    issues.push(format!("{} returned {}", code, r.verdict))
                }
                Some(_) => cleared += 1,
                None => issues.push(format!("awaiting {} review", code)),
            }
        }
        Ok(ValidatorOutcome::from_issues(
            Score::from_ratio(cleared, scope.len()),
            issues,
        ))
    }
}

pub struct ChildDirectivesComplete;

#[async_trait]
impl Validator for ChildDirectivesComplete {
    fn name(&self) -> &str {
        "child_directives_complete"
    }

    fn critical(&self) -> bool {
        true
    }

    fn applies_to(&self, handoff_type: HandoffType) -> bool {
        handoff_type == HandoffType::FinalApproval
    }

    async fn validate(&self, ctx: &ValidationContext) -> anyhow::Result<ValidatorOutcome> {
        let children = &ctx.evidence.children;
        let issues: Vec<String> = children
            .iter()
            .filter(|c| !c.status.is_settled())
            .map(|c| format!("child directive {} is {}", c.id, c.status.as_str()))
            .collect();
        let settled = children.len() - issues.len();
        let score = if children.is_empty() {
            Score::MAX
        } else {
            Score::from_ratio(settled, children.len())
        };
        Ok(ValidatorOutcome::from_issues(score, issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{ReviewerCode, ReviewerResult, Verdict};
    use crate::store::{Deliverable, DeliverableStatus, DirectiveStatus, PlanDocument};
    use crate::validation::tests_support::{complete_fields, context_for};

    fn reviewer_result(code: ReviewerCode, verdict: Verdict) -> ReviewerResult {
        ReviewerResult {
            id: 1,
            directive_id: 1,
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

    #[tokio::test]
    async fn test_mandatory_fields_scores_by_presence() {
        let mut ctx = context_for(HandoffType::InitiationToPlanning);
        let full = MandatoryFields.validate(&ctx).await.unwrap();
        assert!(full.passed);
        assert_eq!(full.score, Score::MAX);

        ctx.fields.known_issues.clear();
        let partial = MandatoryFields.validate(&ctx).await.unwrap();
        assert!(!partial.passed);
        assert_eq!(partial.score.value(), 86);
        assert_eq!(partial.issues, vec!["missing mandatory field: known_issues"]);
    }

    #[tokio::test]
    async fn test_directive_active() {
        let mut ctx = context_for(HandoffType::InitiationToPlanning);
        assert!(DirectiveActive.validate(&ctx).await.unwrap().passed);
        ctx.evidence.directive.status = DirectiveStatus::Draft;
        let outcome = DirectiveActive.validate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.issues[0].contains("draft"));
    }

    #[tokio::test]
    async fn test_content_quality_flags_boilerplate_and_short_summary() {
        let mut ctx = context_for(HandoffType::InitiationToPlanning);
        assert_eq!(
            HandoffContentQuality.validate(&ctx).await.unwrap().score,
            Score::MAX
        );

        ctx.fields.executive_summary = "TBD".into();
        ctx.fields.action_items = "- one".into();
        let outcome = HandoffContentQuality.validate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.issues.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.score.value(), 55);
    }

    #[test]
    fn test_contains_word_respects_boundaries() {
        assert!(contains_word("scope is tbd.", "tbd"));
        assert!(!contains_word("outbdound", "tbd"));
        assert!(contains_word("a placeholder value", "placeholder"));
    }

    #[tokio::test]
    async fn test_plan_document_length() {
        let mut ctx = context_for(HandoffType::PlanningToImplementation);
        assert!(!PlanDocumentPresent.validate(&ctx).await.unwrap().passed);

        ctx.evidence.plan = Some(PlanDocument {
            directive_id: 1,
            content: "x".repeat(50),
            updated_by: "plan-1".into(),
            updated_at: String::new(),
        });
        let short = PlanDocumentPresent.validate(&ctx).await.unwrap();
        assert_eq!(short.score.value(), 50);

        ctx.evidence.plan.as_mut().unwrap().content = "x".repeat(120);
        assert!(PlanDocumentPresent.validate(&ctx).await.unwrap().passed);
    }

    #[tokio::test]
    async fn test_deliverable_checks() {
        let mut ctx = context_for(HandoffType::ImplementationToVerification);
        assert!(!DeliverablesTracked.validate(&ctx).await.unwrap().passed);
        assert_eq!(
            DeliverablesComplete.validate(&ctx).await.unwrap().score,
            Score::MIN
        );

        for (i, status) in [DeliverableStatus::Completed, DeliverableStatus::Pending]
            .into_iter()
            .enumerate()
        {
            ctx.evidence.deliverables.push(Deliverable {
                id: i as i64,
                directive_id: 1,
                name: format!("d{}", i),
                kind: "artifact".into(),
                status,
                completed_at: None,
                created_at: String::new(),
            });
        }
        assert!(DeliverablesTracked.validate(&ctx).await.unwrap().passed);
        let partial = DeliverablesComplete.validate(&ctx).await.unwrap();
        assert!(!partial.passed);
        assert_eq!(partial.score.value(), 50);
    }

    #[tokio::test]
    async fn test_reviewer_verdicts() {
        let mut ctx = context_for(HandoffType::VerificationToFinalApproval);
        assert!(!ReviewerVerdicts.validate(&ctx).await.unwrap().passed);

        ctx.evidence.expected_reviewers = vec![ReviewerCode::Security, ReviewerCode::Testing];
        ctx.evidence
            .reviewer_results
            .push(reviewer_result(ReviewerCode::Security, Verdict::Conditional));
        ctx.evidence
            .reviewer_results
            .push(reviewer_result(ReviewerCode::Testing, Verdict::Fail));
        let outcome = ReviewerVerdicts.validate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score.value(), 50);
        assert_eq!(outcome.issues, vec!["TESTING returned FAIL"]);

        ctx.evidence
            .reviewer_results
            .push(reviewer_result(ReviewerCode::Testing, Verdict::Pass));
        let outcome = ReviewerVerdicts.validate(&ctx).await.unwrap();
        assert!(outcome.passed);
        assert_eq!(outcome.score, Score::MAX);
    }

    #[tokio::test]
    async fn test_child_directives() {
        let mut ctx = context_for(HandoffType::FinalApproval);
        assert!(ChildDirectivesComplete.validate(&ctx).await.unwrap().passed);

        let mut child = ctx.evidence.directive.clone();
        child.id = 2;
        child.status = DirectiveStatus::InProgress;
        ctx.evidence.children.push(child.clone());
        child.id = 3;
        child.status = DirectiveStatus::Deferred;
        ctx.evidence.children.push(child);
        let outcome = ChildDirectivesComplete.validate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(outcome.score.value(), 50);
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let validators = all();
        let mut names: Vec<_> = validators.iter().map(|v| v.name().to_string()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8);
        assert!(complete_fields().missing().is_empty());
    }
}
