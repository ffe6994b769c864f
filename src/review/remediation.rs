//! Routing failed gate checks to the reviewer who can fix them.
//!
//! When the circuit breaker blocks a handoff, the failing validators say
//! *what* is wrong; this table says *who* should remediate it. Each entry
//! names a category, an optional [`ReviewerCode`] and a one-line action.
//! Entries without a reviewer are fixed by the phase owner directly.
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::remediation::{self, RemediationCategory};
//! use gatekeeper::review::ReviewerCode;
//!
//! let r = remediation::for_validator("plan_document");
//! assert_eq!(r.category, RemediationCategory::Quality);
//! assert_eq!(r.reviewer, Some(ReviewerCode::Design));
//! ```

use serde::Serialize;
use std::fmt;

use super::ReviewerCode;
use crate::validation::ValidationResult;

/// Issue text recorded for validators that could not report.
const EXECUTION_ISSUES: [&str; 2] = ["validator execution failed", "validator timed out"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationCategory {
    Quality,
    Testing,
    Design,
    Stories,
    Infrastructure,
    Workflow,
}

impl RemediationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Testing => "testing",
            Self::Design => "design",
            Self::Stories => "stories",
            Self::Infrastructure => "infrastructure",
            Self::Workflow => "workflow",
        }
    }
}

impl fmt::Display for RemediationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How to remediate one failing validator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Remediation {
    pub validator: String,
    pub category: RemediationCategory,
    pub reviewer: Option<ReviewerCode>,
    pub action: &'static str,
}

/// Look up the remediation for a validator by name. Unknown validators fall
/// back to the phase owner with a generic action.
pub fn for_validator(name: &str) -> Remediation {
    use RemediationCategory::*;
    let (category, reviewer, action) = match name {
        "mandatory_fields" => (
            Quality,
            None,
            "Fill every blank handoff field in the draft",
        ),
        "directive_active" => (
            Workflow,
            None,
            "Have the lead activate the directive",
        ),
        "handoff_content_quality" => (
            Quality,
            Some(ReviewerCode::Documentation),
            "Replace boilerplate and expand the summary and action items",
        ),
        "plan_document" => (
            Quality,
            Some(ReviewerCode::Design),
            "Write a substantive plan document",
        ),
        "deliverables_tracked" => (
            Stories,
            Some(ReviewerCode::Risk),
            "Break the plan into tracked deliverables",
        ),
        "deliverables_complete" => (
            Testing,
            Some(ReviewerCode::Testing),
            "Finish and verify the outstanding deliverables",
        ),
        "reviewer_verdicts" => (
            Testing,
            Some(ReviewerCode::Regression),
            "Resolve the failing reviewer findings and request a re-review",
        ),
        "child_directives_complete" => (
            Workflow,
            None,
            "Complete or defer every child directive",
        ),
        _ => (
            Quality,
            None,
            "Address the issues reported by this check",
        ),
    };
    Remediation {
        validator: name.to_string(),
        category,
        reviewer,
        action,
    }
}

/// Remediations for every failed result, in result order.
///
/// A validator that errored or timed out is an infrastructure problem
/// regardless of which check it was.
pub fn plan(results: &[ValidationResult]) -> Vec<Remediation> {
    results
        .iter()
        .filter(|r| !r.passed)
        .map(|r| {
            if r.issues.iter().any(|i| EXECUTION_ISSUES.contains(&i.as_str())) {
                Remediation {
                    validator: r.name.clone(),
                    category: RemediationCategory::Infrastructure,
                    reviewer: None,
                    action: "Investigate why the check could not run, then resubmit",
                }
            } else {
                for_validator(&r.name)
            }
        })
        .collect()
}

/// Distinct reviewers across a remediation plan, first-seen order.
pub fn reviewers(plan: &[Remediation]) -> Vec<ReviewerCode> {
    let mut out: Vec<ReviewerCode> = Vec::new();
    for code in plan.iter().filter_map(|r| r.reviewer.as_ref()) {
        if !out.contains(code) {
            out.push(code.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::builtin;
    use gatekeeper_common::Score;

    fn failed(name: &str, issue: &str) -> ValidationResult {
        ValidationResult::errored(name, issue, true, 1.0)
    }

    #[test]
    fn test_every_builtin_has_a_specific_entry() {
        for validator in builtin::all() {
            let r = for_validator(validator.name());
            assert_ne!(
                r.action, "Address the issues reported by this check",
                "{} falls back to the generic action",
                validator.name()
            );
        }
    }

    #[test]
    fn test_plan_skips_passing_results() {
        let mut ok = failed("plan_document", "short");
        ok.passed = true;
        ok.score = Score::MAX;
        let results = vec![ok, failed("deliverables_complete", "2 of 3 open")];
        let plan = plan(&results);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].validator, "deliverables_complete");
        assert_eq!(plan[0].reviewer, Some(ReviewerCode::Testing));
    }

    #[test]
    fn test_execution_failure_is_infrastructure() {
        let plan = plan(&[failed("plan_document", "validator timed out")]);
        assert_eq!(plan[0].category, RemediationCategory::Infrastructure);
        assert_eq!(plan[0].reviewer, None);
    }

    #[test]
    fn test_reviewers_are_deduplicated() {
        let plan = plan(&[
            failed("handoff_content_quality", "boilerplate"),
            failed("mandatory_fields", "blank"),
            failed("handoff_content_quality", "short summary"),
            failed("plan_document", "missing"),
        ]);
        assert_eq!(
            reviewers(&plan),
            vec![ReviewerCode::Documentation, ReviewerCode::Design]
        );
    }
}
