//! Specialized reviewer codes and their recorded verdicts.
//!
//! Reviewers are external collaborators. The engine only decides *which*
//! reviewers a directive needs (see [`super::triggers`]), hands them work via
//! the activation outbox, and reads back their verdicts when scoring the
//! verification handoff and computing progress.
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::ReviewerCode;
//! use std::str::FromStr;
//!
//! let code = ReviewerCode::from_str("sec").unwrap();
//! assert_eq!(code, ReviewerCode::Security);
//! assert_eq!(code.as_code(), "SECURITY");
//! assert!(code.focus_areas().iter().any(|a| a.contains("Authentication")));
//! ```

use gatekeeper_common::Score;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a specialized reviewer.
///
/// Serialized as its upper-case code (`"SECURITY"`). Deserialization also
/// accepts the aliases understood by `FromStr` and a tagged object
/// `{"custom": "API"}` for reviewers the engine has no built-in notion of.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReviewerCode {
    Security,
    Database,
    Testing,
    Design,
    Performance,
    Regression,
    Documentation,
    Risk,
    Dependency,
    Custom(String),
}

impl ReviewerCode {
    pub fn as_code(&self) -> &str {
        match self {
            Self::Security => "SECURITY",
            Self::Database => "DATABASE",
            Self::Testing => "TESTING",
            Self::Design => "DESIGN",
            Self::Performance => "PERFORMANCE",
            Self::Regression => "REGRESSION",
            Self::Documentation => "DOCMON",
            Self::Risk => "RISK",
            Self::Dependency => "DEPENDENCY",
            Self::Custom(code) => code,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Security => "Security Review",
            Self::Database => "Database Review",
            Self::Testing => "Testing Review",
            Self::Design => "Design Review",
            Self::Performance => "Performance Review",
            Self::Regression => "Regression Review",
            Self::Documentation => "Documentation Monitor",
            Self::Risk => "Risk Assessment",
            Self::Dependency => "Dependency Review",
            Self::Custom(code) => code,
        }
    }

    /// Default concerns handed to the reviewer with each activation.
    pub fn focus_areas(&self) -> Vec<&'static str> {
        match self {
            Self::Security => vec![
                "Authentication and authorization paths",
                "Secrets exposure in code or logs",
                "Input validation gaps",
                "Injection vectors",
            ],
            Self::Database => vec![
                "Schema and migration safety",
                "Row-level access policies",
                "Missing indexes",
                "Data integrity constraints",
            ],
            Self::Testing => vec![
                "Coverage of acceptance criteria",
                "End-to-end scenarios",
                "Flaky or skipped tests",
            ],
            Self::Design => vec![
                "Component structure",
                "Accessibility",
                "Consistency with the design system",
            ],
            Self::Performance => vec![
                "Query patterns and N+1 access",
                "Unbounded growth",
                "Blocking work on hot paths",
            ],
            Self::Regression => vec![
                "Public interface changes",
                "Backward compatibility",
                "Behavior preserved across refactors",
            ],
            Self::Documentation => vec![
                "Documentation drift",
                "Missing operator notes",
            ],
            Self::Risk => vec![
                "Blast radius of the change",
                "Rollback plan",
                "Unmitigated known issues",
            ],
            Self::Dependency => vec![
                "New or upgraded packages",
                "Known vulnerabilities in dependencies",
                "License compatibility",
            ],
            Self::Custom(_) => vec![],
        }
    }

    pub fn is_builtin(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }

    pub fn all_builtins() -> Vec<Self> {
        vec![
            Self::Security,
            Self::Database,
            Self::Testing,
            Self::Design,
            Self::Performance,
            Self::Regression,
            Self::Documentation,
            Self::Risk,
            Self::Dependency,
        ]
    }
}

impl fmt::Display for ReviewerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl FromStr for ReviewerCode {
    type Err = std::convert::Infallible;

    /// Never fails: unknown codes become `Custom` with an upper-cased code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.to_lowercase().as_str() {
            "security" | "sec" => Self::Security,
            "database" | "db" => Self::Database,
            "testing" | "test" | "qa" => Self::Testing,
            "design" | "ux" => Self::Design,
            "performance" | "perf" => Self::Performance,
            "regression" => Self::Regression,
            "docmon" | "documentation" | "docs" => Self::Documentation,
            "risk" => Self::Risk,
            "dependency" | "deps" => Self::Dependency,
            _ => Self::Custom(trimmed.to_uppercase()),
        })
    }
}

impl Serialize for ReviewerCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for ReviewerCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::{self, Visitor};

        struct ReviewerCodeVisitor;

        impl<'de> Visitor<'de> for ReviewerCodeVisitor {
            type Value = ReviewerCode;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str(
                    r#"a reviewer code (e.g. "SECURITY", "perf") or a tagged object (e.g. {"custom": "API"})"#,
                )
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<ReviewerCode, E> {
                if value.trim().is_empty() {
                    return Err(de::Error::custom("reviewer code must not be blank"));
                }
                ReviewerCode::from_str(value).map_err(de::Error::custom)
            }

            fn visit_map<A: de::MapAccess<'de>>(self, mut map: A) -> Result<ReviewerCode, A::Error> {
                let key: String = map
                    .next_key()?
                    .ok_or_else(|| de::Error::custom("expected a key in reviewer code object"))?;
                if key != "custom" {
                    return Err(de::Error::unknown_field(&key, &["custom"]));
                }
                let value: String = map.next_value()?;
                while map.next_key::<de::IgnoredAny>()?.is_some() {
                    map.next_value::<de::IgnoredAny>()?;
                }
                Ok(ReviewerCode::Custom(value.trim().to_uppercase()))
            }
        }

        deserializer.deserialize_any(ReviewerCodeVisitor)
    }
}

/// A reviewer's overall verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Conditional,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Conditional => "CONDITIONAL",
        }
    }

    /// A failing verdict blocks final approval.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            "CONDITIONAL" | "CONDITIONAL_PASS" => Ok(Self::Conditional),
            _ => Err(format!("Invalid verdict: {}", s)),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A verdict recorded by an external reviewer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewerResult {
    pub id: i64,
    pub directive_id: i64,
    pub reviewer_code: ReviewerCode,
    pub verdict: Verdict,
    pub confidence: Score,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
    pub recorded_by: String,
    pub created_at: String,
}

/// Input for recording a reviewer verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReviewerResult {
    pub reviewer_code: ReviewerCode,
    pub verdict: Verdict,
    pub confidence: Score,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl NewReviewerResult {
    pub fn new(reviewer_code: ReviewerCode, verdict: Verdict, confidence: Score) -> Self {
        Self {
            reviewer_code,
            verdict,
            confidence,
            issues: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reviewer_code_aliases() {
        assert_eq!("DOCMON".parse::<ReviewerCode>().unwrap(), ReviewerCode::Documentation);
        assert_eq!("perf".parse::<ReviewerCode>().unwrap(), ReviewerCode::Performance);
        assert_eq!(
            "api".parse::<ReviewerCode>().unwrap(),
            ReviewerCode::Custom("API".to_string())
        );
    }

    #[test]
    fn test_reviewer_code_serde() {
        let json = serde_json::to_string(&ReviewerCode::Regression).unwrap();
        assert_eq!(json, "\"REGRESSION\"");
        let parsed: ReviewerCode = serde_json::from_str("\"security\"").unwrap();
        assert_eq!(parsed, ReviewerCode::Security);
        let custom: ReviewerCode = serde_json::from_str(r#"{"custom": "uat"}"#).unwrap();
        assert_eq!(custom, ReviewerCode::Custom("UAT".to_string()));
        assert!(serde_json::from_str::<ReviewerCode>(r#"{"builtin": "x"}"#).is_err());
        assert!(serde_json::from_str::<ReviewerCode>("\"  \"").is_err());
    }

    #[test]
    fn test_builtins_have_focus_areas() {
        for code in ReviewerCode::all_builtins() {
            assert!(code.is_builtin());
            assert!(!code.focus_areas().is_empty(), "{} has no focus areas", code);
        }
    }

    #[test]
    fn test_only_fail_blocks() {
        assert!(Verdict::Fail.is_blocking());
        assert!(!Verdict::Pass.is_blocking());
        assert!(!Verdict::Conditional.is_blocking());
        assert_eq!("conditional_pass".parse::<Verdict>().unwrap(), Verdict::Conditional);
    }
}
