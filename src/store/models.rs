use std::str::FromStr;

use gatekeeper_common::{HandoffType, Phase, Role, Score};
use serde::{Deserialize, Serialize};

use crate::handoff::HandoffPayload;
use crate::validation::ValidationResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveStatus {
    Draft,
    Active,
    InProgress,
    Completed,
    Deferred,
}

impl DirectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Deferred => "deferred",
        }
    }

    /// Whether work on the directive may currently be handed off.
    pub fn is_workable(&self) -> bool {
        matches!(self, Self::Active | Self::InProgress)
    }

    /// Closed directives count as settled for a parent's final approval.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Deferred)
    }
}

impl FromStr for DirectiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "deferred" => Ok(Self::Deferred),
            _ => Err(format!("Invalid directive status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Directive {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: DirectiveStatus,
    pub current_phase: Phase,
    pub progress_percentage: u8,
    pub parent_id: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_by: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a directive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDirective {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewDirective {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            parent_id: None,
            metadata: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDocument {
    pub directive_id: i64,
    pub content: String,
    pub updated_by: String,
    pub updated_at: String,
}

impl PlanDocument {
    pub fn is_populated(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    Pending,
    Completed,
}

impl DeliverableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for DeliverableStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid deliverable status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deliverable {
    pub id: i64,
    pub directive_id: i64,
    pub name: String,
    pub kind: String,
    pub status: DeliverableStatus,
    pub completed_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    PendingAcceptance,
    Accepted,
    Rejected,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingAcceptance => "pending_acceptance",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl FromStr for HandoffStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_acceptance" => Ok(Self::PendingAcceptance),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Invalid handoff status: {}", s)),
        }
    }
}

/// The seven narrative fields every handoff carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandoffFields {
    pub executive_summary: String,
    pub completeness_report: String,
    pub deliverables_manifest: String,
    pub key_decisions: String,
    pub known_issues: String,
    pub resource_utilization: String,
    pub action_items: String,
}

impl HandoffFields {
    pub const NAMES: [&'static str; 7] = [
        "executive_summary",
        "completeness_report",
        "deliverables_manifest",
        "key_decisions",
        "known_issues",
        "resource_utilization",
        "action_items",
    ];

    /// Field values paired with their names, in declaration order.
    pub fn entries(&self) -> [(&'static str, &str); 7] {
        [
            (Self::NAMES[0], self.executive_summary.as_str()),
            (Self::NAMES[1], self.completeness_report.as_str()),
            (Self::NAMES[2], self.deliverables_manifest.as_str()),
            (Self::NAMES[3], self.key_decisions.as_str()),
            (Self::NAMES[4], self.known_issues.as_str()),
            (Self::NAMES[5], self.resource_utilization.as_str()),
            (Self::NAMES[6], self.action_items.as_str()),
        ]
    }

    /// Names of fields that are empty or whitespace.
    pub fn missing(&self) -> Vec<&'static str> {
        self.entries()
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Handoff {
    pub id: i64,
    pub directive_id: i64,
    pub handoff_type: HandoffType,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub attempt_number: u32,
    pub status: HandoffStatus,
    pub validation_score: Score,
    pub fields: HandoffFields,
    pub payload: HandoffPayload,
    pub validation_details: Vec<ValidationResult>,
    pub created_by: String,
    pub created_by_role: Role,
    pub acceptance_threshold: Option<Score>,
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A scored handoff attempt ready to persist.
#[derive(Debug, Clone)]
pub struct NewHandoff {
    pub directive_id: i64,
    pub handoff_type: HandoffType,
    pub validation_score: Score,
    pub fields: HandoffFields,
    pub payload: HandoffPayload,
    pub validation_details: Vec<ValidationResult>,
}

/// Filter for pending handoff listings. Empty filter lists everything pending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandoffFilter {
    pub directive_id: Option<i64>,
    pub handoff_type: Option<HandoffType>,
    /// Only handoffs this role may accept.
    pub acceptable_by: Option<Role>,
}

impl HandoffFilter {
    pub fn for_directive(directive_id: i64) -> Self {
        Self {
            directive_id: Some(directive_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, handoff: &Handoff) -> bool {
        if self.directive_id.is_some_and(|id| id != handoff.directive_id) {
            return false;
        }
        if self.handoff_type.is_some_and(|t| t != handoff.handoff_type) {
            return false;
        }
        match self.acceptable_by {
            Some(Role::Lead) => true,
            Some(role) => handoff.from_phase.owner() == role,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_reports_blank_fields_in_order() {
        let fields = HandoffFields {
            executive_summary: "Done".into(),
            completeness_report: "   ".into(),
            key_decisions: "Use SQLite".into(),
            ..HandoffFields::default()
        };
        assert_eq!(
            fields.missing(),
            vec![
                "completeness_report",
                "deliverables_manifest",
                "known_issues",
                "resource_utilization",
                "action_items",
            ]
        );
    }

    #[test]
    fn test_directive_status_round_trip() {
        for status in [
            DirectiveStatus::Draft,
            DirectiveStatus::Active,
            DirectiveStatus::InProgress,
            DirectiveStatus::Completed,
            DirectiveStatus::Deferred,
        ] {
            assert_eq!(status.as_str().parse::<DirectiveStatus>().unwrap(), status);
        }
        assert!("archived".parse::<DirectiveStatus>().is_err());
    }

    #[test]
    fn test_workable_statuses() {
        assert!(DirectiveStatus::Active.is_workable());
        assert!(DirectiveStatus::InProgress.is_workable());
        assert!(!DirectiveStatus::Draft.is_workable());
        assert!(!DirectiveStatus::Deferred.is_workable());
    }
}
