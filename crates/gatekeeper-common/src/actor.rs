//! Roles and actors.
//!
//! There is no ambient "current user". Every mutating call receives an
//! [`Actor`] and the constraint layer checks it explicitly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role an actor operates under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Strategic owner: initiates directives and grants final approval.
    Lead,
    /// Planner: writes the plan and verifies the implementation.
    Plan,
    /// Implementer: delivers the planned work.
    Exec,
    /// External reviewer collaborator recording verdicts.
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lead => "lead",
            Self::Plan => "plan",
            Self::Exec => "exec",
            Self::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lead" => Ok(Self::Lead),
            "plan" => Ok(Self::Plan),
            "exec" => Ok(Self::Exec),
            "reviewer" => Ok(Self::Reviewer),
            _ => Err(format!(
                "Invalid role '{}'. Valid values: lead, plan, exec, reviewer",
                s
            )),
        }
    }
}

/// An identified actor performing a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn lead(id: impl Into<String>) -> Self {
        Self::new(id, Role::Lead)
    }

    pub fn plan(id: impl Into<String>) -> Self {
        Self::new(id, Role::Plan)
    }

    pub fn exec(id: impl Into<String>) -> Self {
        Self::new(id, Role::Exec)
    }

    pub fn reviewer(id: impl Into<String>) -> Self {
        Self::new(id, Role::Reviewer)
    }

    /// An actor with a blank id carries no usable identity.
    pub fn is_identified(&self) -> bool {
        !self.id.trim().is_empty()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str_is_case_insensitive() {
        assert_eq!("LEAD".parse::<Role>().unwrap(), Role::Lead);
        assert_eq!("Exec".parse::<Role>().unwrap(), Role::Exec);
        let err = "admin".parse::<Role>().unwrap_err();
        assert!(err.contains("admin"));
    }

    #[test]
    fn test_blank_actor_is_not_identified() {
        assert!(!Actor::lead("   ").is_identified());
        assert!(!Actor::exec("").is_identified());
        assert!(Actor::plan("planner-1").is_identified());
    }

    #[test]
    fn test_actor_display() {
        assert_eq!(Actor::reviewer("qa-bot").to_string(), "qa-bot (reviewer)");
    }
}
