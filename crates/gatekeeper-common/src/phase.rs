//! The fixed phase ladder a directive climbs.
//!
//! Phases and their ordering are not configurable. Each phase has exactly one
//! outbound handoff type; the final approval handoff stays on the last rung and
//! closes the directive instead of moving it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::actor::Role;

/// A lifecycle phase. Ordered by position on the ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Initiation,
    Planning,
    Implementation,
    Verification,
    FinalApproval,
}

impl Phase {
    /// Every phase in ladder order.
    pub const ALL: [Phase; 5] = [
        Phase::Initiation,
        Phase::Planning,
        Phase::Implementation,
        Phase::Verification,
        Phase::FinalApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiation => "INITIATION",
            Self::Planning => "PLANNING",
            Self::Implementation => "IMPLEMENTATION",
            Self::Verification => "VERIFICATION",
            Self::FinalApproval => "FINAL_APPROVAL",
        }
    }

    /// Zero-based position on the ladder.
    pub fn ordinal(&self) -> usize {
        match self {
            Self::Initiation => 0,
            Self::Planning => 1,
            Self::Implementation => 2,
            Self::Verification => 3,
            Self::FinalApproval => 4,
        }
    }

    /// The next rung, or `None` on the last one.
    pub fn next(&self) -> Option<Phase> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// The role that owns work in this phase.
    ///
    /// ```
    /// use gatekeeper_common::{Phase, Role};
    ///
    /// assert_eq!(Phase::Implementation.owner(), Role::Exec);
    /// assert_eq!(Phase::Verification.owner(), Role::Plan);
    /// ```
    pub fn owner(&self) -> Role {
        match self {
            Self::Initiation | Self::FinalApproval => Role::Lead,
            Self::Planning | Self::Verification => Role::Plan,
            Self::Implementation => Role::Exec,
        }
    }

    /// The single handoff type that leaves this phase.
    pub fn outbound_handoff(&self) -> HandoffType {
        match self {
            Self::Initiation => HandoffType::InitiationToPlanning,
            Self::Planning => HandoffType::PlanningToImplementation,
            Self::Implementation => HandoffType::ImplementationToVerification,
            Self::Verification => HandoffType::VerificationToFinalApproval,
            Self::FinalApproval => HandoffType::FinalApproval,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "INITIATION" => Ok(Self::Initiation),
            "PLANNING" => Ok(Self::Planning),
            "IMPLEMENTATION" => Ok(Self::Implementation),
            "VERIFICATION" => Ok(Self::Verification),
            "FINAL_APPROVAL" => Ok(Self::FinalApproval),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// A transition between two phases. One per ordered phase pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffType {
    InitiationToPlanning,
    PlanningToImplementation,
    ImplementationToVerification,
    VerificationToFinalApproval,
    FinalApproval,
}

impl HandoffType {
    pub const ALL: [HandoffType; 5] = [
        HandoffType::InitiationToPlanning,
        HandoffType::PlanningToImplementation,
        HandoffType::ImplementationToVerification,
        HandoffType::VerificationToFinalApproval,
        HandoffType::FinalApproval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InitiationToPlanning => "initiation_to_planning",
            Self::PlanningToImplementation => "planning_to_implementation",
            Self::ImplementationToVerification => "implementation_to_verification",
            Self::VerificationToFinalApproval => "verification_to_final_approval",
            Self::FinalApproval => "final_approval",
        }
    }

    pub fn from_phase(&self) -> Phase {
        match self {
            Self::InitiationToPlanning => Phase::Initiation,
            Self::PlanningToImplementation => Phase::Planning,
            Self::ImplementationToVerification => Phase::Implementation,
            Self::VerificationToFinalApproval => Phase::Verification,
            Self::FinalApproval => Phase::FinalApproval,
        }
    }

    pub fn to_phase(&self) -> Phase {
        match self {
            Self::InitiationToPlanning => Phase::Planning,
            Self::PlanningToImplementation => Phase::Implementation,
            Self::ImplementationToVerification => Phase::Verification,
            Self::VerificationToFinalApproval | Self::FinalApproval => Phase::FinalApproval,
        }
    }

    /// Resolve an ordered phase pair. Pairs that skip or reverse rungs have no handoff.
    ///
    /// ```
    /// use gatekeeper_common::{HandoffType, Phase};
    ///
    /// assert_eq!(
    ///     HandoffType::from_phases(Phase::Planning, Phase::Implementation),
    ///     Some(HandoffType::PlanningToImplementation)
    /// );
    /// assert_eq!(HandoffType::from_phases(Phase::Initiation, Phase::Verification), None);
    /// ```
    pub fn from_phases(from: Phase, to: Phase) -> Option<HandoffType> {
        let handoff = from.outbound_handoff();
        (handoff.to_phase() == to).then_some(handoff)
    }

    /// Whether accepting this handoff closes the directive.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FinalApproval)
    }
}

impl fmt::Display for HandoffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandoffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|h| h.as_str() == normalized)
            .ok_or_else(|| format!("Invalid handoff type: {}", s))
    }
}
