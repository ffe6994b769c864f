use gatekeeper_common::Score;
use serde::{Deserialize, Serialize};

/// Default acceptance threshold.
pub const DEFAULT_THRESHOLD: u8 = 85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Accept,
    Reject { score: Score, threshold: Score },
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// Score gate evaluated inside the transaction that would advance a phase.
///
/// Pure: the same score always yields the same decision, so a retried
/// acceptance with an unchanged score is rejected identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreaker {
    threshold: Score,
}

impl CircuitBreaker {
    pub fn new(threshold: Score) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> Score {
        self.threshold
    }

    pub fn decide(&self, score: Score) -> GateDecision {
        if score >= self.threshold {
            GateDecision::Accept
        } else {
            GateDecision::Reject {
                score,
                threshold: self.threshold,
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Score::saturating(DEFAULT_THRESHOLD))
    }
}
