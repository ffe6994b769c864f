//! Governance gates applied to every directive write.
//!
//! - [`CircuitBreaker`]: blocks a phase advance whose validation score is below threshold
//! - [`ConstraintEnforcer`]: blocks writes by actors whose role does not own the operation

pub mod circuit_breaker;
pub mod constraint;

pub use circuit_breaker::{CircuitBreaker, GateDecision, DEFAULT_THRESHOLD};
pub use constraint::{ConstraintEnforcer, Operation, Violation};
