//! Directive lifecycle engine.
//!
//! Directives move through INITIATION → PLANNING → IMPLEMENTATION →
//! VERIFICATION → FINAL_APPROVAL. Each move is a scored handoff that must
//! clear the validator gate set and the circuit breaker, and every write is
//! checked against the role that owns the directive's current phase.
//! [`GateEngine`] is the entry point.

pub mod audit;
pub mod errors;
pub mod gate_config;
pub mod gates;
pub mod handoff;
pub mod logging;
pub mod progress;
pub mod review;
pub mod store;
pub mod validation;

pub use errors::{GateError, GateResult};
pub use gatekeeper_common::{Actor, HandoffType, Phase, Priority, Role, Score};
pub use handoff::{GateEngine, HandoffDraft, HandoffPayload, HandoffResult};
