//! Specialized reviewers and how they get activated.
//!
//! Reviewers run outside the engine. The engine only decides which reviewers a
//! directive needs, queues that work durably and reads back their verdicts.
//!
//! ## Components
//!
//! - [`reviewers`]: reviewer codes, verdicts and recorded results
//! - [`triggers`]: keyword/pattern dispatch from directive and plan text
//! - [`delivery`]: activation outbox and the [`ReviewerSink`] seam
//! - [`remediation`]: which reviewer fixes a failed gate check
//!
//! ## Example
//!
//! ```
//! use gatekeeper::review::{ReviewerCode, TriggerContext, TriggerDispatcher};
//!
//! let dispatcher = TriggerDispatcher::with_defaults().unwrap();
//! let activations = dispatcher.dispatch("Add a migration for the orders table", TriggerContext::Directive);
//! assert!(activations.iter().any(|a| a.reviewer == ReviewerCode::Database));
//! ```

pub mod delivery;
pub mod remediation;
pub mod reviewers;
pub mod triggers;

pub use delivery::{
    ActivationOutbox, ActivationRecord, DEFAULT_MAX_ATTEMPTS, DeliveryReport, JsonLinesSink,
    ReviewerRequest, ReviewerSink,
};
pub use reviewers::{NewReviewerResult, ReviewerCode, ReviewerResult, Verdict};
pub use triggers::{
    ReviewerActivation, Trigger, TriggerContext, TriggerDispatcher, TriggerKind, compile_pattern,
    default_triggers,
};
