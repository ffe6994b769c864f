//! Shared domain vocabulary for the gatekeeper directive engine.
//!
//! - [`Phase`] and [`HandoffType`]: the fixed phase ladder and the transitions between rungs
//! - [`Role`] and [`Actor`]: who is acting, threaded explicitly through every write
//! - [`Score`] and [`Priority`]: the single numeric representation used for gating decisions

pub mod actor;
pub mod phase;
pub mod score;

pub use actor::{Actor, Role};
pub use phase::{HandoffType, Phase};
pub use score::{Priority, Score, ScoreError};
