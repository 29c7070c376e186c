//! Core types for the coscope runtime.
//!
//! - [`id`]: Identifier types (`ScopeId`, `TaskId`)
//! - [`outcome`]: Four-valued outcome type with severity lattice
//! - [`cancel`]: Cancellation reason and kind types
//! - [`state`]: Task lifecycle states

pub mod cancel;
pub mod id;
pub mod outcome;
pub mod state;

pub use cancel::{CancelKind, CancelReason};
pub use id::{ScopeId, TaskId};
pub use outcome::{join_outcomes, Outcome, PanicPayload};
pub use state::TaskState;
