//! Internal records for runtime entities.
//!
//! This module contains the record types the runtime keeps in its arenas to
//! track tasks and scopes.
//!
//! These are internal implementation details and not part of the public API.

pub mod scope;
pub mod task;

pub use scope::{ScopeKind, ScopeRecord};
pub use task::TaskRecord;
