//! Identifier types for runtime entities.
//!
//! Tasks and scopes are stored in arenas inside the runtime state; their ids
//! wrap the arena index so that a stale id never resolves to a newer record.

use crate::util::ArenaIndex;
use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static DETACHED_TASK_COUNTER: AtomicU32 = AtomicU32::new(1);

/// A unique identifier for a scope.
///
/// Scopes form a tree and own every task launched inside them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) ArenaIndex);

impl ScopeId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates a scope id for tests.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScopeId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0.slot())
    }
}

/// A unique identifier for a task.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) ArenaIndex);

impl TaskId {
    pub(crate) const fn from_arena(index: ArenaIndex) -> Self {
        Self(index)
    }

    pub(crate) const fn arena_index(self) -> ArenaIndex {
        self.0
    }

    /// Creates an id for a task that never entered the registry, such as a
    /// launch into a scope that had already closed.
    ///
    /// Detached ids use generation `u32::MAX`, which live records never reach
    /// in practice.
    #[must_use]
    pub(crate) fn new_detached() -> Self {
        let slot = DETACHED_TASK_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(ArenaIndex::new(slot, u32::MAX))
    }

    /// Creates a task id for tests.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(slot: u32, generation: u32) -> Self {
        Self(ArenaIndex::new(slot, generation))
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({}:{})", self.0.slot(), self.0.generation())
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0.slot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_slot() {
        assert_eq!(TaskId::new_for_test(7, 2).to_string(), "T7");
        assert_eq!(ScopeId::new_for_test(3, 0).to_string(), "S3");
    }

    #[test]
    fn detached_ids_are_unique() {
        let a = TaskId::new_detached();
        let b = TaskId::new_detached();
        assert_ne!(a, b);
        assert_eq!(a.arena_index().generation(), u32::MAX);
    }
}
