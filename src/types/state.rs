//! Externally observable task lifecycle states.

use core::fmt;

/// Lifecycle of a task.
///
/// `Created -> Active -> {Completed, Failed, Cancelled}`. Suspension is an
/// internal scheduling pause and does not leave `Active`; neither does waiting
/// for children after the body returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Launched but not yet polled (or a lazy task not yet started).
    Created = 0,
    /// Running, suspended, or waiting for its children.
    Active = 1,
    /// Body returned normally and every child terminated.
    Completed = 2,
    /// Body or a child failed or panicked.
    Failed = 3,
    /// Cancellation was observed before the body completed.
    Cancelled = 4,
}

impl TaskState {
    /// True for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
