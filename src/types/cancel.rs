//! Cancellation reason and kind types.
//!
//! Cancellation is cooperative: a request records a [`CancelReason`] on the
//! task, and the task unwinds the next time it reaches a suspension point or
//! an explicit checkpoint.

use core::fmt;

/// The kind of cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CancelKind {
    /// Explicit cancellation requested through a handle or scope.
    User,
    /// A timeout expired.
    Timeout,
    /// A sibling task failed and the owning scope is tearing down.
    FailFast,
    /// The owning scope or parent task was cancelled.
    ParentCancelled,
    /// The runtime is draining the global scope.
    Shutdown,
}

impl CancelKind {
    /// Returns the severity of this kind; stronger reasons replace weaker
    /// ones when a task is cancelled more than once.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::User => 0,
            Self::Timeout => 1,
            Self::FailFast => 2,
            Self::ParentCancelled => 3,
            Self::Shutdown => 4,
        }
    }
}

impl fmt::Display for CancelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::FailFast => write!(f, "fail-fast"),
            Self::ParentCancelled => write!(f, "parent cancelled"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Why a task or scope was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReason {
    /// The kind of cancellation.
    pub kind: CancelKind,
    /// Optional static message.
    pub message: Option<&'static str>,
}

impl CancelReason {
    /// Creates a reason of the given kind with no message.
    #[must_use]
    pub const fn new(kind: CancelKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// User cancellation with a message.
    #[must_use]
    pub const fn user(message: &'static str) -> Self {
        Self {
            kind: CancelKind::User,
            message: Some(message),
        }
    }

    /// Timeout cancellation.
    #[must_use]
    pub const fn timeout() -> Self {
        Self::new(CancelKind::Timeout)
    }

    /// A sibling failed.
    #[must_use]
    pub const fn sibling_failed() -> Self {
        Self::new(CancelKind::FailFast)
    }

    /// The parent was cancelled.
    #[must_use]
    pub const fn parent_cancelled() -> Self {
        Self::new(CancelKind::ParentCancelled)
    }

    /// Global scope shutdown.
    #[must_use]
    pub const fn shutdown() -> Self {
        Self::new(CancelKind::Shutdown)
    }

    /// Keeps the more severe of `self` and `other`.
    ///
    /// Returns `true` if `self` changed.
    pub fn strengthen(&mut self, other: &Self) -> bool {
        if other.kind.severity() > self.kind.severity() {
            *self = other.clone();
            return true;
        }
        if other.kind == self.kind && self.message.is_none() && other.message.is_some() {
            self.message = other.message;
            return true;
        }
        false
    }

    /// Returns the kind.
    #[must_use]
    pub const fn kind(&self) -> CancelKind {
        self.kind
    }
}

impl Default for CancelReason {
    fn default() -> Self {
        Self::new(CancelKind::User)
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strengthen_prefers_severity() {
        let mut reason = CancelReason::user("stop");
        assert!(reason.strengthen(&CancelReason::shutdown()));
        assert_eq!(reason.kind, CancelKind::Shutdown);
        assert!(!reason.strengthen(&CancelReason::timeout()));
        assert_eq!(reason.kind, CancelKind::Shutdown);
    }

    #[test]
    fn strengthen_fills_missing_message() {
        let mut reason = CancelReason::new(CancelKind::User);
        assert!(reason.strengthen(&CancelReason::user("why")));
        assert_eq!(reason.message, Some("why"));
        assert!(!reason.strengthen(&CancelReason::user("other")));
    }

    #[test]
    fn display_includes_message() {
        assert_eq!(CancelReason::user("tired").to_string(), "user: tired");
        assert_eq!(CancelReason::timeout().to_string(), "timeout");
    }
}
