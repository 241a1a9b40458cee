//! Error types for coordinator operations.
//!
//! All failures here are local and non-fatal: callers observe them as return
//! values and decide what to do. The one asynchronous failure in the crate
//! (reading a flushed artifact) is logged and never surfaced to a consumer.

use thiserror::Error;

/// An error from [`TraceSessionCoordinator::create`](crate::TraceSessionCoordinator::create).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CreateError {
    /// A coordinator instance already exists in this process.
    #[error("a trace session coordinator already exists")]
    AlreadyExists,
}

/// An error from [`TraceSessionCoordinator::get_trace_data`](crate::TraceSessionCoordinator::get_trace_data).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum TraceDataError {
    /// A consumer callback is already waiting on the active session.
    #[error("a trace data request is already pending")]
    Busy,
    /// The requested id is neither the active session nor in the store.
    #[error("no trace data for the requested session")]
    NotFound,
}

impl TraceDataError {
    /// Returns `true` if this is the busy (duplicate waiter) error.
    #[must_use]
    pub const fn is_busy(self) -> bool {
        matches!(self, Self::Busy)
    }

    /// Returns `true` if the requested session was unknown or discarded.
    #[must_use]
    pub const fn is_not_found(self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates() {
        assert!(TraceDataError::Busy.is_busy());
        assert!(!TraceDataError::Busy.is_not_found());
        assert!(TraceDataError::NotFound.is_not_found());
        assert!(!TraceDataError::NotFound.is_busy());
    }

    #[test]
    fn display_messages() {
        assert!(TraceDataError::Busy.to_string().contains("pending"));
        assert!(TraceDataError::NotFound.to_string().contains("no trace data"));
        assert!(CreateError::AlreadyExists.to_string().contains("already exists"));
    }
}
