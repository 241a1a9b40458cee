//! Session identifiers for trace capture.
//!
//! A session spans one trace-capture attempt, from request until its data is
//! collected or discarded. Ids are allocated from a process-wide counter and
//! are never reused.

use core::fmt;
use core::num::NonZeroU64;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

// Session ids start at 1 and increase. Zero is unrepresentable, so "no
// active session" is `Option<SessionId>` rather than a sentinel value.
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// A unique identifier for one trace-capture session.
///
/// Strictly increasing across the process lifetime; an id is never handed
/// out twice, even after its session has been discarded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(NonZeroU64);

impl SessionId {
    /// Allocates the next session id (internal use).
    #[must_use]
    pub(crate) fn allocate() -> Self {
        let raw = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        match NonZeroU64::new(raw) {
            Some(id) => Self(id),
            // Counter starts at 1 and only increments.
            None => Self(NonZeroU64::MIN),
        }
    }

    /// Returns the id as a plain integer.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }

    /// Creates a session id for testing purposes.
    #[doc(hidden)]
    #[must_use]
    pub const fn new_for_test(raw: u64) -> Self {
        match NonZeroU64::new(raw) {
            Some(id) => Self(id),
            None => panic!("session ids start at 1"),
        }
    }
}

impl fmt::Debug for SessionId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}
