//! The external recording subsystem seam.
//!
//! The coordinator never records anything itself. It drives a collaborator
//! that captures trace events and can flush them to a file on request. The
//! collaborator is opaque beyond the two operations of [`TraceRecorder`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Completion continuation for a stop-and-flush request.
///
/// The recorder must invoke this exactly once, with the path of the flushed
/// artifact. The continuation may run on any thread.
pub type FlushDone = Box<dyn FnOnce(PathBuf) + Send>;

/// Configuration handed to the recorder when capture is (re)started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Category filter for captured events. Empty means "everything".
    #[serde(default)]
    pub categories: String,
}

impl RecorderConfig {
    /// Creates a config with the given category filter.
    #[must_use]
    pub fn with_categories(categories: impl Into<String>) -> Self {
        Self {
            categories: categories.into(),
        }
    }
}

/// The recording subsystem the coordinator serializes access to.
///
/// Implementations own capture, buffering, and temp-file placement. The
/// coordinator guarantees it issues at most one `disable_recording` per
/// session, and restarts capture only after the flushed data is harvested.
pub trait TraceRecorder: Send + Sync {
    /// Begins capturing trace events. Fire and forget; no completion signal.
    fn enable_recording(&self, config: &RecorderConfig);

    /// Stops capture and flushes accumulated data to a file of the
    /// recorder's choosing, then invokes `on_complete` with its path.
    fn disable_recording(&self, on_complete: FlushDone);
}
