//! Test helpers: a hand-driven recorder and singleton serialization.
//!
//! Gated behind `cfg(test)` or the `test-internals` feature; none of this is
//! production surface.

use crate::recorder::{FlushDone, RecorderConfig, TraceRecorder};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

// The coordinator singleton slot is process-wide, so tests touching it must
// not overlap. The guard serializes them within one test binary.
static SINGLETON_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serializes tests that create a coordinator instance.
///
/// Hold the returned guard for the whole test body.
#[must_use]
pub fn singleton_test_guard() -> MutexGuard<'static, ()> {
    SINGLETON_TEST_LOCK.lock()
}

#[derive(Default)]
struct LabState {
    enable_calls: Vec<RecorderConfig>,
    disable_calls: usize,
    pending: VecDeque<FlushDone>,
}

/// A recorder the test drives by hand.
///
/// `enable_recording` and `disable_recording` only record that they were
/// called; the test decides when (and whether) a flush completes by calling
/// [`complete_flush`](Self::complete_flush).
#[derive(Default)]
pub struct LabRecorder {
    state: Mutex<LabState>,
}

impl LabRecorder {
    /// Creates a recorder wrapped for sharing with the coordinator.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of `enable_recording` calls observed so far.
    #[must_use]
    pub fn enable_calls(&self) -> usize {
        self.state.lock().enable_calls.len()
    }

    /// The config passed to the most recent `enable_recording`, if any.
    #[must_use]
    pub fn last_config(&self) -> Option<RecorderConfig> {
        self.state.lock().enable_calls.last().cloned()
    }

    /// Number of `disable_recording` calls observed so far.
    #[must_use]
    pub fn disable_calls(&self) -> usize {
        self.state.lock().disable_calls
    }

    /// Number of flush completions not yet fired.
    #[must_use]
    pub fn pending_flushes(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Fires the oldest pending flush completion with `path`.
    ///
    /// Returns `false` if no flush was pending.
    pub fn complete_flush(&self, path: PathBuf) -> bool {
        // Take the continuation out first; it re-enters the coordinator.
        let done = self.state.lock().pending.pop_front();
        match done {
            Some(done) => {
                done(path);
                true
            }
            None => false,
        }
    }
}

impl TraceRecorder for LabRecorder {
    fn enable_recording(&self, config: &RecorderConfig) {
        self.state.lock().enable_calls.push(config.clone());
    }

    fn disable_recording(&self, on_complete: FlushDone) {
        let mut state = self.state.lock();
        state.disable_calls += 1;
        state.pending.push_back(on_complete);
    }
}
