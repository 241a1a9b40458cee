//! Tracebundle: single-instance coordination of diagnostic trace capture.
//!
//! # Overview
//!
//! A feedback report wants the trace data the process has accumulated so
//! far. Getting it out safely is a small but sharp problem: the external
//! recorder is stateful and must be stopped, flushed, harvested, and
//! restarted in order; at most one retrieval request may wait at a time; and
//! a consumer can discard a session while its flush is still in flight.
//!
//! This crate owns exactly that problem. [`TraceSessionCoordinator`] is a
//! process-wide singleton running a compact state machine: one active
//! session at most, one pending waiter at most, and a keyed store of
//! harvested payloads that outlive the session that produced them.
//!
//! # Core guarantees
//!
//! - **One session in flight**: requesting a trace while one is active
//!   returns the same id and never double-stops the recorder
//! - **At-most-once delivery**: each waiter is invoked exactly once, with
//!   data or with `None` on cancellation, never twice and never both
//! - **Uniform timing**: already-harvested data is still delivered through
//!   the deferred task queue, never inline
//! - **Race-safe discard**: a flush completing for a discarded session is a
//!   no-op; a coordinator dropped before a deferred task runs makes that
//!   task a no-op
//!
//! # Module structure
//!
//! - [`session`]: session identifiers and their allocator
//! - [`coordinator`]: the state machine and singleton lifecycle
//! - [`recorder`]: the external recording subsystem seam
//! - [`payload`]: packaged payloads and the packaging seam
//! - [`defer`]: deferred task execution seam
//! - [`error`](mod@error): error types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracebundle::{GzipPackager, StepQueue, TraceSessionCoordinator};
//!
//! let queue = Arc::new(StepQueue::new());
//! let coordinator = TraceSessionCoordinator::create(
//!     Arc::new(MyRecorder::attach()),
//!     Arc::new(GzipPackager::new()),
//!     queue.clone(),
//! )?;
//!
//! let id = coordinator.request_trace();
//! coordinator.get_trace_data(id, |payload| {
//!     if let Some(payload) = payload {
//!         attach_to_report(payload.as_bytes());
//!     }
//! })?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod coordinator;
pub mod defer;
pub mod error;
pub mod payload;
pub mod recorder;
pub mod session;

// Test-only helpers (lab recorder, singleton serialization).
#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

// Re-exports for convenient access to the public surface.
pub use coordinator::{TraceCallback, TraceSessionCoordinator};
pub use defer::{StepQueue, Task, TaskQueue};
pub use error::{CreateError, TraceDataError};
pub use payload::{GzipPackager, PayloadPackager, TRACE_ENTRY_NAME, TracePayload, unpackage_gzip};
pub use recorder::{FlushDone, RecorderConfig, TraceRecorder};
pub use session::SessionId;

// Compression levels for `GzipPackager::with_level`.
pub use flate2::Compression;
