//! The trace session coordinator.
//!
//! At most one coordinator exists per process, and at most one trace capture
//! session is in flight at a time. The coordinator serializes access to the
//! external recorder, stores harvested payloads keyed by session id, and
//! delivers each payload to at most one waiting consumer.
//!
//! Per-session state machine:
//!
//! ```text
//! IDLE (no active session)
//!   --request_trace-->            ACTIVE (id = N, stop requested)
//! ACTIVE
//!   --collection succeeds-->      IDLE (payload stored) [+ deferred restart]
//!   --discard_trace_data(N)-->    IDLE (pending waiter, if any, fired with None)
//!   --collection fails-->         IDLE (nothing stored, waiter dropped)
//! ```
//!
//! Completed payloads live outside the state machine in a keyed store and
//! remain collectible until explicitly discarded.

use crate::defer::TaskQueue;
use crate::error::{CreateError, TraceDataError};
use crate::payload::{PayloadPackager, TRACE_ENTRY_NAME, TracePayload};
use crate::recorder::{RecorderConfig, TraceRecorder};
use crate::session::SessionId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Weak};

// Process-wide singleton slot. `create` check-and-sets it; the weak reference
// stops upgrading once every strong handle is gone, so a dead coordinator
// never blocks a new one.
static SLOT: Mutex<Weak<Inner>> = Mutex::new(Weak::new());

/// Consumer continuation for trace data delivery.
///
/// Invoked exactly once: with `Some(payload)` when data arrives, or `None`
/// when the awaited session is discarded.
pub type TraceCallback = Box<dyn FnOnce(Option<TracePayload>) + Send>;

#[derive(Default)]
struct CoordinatorState {
    /// The session whose data has not yet been collected or discarded.
    active: Option<SessionId>,
    /// At most one consumer waiting on the active session.
    pending: Option<TraceCallback>,
    /// Harvested payloads, retained until discarded.
    completed: HashMap<SessionId, TracePayload>,
}

struct Inner {
    recorder: Arc<dyn TraceRecorder>,
    packager: Arc<dyn PayloadPackager>,
    queue: Arc<dyn TaskQueue>,
    config: RecorderConfig,
    state: Mutex<CoordinatorState>,
}

impl Inner {
    /// Flush completion, invoked by the recorder once per stop request.
    ///
    /// The continuation handed to the recorder holds only a weak reference,
    /// so completions arriving after the coordinator is gone do nothing.
    fn on_trace_collected(self: &Arc<Self>, path: &Path) {
        let Some(id) = self.state.lock().active else {
            // Discard raced the flush; the data's session no longer exists.
            tracing::trace!(path = %path.display(), "flush completed for a discarded session");
            return;
        };

        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(err) => {
                // Accepted data loss: the source buffers are already gone, so
                // the session drops with nothing stored and no consumer signal.
                tracing::error!(
                    path = %path.display(),
                    error = %err,
                    "failed to read flushed trace data; dropping session"
                );
                self.abandon_session();
                return;
            }
        };

        if let Err(err) = fs::remove_file(path) {
            tracing::debug!(
                path = %path.display(),
                error = %err,
                "failed to remove flushed trace artifact"
            );
        }

        let packaged = match self.packager.package(TRACE_ENTRY_NAME, &raw) {
            Ok(packaged) => packaged,
            Err(err) => {
                tracing::error!(
                    session = %id,
                    error = %err,
                    "failed to package trace data; dropping session"
                );
                self.abandon_session();
                return;
            }
        };
        let payload = TracePayload::new(packaged);

        let pending = {
            let mut state = self.state.lock();
            // The session may have been discarded while the file was read;
            // the discard already cancelled any waiter.
            if state.active != Some(id) {
                return;
            }
            state.completed.insert(id, payload.clone());
            state.active = None;
            state.pending.take()
        };

        tracing::debug!(session = %id, bytes = payload.len(), "trace data collected");

        if let Some(callback) = pending {
            callback(Some(payload));
        }

        // The restart is deferred so the recorder can finish its own teardown
        // from the stop request before a new start is issued.
        let weak = Arc::downgrade(self);
        self.queue.defer(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.recorder.enable_recording(&inner.config);
                tracing::trace!("recording restarted after collection");
            }
        }));
    }

    /// Drops the active session without storing anything. Any pending waiter
    /// is dropped uninvoked (best-effort contract for a diagnostics feature).
    fn abandon_session(&self) {
        let mut state = self.state.lock();
        state.active = None;
        state.pending = None;
    }
}

/// Coordinates diagnostic trace capture for feedback reports.
///
/// The handle is cheap to clone; all clones drive the same instance. The
/// process-wide slot frees up once the last handle is dropped, after which
/// [`create`](Self::create) succeeds again.
#[derive(Clone)]
pub struct TraceSessionCoordinator {
    inner: Arc<Inner>,
}

impl TraceSessionCoordinator {
    /// Creates the process-wide coordinator and immediately starts recording
    /// with the default config.
    ///
    /// # Errors
    ///
    /// [`CreateError::AlreadyExists`] if a coordinator is already live.
    pub fn create(
        recorder: Arc<dyn TraceRecorder>,
        packager: Arc<dyn PayloadPackager>,
        queue: Arc<dyn TaskQueue>,
    ) -> Result<Self, CreateError> {
        Self::create_with_config(recorder, packager, queue, RecorderConfig::default())
    }

    /// Creates the process-wide coordinator with an explicit recorder config.
    ///
    /// # Errors
    ///
    /// [`CreateError::AlreadyExists`] if a coordinator is already live.
    pub fn create_with_config(
        recorder: Arc<dyn TraceRecorder>,
        packager: Arc<dyn PayloadPackager>,
        queue: Arc<dyn TaskQueue>,
        config: RecorderConfig,
    ) -> Result<Self, CreateError> {
        let inner = {
            let mut slot = SLOT.lock();
            if slot.upgrade().is_some() {
                return Err(CreateError::AlreadyExists);
            }
            let inner = Arc::new(Inner {
                recorder,
                packager,
                queue,
                config,
                state: Mutex::new(CoordinatorState::default()),
            });
            *slot = Arc::downgrade(&inner);
            inner
        };

        // Capture runs from the moment the coordinator exists; sessions only
        // mark the point where accumulated data is cut and harvested.
        inner.recorder.enable_recording(&inner.config);
        tracing::debug!("trace session coordinator created; recording enabled");
        Ok(Self { inner })
    }

    /// Returns a handle to the live coordinator, if one exists.
    #[must_use]
    pub fn get() -> Option<Self> {
        SLOT.lock().upgrade().map(|inner| Self { inner })
    }

    /// Requests capture of the trace accumulated so far.
    ///
    /// Idempotent while a session is active: returns the existing id without
    /// issuing a second stop request. Otherwise allocates a new id, asks the
    /// recorder to stop and flush, and returns immediately; the data becomes
    /// available through [`get_trace_data`](Self::get_trace_data) once the
    /// flush completes.
    pub fn request_trace(&self) -> SessionId {
        let id = {
            let mut state = self.inner.state.lock();
            if let Some(id) = state.active {
                return id;
            }
            let id = SessionId::allocate();
            state.active = Some(id);
            id
        };

        tracing::debug!(session = %id, "trace requested; stopping recording");

        let weak = Arc::downgrade(&self.inner);
        self.inner.recorder.disable_recording(Box::new(move |path| {
            if let Some(inner) = weak.upgrade() {
                inner.on_trace_collected(&path);
            } else {
                tracing::trace!("flush completed after coordinator shutdown");
            }
        }));
        id
    }

    /// Registers `callback` to receive the data for session `id`.
    ///
    /// If `id` is the active session, the callback waits for collection (one
    /// waiter at a time). If the data was already harvested, delivery is
    /// deferred through the task queue, never inline, so callers observe the
    /// same timing whether the trace was live or already finished.
    ///
    /// # Errors
    ///
    /// [`TraceDataError::Busy`] if a waiter is already registered for the
    /// active session; [`TraceDataError::NotFound`] if `id` is neither active
    /// nor stored. The callback is dropped uninvoked on either error.
    pub fn get_trace_data<F>(&self, id: SessionId, callback: F) -> Result<(), TraceDataError>
    where
        F: FnOnce(Option<TracePayload>) + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        if state.active == Some(id) {
            if state.pending.is_some() {
                return Err(TraceDataError::Busy);
            }
            state.pending = Some(Box::new(callback));
            return Ok(());
        }

        let Some(payload) = state.completed.get(&id).cloned() else {
            return Err(TraceDataError::NotFound);
        };
        drop(state);

        self.inner
            .queue
            .defer(Box::new(move || callback(Some(payload))));
        Ok(())
    }

    /// Discards the data for session `id`.
    ///
    /// Removes any stored payload (no-op if absent). If `id` is the active
    /// session, the session is cancelled: the active marker clears and a
    /// pending waiter, if any, fires exactly once with `None`. A flush that
    /// later completes for the cancelled session is ignored.
    pub fn discard_trace_data(&self, id: SessionId) {
        let cancelled = {
            let mut state = self.inner.state.lock();
            state.completed.remove(&id);
            if state.active == Some(id) {
                state.active = None;
                state.pending.take()
            } else {
                None
            }
        };

        if let Some(callback) = cancelled {
            tracing::debug!(session = %id, "active session discarded; cancelling waiter");
            callback(None);
        }
    }

    /// Returns the id of the active (not yet collected) session, if any.
    #[must_use]
    pub fn active_session(&self) -> Option<SessionId> {
        self.inner.state.lock().active
    }
}

impl fmt::Debug for TraceSessionCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("TraceSessionCoordinator")
            .field("active", &state.active)
            .field("waiter", &state.pending.is_some())
            .field("stored", &state.completed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defer::StepQueue;
    use crate::payload::GzipPackager;
    use crate::test_utils::{LabRecorder, singleton_test_guard};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        recorder: Arc<LabRecorder>,
        queue: Arc<StepQueue>,
        coordinator: TraceSessionCoordinator,
    }

    fn fixture() -> Fixture {
        let recorder = LabRecorder::new();
        let queue = Arc::new(StepQueue::new());
        let coordinator = TraceSessionCoordinator::create(
            recorder.clone(),
            Arc::new(GzipPackager::new()),
            queue.clone(),
        )
        .expect("create coordinator");
        Fixture {
            recorder,
            queue,
            coordinator,
        }
    }

    #[test]
    fn create_enables_recording_immediately() {
        let _guard = singleton_test_guard();
        let f = fixture();
        assert_eq!(f.recorder.enable_calls(), 1);
        assert_eq!(f.coordinator.active_session(), None);
    }

    #[test]
    fn only_one_instance_at_a_time() {
        let _guard = singleton_test_guard();
        let f = fixture();

        let second = TraceSessionCoordinator::create(
            LabRecorder::new(),
            Arc::new(GzipPackager::new()),
            Arc::new(StepQueue::new()),
        )
        .err();
        assert_eq!(second, Some(CreateError::AlreadyExists));
        assert!(TraceSessionCoordinator::get().is_some());

        drop(second);
        drop(f);
        assert!(TraceSessionCoordinator::get().is_none());

        // The slot frees up once the first instance is gone.
        let third = TraceSessionCoordinator::create(
            LabRecorder::new(),
            Arc::new(GzipPackager::new()),
            Arc::new(StepQueue::new()),
        );
        assert!(third.is_ok());
    }

    #[test]
    fn get_returns_a_handle_to_the_same_instance() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let id = f.coordinator.request_trace();
        let other = TraceSessionCoordinator::get().expect("live instance");
        assert_eq!(other.active_session(), Some(id));
    }

    #[test]
    fn request_trace_is_idempotent_while_active() {
        let _guard = singleton_test_guard();
        let f = fixture();

        let first = f.coordinator.request_trace();
        let second = f.coordinator.request_trace();
        assert_eq!(first, second);
        // Only one stop request reaches the recorder.
        assert_eq!(f.recorder.disable_calls(), 1);
    }

    #[test]
    fn get_trace_data_for_unknown_id_is_rejected() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let result = f
            .coordinator
            .get_trace_data(SessionId::new_for_test(u64::MAX), |_| {
                panic!("callback must not run for an unknown id")
            });
        assert_eq!(result.err(), Some(TraceDataError::NotFound));
    }

    #[test]
    fn second_waiter_on_active_session_is_rejected() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let id = f.coordinator.request_trace();

        assert!(f.coordinator.get_trace_data(id, |_| {}).is_ok());
        let second = f
            .coordinator
            .get_trace_data(id, |_| panic!("second waiter must never fire"));
        assert_eq!(second.err(), Some(TraceDataError::Busy));
    }

    #[test]
    fn discard_active_session_cancels_waiter_with_none() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let id = f.coordinator.request_trace();

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        f.coordinator
            .get_trace_data(id, move |payload| {
                assert!(payload.is_none());
                fired_clone.fetch_add(1, Ordering::SeqCst);
            })
            .expect("register waiter");

        f.coordinator.discard_trace_data(id);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(f.coordinator.active_session(), None);

        // The cancelled session is gone for good.
        let late = f.coordinator.get_trace_data(id, |_| {});
        assert_eq!(late.err(), Some(TraceDataError::NotFound));
    }

    #[test]
    fn flush_for_discarded_session_is_a_no_op() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let id = f.coordinator.request_trace();
        f.coordinator.discard_trace_data(id);

        let artifact = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(artifact.path(), b"orphaned").expect("write");
        assert!(f.recorder.complete_flush(artifact.path().to_path_buf()));

        assert_eq!(f.coordinator.active_session(), None);
        assert_eq!(
            f.coordinator.get_trace_data(id, |_| {}).err(),
            Some(TraceDataError::NotFound)
        );
        // No restart is scheduled for a discarded session.
        assert_eq!(f.queue.run_until_idle(), 0);
        assert_eq!(f.recorder.enable_calls(), 1);
    }

    #[test]
    fn flush_read_failure_drops_the_session_silently() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let id = f.coordinator.request_trace();

        f.coordinator
            .get_trace_data(id, |_| panic!("waiter must not fire on read failure"))
            .expect("register waiter");

        assert!(
            f.recorder
                .complete_flush(PathBuf::from("/nonexistent/trace-flush"))
        );

        assert_eq!(f.coordinator.active_session(), None);
        assert_eq!(
            f.coordinator.get_trace_data(id, |_| {}).err(),
            Some(TraceDataError::NotFound)
        );
        // The dropped waiter freed the slot for future requests.
        let next = f.coordinator.request_trace();
        assert!(f.coordinator.get_trace_data(next, |_| {}).is_ok());
    }

    #[test]
    fn discarding_a_stored_payload_leaves_the_active_session_alone() {
        let _guard = singleton_test_guard();
        let f = fixture();

        let first = f.coordinator.request_trace();
        let artifact = tempfile::NamedTempFile::new().expect("temp file");
        std::fs::write(artifact.path(), b"first session").expect("write");
        assert!(f.recorder.complete_flush(artifact.path().to_path_buf()));
        f.queue.run_until_idle();

        let second = f.coordinator.request_trace();
        assert_ne!(first, second);

        f.coordinator.discard_trace_data(first);
        assert_eq!(f.coordinator.active_session(), Some(second));
        assert_eq!(
            f.coordinator.get_trace_data(first, |_| {}).err(),
            Some(TraceDataError::NotFound)
        );
    }

    #[test]
    fn debug_format_reports_state() {
        let _guard = singleton_test_guard();
        let f = fixture();
        let dbg = format!("{:?}", f.coordinator);
        assert!(dbg.contains("TraceSessionCoordinator"), "{dbg}");
        assert!(dbg.contains("stored"), "{dbg}");
    }
}
