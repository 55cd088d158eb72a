//! Shared run state observed by the presentation layer.
//!
//! [`RunState`] is the only mutable state shared across execution contexts.
//! The worker task writes progress, status, and log lines; the presentation
//! layer reads point-in-time [`RunSnapshot`]s and may write exactly one
//! field: the cooperative stop flag. Both flags are atomics; the snapshot
//! sits behind a `std::sync::Mutex` because every critical section is a
//! handful of field writes, never I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Point-in-time view of a run, cheap to clone out to observers.
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    /// Overall progress, 0.0–100.0.
    pub percent: f32,
    /// Current status line.
    pub message: String,
    /// Append-only log, in processing order.
    pub log: Vec<String>,
}

impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            percent: 0.0,
            message: "Waiting to start".to_string(),
            log: Vec::new(),
        }
    }
}

struct StateInner {
    running: AtomicBool,
    stop: AtomicBool,
    snap: Mutex<RunSnapshot>,
}

/// Handle on the mutable state of one run. Clones share the same state.
#[derive(Clone)]
pub struct RunState {
    inner: Arc<StateInner>,
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl RunState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StateInner {
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                snap: Mutex::new(RunSnapshot::default()),
            }),
        }
    }

    /// Mark the run active. Called once by the orchestrator before the first
    /// document.
    pub(crate) fn begin(&self) {
        self.inner.stop.store(false, Ordering::SeqCst);
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// Clear the active flag. Returns true only for the call that actually
    /// performed the transition, so "running becomes false exactly once per
    /// run" holds even if a cleanup path runs twice.
    pub(crate) fn finish(&self) -> bool {
        self.inner.running.swap(false, Ordering::SeqCst)
    }

    /// Whether the worker is still processing.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Cooperative cancellation signal. Takes effect at the next checked
    /// boundary: before the next document, or before the next image upload.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    pub(crate) fn set_progress(&self, percent: f32, message: &str) {
        let mut snap = self.inner.snap.lock().unwrap();
        snap.percent = percent;
        snap.message = message.to_string();
    }

    pub(crate) fn push_log(&self, line: &str) {
        self.inner.snap.lock().unwrap().log.push(line.to_string());
    }

    /// Clone out the current progress, status, and log.
    pub fn snapshot(&self) -> RunSnapshot {
        self.inner.snap.lock().unwrap().clone()
    }
}
