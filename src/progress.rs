//! Collaborator traits through which the worker reports to the outside.
//!
//! The batch worker runs on its own Tokio task; the presentation layer must
//! never block on it. These traits are the one-directional channel outward:
//! the pipeline pushes progress and log lines, the host forwards them into
//! its own context (a UI event loop, a broadcast channel, a terminal).
//!
//! # Why callbacks instead of channels?
//!
//! A trait object is the least-invasive integration point: callers can
//! forward events wherever they like without the library knowing how the
//! host application communicates. Both traits are `Send + Sync` because
//! they are invoked from the spawned worker task.

use crate::error::NotifyError;
use std::sync::Arc;

/// Receives progress and log events from the running batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Calls originate from the worker task; impls must
/// marshal into their own context (the library never blocks on them).
pub trait ProgressSink: Send + Sync {
    /// Overall batch progress.
    ///
    /// # Arguments
    /// * `percent` — 0.0–100.0, monotonic per completed document
    /// * `message` — current status line, e.g. "Processing report..."
    fn on_progress(&self, percent: f32, message: &str) {
        let _ = (percent, message);
    }

    /// One appended log line. Lines arrive in processing order.
    fn on_log(&self, line: &str) {
        let _ = line;
    }
}

/// Optional platform notification hooks fired at run boundaries.
///
/// Failures here are logged by the orchestrator and never fail the run.
pub trait NotificationSink: Send + Sync {
    /// The run has started.
    fn notify_start(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    /// A progress update worth surfacing outside the app.
    fn notify_update(&self, message: &str) -> Result<(), NotifyError> {
        let _ = message;
        Ok(())
    }

    /// The run has finished (completed, stopped, or aborted).
    fn notify_stop(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A no-op sink for callers that don't need progress events.
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {}

/// A no-op notification sink; the default on platforms without notifications.
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {}

/// Convenience alias matching the type the orchestrator stores.
pub type SharedProgressSink = Arc<dyn ProgressSink>;

/// Fans one user-visible log line out to every consumer: the tracing
/// subscriber, the [`RunState`](crate::state::RunState) log buffer, and the
/// host's [`ProgressSink`].
///
/// Every component of the pipeline logs through this so the three views
/// never disagree about what happened or in which order.
#[derive(Clone)]
pub struct RunLogger {
    state: crate::state::RunState,
    sink: SharedProgressSink,
}

impl RunLogger {
    pub fn new(state: crate::state::RunState, sink: SharedProgressSink) -> Self {
        Self { state, sink }
    }

    /// Routine progress line.
    pub fn info(&self, line: &str) {
        tracing::info!("{line}");
        self.state.push_log(line);
        self.sink.on_log(line);
    }

    /// Something went wrong but the run continues.
    pub fn warn(&self, line: &str) {
        tracing::warn!("{line}");
        self.state.push_log(line);
        self.sink.on_log(line);
    }

    /// Progress update: recorded in the state snapshot and forwarded to the
    /// sink.
    pub fn progress(&self, percent: f32, message: &str) {
        self.state.set_progress(percent, message);
        self.sink.on_progress(percent, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        progress_calls: AtomicUsize,
        lines: Mutex<Vec<String>>,
    }

    impl ProgressSink for Recorder {
        fn on_progress(&self, _percent: f32, _message: &str) {
            self.progress_calls.fetch_add(1, Ordering::SeqCst);
        }

        fn on_log(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    #[test]
    fn noop_sinks_do_not_panic() {
        let p = NoopProgressSink;
        p.on_progress(50.0, "halfway");
        p.on_log("a line");

        let n = NoopNotificationSink;
        n.notify_start().unwrap();
        n.notify_update("working").unwrap();
        n.notify_stop().unwrap();
    }

    #[test]
    fn recorder_receives_events_in_order() {
        let r = Recorder {
            progress_calls: AtomicUsize::new(0),
            lines: Mutex::new(vec![]),
        };
        r.on_progress(0.0, "start");
        r.on_log("first");
        r.on_log("second");
        r.on_progress(100.0, "done");

        assert_eq!(r.progress_calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            *r.lines.lock().unwrap(),
            vec!["first".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn arc_dyn_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedProgressSink>();

        let sink: SharedProgressSink = Arc::new(NoopProgressSink);
        sink.on_log("via trait object");
    }
}
