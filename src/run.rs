//! Batch orchestration: one worker task drives every document in order.
//!
//! [`BatchRunner`] owns the collaborators (credential store, converter,
//! extraction backend, progress and notification sinks) and the shared
//! [`RunState`]. [`BatchRunner::start`] spawns a single worker task that
//! processes the documents sequentially; the caller keeps a [`RunHandle`] to
//! observe progress, request a cooperative stop, or await completion.
//!
//! Sequential on purpose: the extraction service meters requests per minute,
//! so concurrent documents would only trade throughput for rate-limit
//! churn. One document in flight keeps the retry governor's view of the
//! quota accurate.

use crate::aggregate;
use crate::config::BatchConfig;
use crate::error::BatchError;
use crate::pipeline::document::{process_document, DocumentOutcome, PipelineContext};
use crate::pipeline::render::{DocumentConverter, PdfiumConverter};
use crate::progress::{
    NoopNotificationSink, NoopProgressSink, NotificationSink, RunLogger, SharedProgressSink,
};
use crate::retry::RetryGovernor;
use crate::session::{ExtractionBackend, GeminiSession};
use crate::state::{RunSnapshot, RunState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Source of the extraction-service credential.
///
/// A trait so hosts can plug in their own settings storage; the default
/// reads the `GEMINI_API_KEY` environment variable.
pub trait CredentialStore: Send + Sync {
    /// The API key, or `None` when not configured. Whitespace-only values
    /// count as not configured.
    fn api_key(&self) -> Option<String>;
}

/// Reads the credential from the `GEMINI_API_KEY` environment variable.
pub struct EnvCredentialStore;

impl CredentialStore for EnvCredentialStore {
    fn api_key(&self) -> Option<String> {
        std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

/// Configures and launches batch runs.
pub struct BatchRunner {
    config: BatchConfig,
    credentials: Arc<dyn CredentialStore>,
    converter: Arc<dyn DocumentConverter>,
    /// When set, used instead of building a [`GeminiSession`]; the override
    /// carries its own authentication, so the credential check is skipped.
    backend: Option<Arc<dyn ExtractionBackend>>,
    progress: SharedProgressSink,
    notifier: Arc<dyn NotificationSink>,
    state: RunState,
}

impl BatchRunner {
    /// A runner with production defaults: pdfium rendering, the Gemini
    /// backend, credentials from the environment, and no-op sinks.
    pub fn new(config: BatchConfig) -> Self {
        let converter = Arc::new(PdfiumConverter::new(config.jpeg_quality));
        Self {
            config,
            credentials: Arc::new(EnvCredentialStore),
            converter,
            backend: None,
            progress: Arc::new(NoopProgressSink),
            notifier: Arc::new(NoopNotificationSink),
            state: RunState::new(),
        }
    }

    pub fn with_credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    pub fn with_converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.converter = converter;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn ExtractionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_progress_sink(mut self, sink: SharedProgressSink) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// The shared run state. Valid before, during, and after a run; hosts
    /// typically poll [`RunState::snapshot`] from their render loop.
    pub fn state(&self) -> RunState {
        self.state.clone()
    }

    /// Launch the batch on a background task and return a handle to it.
    ///
    /// If a run is already in progress the call logs a warning and the
    /// returned handle completes immediately without touching any document.
    pub fn start(&self, documents: Vec<PathBuf>) -> RunHandle {
        let log = RunLogger::new(self.state.clone(), Arc::clone(&self.progress));

        if self.state.is_running() {
            log.warn("A run is already in progress.");
            return RunHandle {
                state: self.state.clone(),
                join: tokio::spawn(async {}),
            };
        }

        let config = self.config.clone();
        let credentials = Arc::clone(&self.credentials);
        let converter = Arc::clone(&self.converter);
        let backend = self.backend.clone();
        let notifier = Arc::clone(&self.notifier);
        let state = self.state.clone();

        let join = tokio::spawn(async move {
            run_batch(
                config,
                credentials,
                converter,
                backend,
                notifier,
                state,
                log,
                documents,
            )
            .await;
        });

        RunHandle {
            state: self.state.clone(),
            join,
        }
    }
}

/// Observer handle for one launched run.
pub struct RunHandle {
    state: RunState,
    join: JoinHandle<()>,
}

impl RunHandle {
    /// Ask the worker to stop at the next document or upload boundary.
    pub fn request_stop(&self) {
        self.state.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.state.snapshot()
    }

    /// Wait for the worker task to finish.
    pub async fn wait(self) {
        // The worker contains all errors; a join failure can only mean the
        // task panicked, which the state already reflects as not running.
        let _ = self.join.await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_batch(
    config: BatchConfig,
    credentials: Arc<dyn CredentialStore>,
    converter: Arc<dyn DocumentConverter>,
    backend: Option<Arc<dyn ExtractionBackend>>,
    notifier: Arc<dyn NotificationSink>,
    state: RunState,
    log: RunLogger,
    documents: Vec<PathBuf>,
) {
    state.begin();

    if let Err(e) = notifier.notify_start() {
        log.warn(&format!("Could not send notification: {e}"));
    }

    match prepare(&config, &credentials, &converter, backend, &state, &log).await {
        Ok(ctx) => execute(&ctx, &notifier, &documents).await,
        Err(e) => {
            // An abort is not a user stop; the terminal status names the
            // cause so observers can tell the two apart.
            log.warn(&format!("[ERROR] {e}"));
            log.progress(0.0, &format!("Error: {e}"));
        }
    }

    if let Err(e) = notifier.notify_stop() {
        log.warn(&format!("Could not send notification: {e}"));
    }
    state.finish();
}

/// Resolve the credential, build the backend, and create the output folder.
/// Any failure here aborts the run before the first document.
async fn prepare(
    config: &BatchConfig,
    credentials: &Arc<dyn CredentialStore>,
    converter: &Arc<dyn DocumentConverter>,
    backend: Option<Arc<dyn ExtractionBackend>>,
    state: &RunState,
    log: &RunLogger,
) -> Result<PipelineContext, BatchError> {
    let backend: Arc<dyn ExtractionBackend> = match backend {
        Some(b) => b,
        None => {
            let key = credentials
                .api_key()
                .ok_or(BatchError::CredentialMissing)?;
            Arc::new(GeminiSession::new(&key, config)?)
        }
    };

    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| BatchError::OutputDir {
            path: config.output_dir.clone(),
            source,
        })?;

    let governor = RetryGovernor::new(config, log.clone());
    Ok(PipelineContext {
        config: config.clone(),
        backend,
        converter: Arc::clone(converter),
        governor,
        log: log.clone(),
        state: state.clone(),
    })
}

/// The document loop plus the final aggregation step.
async fn execute(ctx: &PipelineContext, notifier: &Arc<dyn NotificationSink>, documents: &[PathBuf]) {
    let total = documents.len();
    let mut stopped = false;

    for (i, path) in documents.iter().enumerate() {
        if ctx.state.stop_requested() {
            ctx.log.info("Processing stopped by user.");
            stopped = true;
            break;
        }

        match process_document(ctx, path, i + 1, total).await {
            DocumentOutcome::Completed => {
                let snapshot = ctx.state.snapshot();
                if let Err(e) = notifier.notify_update(&snapshot.message) {
                    ctx.log.warn(&format!("Could not send notification: {e}"));
                }
            }
            DocumentOutcome::Cancelled => {
                ctx.log.info("Processing stopped by user.");
                stopped = true;
                break;
            }
            // Failure is contained per document; the batch continues.
            DocumentOutcome::Failed => {}
        }
    }

    if stopped {
        ctx.log.progress(0.0, "Stopped");
        return;
    }

    ctx.log.info("All files processed. Combining results...");
    match aggregate::combine(&ctx.config.output_dir, &ctx.log) {
        Ok(Some(report)) => aggregate::remove_sources(&report, &ctx.log),
        Ok(None) => {}
        Err(e) => ctx
            .log
            .warn(&format!("[ERROR] Failed to combine CSV files: {e}")),
    }

    ctx.log.info("All tasks finished successfully.");
    ctx.log.progress(100.0, "Completed!");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoCredentials;

    impl CredentialStore for NoCredentials {
        fn api_key(&self) -> Option<String> {
            None
        }
    }

    struct FixedCredentials;

    impl CredentialStore for FixedCredentials {
        fn api_key(&self) -> Option<String> {
            Some("test-key".into())
        }
    }

    struct BlankCredentials;

    impl CredentialStore for BlankCredentials {
        fn api_key(&self) -> Option<String> {
            Some("   ".into())
        }
    }

    fn runner(output_dir: &std::path::Path) -> BatchRunner {
        let config = BatchConfig::builder().output_dir(output_dir).build().unwrap();
        BatchRunner::new(config)
    }

    #[tokio::test]
    async fn missing_credential_aborts_before_any_document() {
        let dir = TempDir::new().unwrap();
        let runner = runner(dir.path()).with_credentials(Arc::new(NoCredentials));

        let handle = runner.start(vec![PathBuf::from("/in/doc.pdf")]);
        handle.wait().await;

        let snap = runner.state().snapshot();
        assert!(snap
            .log
            .iter()
            .any(|l| l.contains("API key is not configured")));
        // The terminal status names the abort cause; "Stopped" is reserved
        // for user cancellation.
        assert!(
            snap.message.starts_with("Error:"),
            "got: {}",
            snap.message
        );
        assert!(snap.message.contains("API key is not configured"));
        assert_ne!(snap.message, "Stopped");
        assert!(!runner.state().is_running(), "running flag must be cleared");
        // No document was touched, so nothing was written.
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn unwritable_output_folder_aborts_with_its_own_status() {
        let dir = TempDir::new().unwrap();
        // A file where the output folder should be makes create_dir_all fail.
        let blocked = dir.path().join("occupied");
        std::fs::write(&blocked, b"not a folder").unwrap();

        let config = BatchConfig::builder().output_dir(&blocked).build().unwrap();
        let runner = BatchRunner::new(config)
            .with_credentials(Arc::new(FixedCredentials));

        let handle = runner.start(vec![PathBuf::from("/in/doc.pdf")]);
        handle.wait().await;

        let snap = runner.state().snapshot();
        assert!(snap.message.starts_with("Error:"), "got: {}", snap.message);
        assert!(snap.message.contains("could not create output folder"));
        assert_eq!(snap.percent, 0.0);
        assert!(!runner.state().is_running());
    }

    #[tokio::test]
    async fn whitespace_key_filtering_is_the_stores_concern() {
        let dir = TempDir::new().unwrap();
        let runner = runner(dir.path()).with_credentials(Arc::new(BlankCredentials));

        // EnvCredentialStore filters blank values; a custom store returning
        // whitespace reaches the session, so the orchestrator treats any
        // present key as usable. This documents the boundary: filtering is
        // the store's job.
        let handle = runner.start(vec![]);
        handle.wait().await;

        let snap = runner.state().snapshot();
        assert!(snap.log.iter().any(|l| l.contains("Combining results")));
    }

    #[tokio::test]
    async fn second_start_while_running_is_rejected() {
        let dir = TempDir::new().unwrap();
        let runner = runner(dir.path());

        runner.state().begin();
        let handle = runner.start(vec![PathBuf::from("/in/doc.pdf")]);
        handle.wait().await;

        let snap = runner.state().snapshot();
        assert!(snap
            .log
            .iter()
            .any(|l| l.contains("already in progress")));
        assert!(
            !snap.log.iter().any(|l| l.contains("Converting")),
            "no document may be processed by the rejected start"
        );
    }
}
