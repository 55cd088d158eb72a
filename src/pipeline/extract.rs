//! The extraction client: upload page images, issue one extraction request,
//! always delete the uploads.
//!
//! Remote-side storage consumption is bounded to the active run: every
//! uploaded artifact is deleted before this function returns, whether
//! extraction succeeded, failed, or was cancelled mid-upload. The stop flag
//! is checked before each upload so cancellation never commits the pipeline
//! to more remote work than one in-flight call.

use crate::error::DocumentError;
use crate::progress::RunLogger;
use crate::retry::RetryGovernor;
use crate::session::{ExtractionBackend, UploadedArtifact};
use crate::state::RunState;
use std::path::PathBuf;

/// How one document's extraction ended, short of an error.
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Raw response text, trimmed of surrounding whitespace.
    Extracted(String),
    /// The stop flag was observed; the document is left incomplete. Not an
    /// error — the orchestrator reports a distinct "stopped" status.
    Cancelled,
}

/// Run the upload → extract → delete cycle for one document's page images.
pub async fn extract_tables(
    backend: &dyn ExtractionBackend,
    governor: &RetryGovernor,
    log: &RunLogger,
    state: &RunState,
    prompt: &str,
    image_paths: &[PathBuf],
) -> Result<ExtractOutcome, DocumentError> {
    let mut uploaded: Vec<UploadedArtifact> = Vec::with_capacity(image_paths.len());

    for path in image_paths {
        if state.stop_requested() {
            delete_all(backend, governor, log, &uploaded).await;
            return Ok(ExtractOutcome::Cancelled);
        }

        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        match governor
            .execute(&format!("upload {label}"), || backend.upload(path))
            .await
        {
            Ok(Some(artifact)) => uploaded.push(artifact),
            // Exhausted retries and fatal failures both abort this document
            // before the model is ever called. The governor already logged
            // the specifics.
            Ok(None) | Err(_) => {
                delete_all(backend, governor, log, &uploaded).await;
                return Err(DocumentError::UploadFailed);
            }
        }
    }

    if state.stop_requested() {
        delete_all(backend, governor, log, &uploaded).await;
        return Ok(ExtractOutcome::Cancelled);
    }

    let result = governor
        .execute("extraction request", || backend.generate(prompt, &uploaded))
        .await;

    // Deletion happens before the result is inspected so no artifact
    // survives an extraction failure.
    delete_all(backend, governor, log, &uploaded).await;

    match result {
        Ok(Some(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                Err(DocumentError::NoResponse)
            } else {
                Ok(ExtractOutcome::Extracted(trimmed.to_string()))
            }
        }
        Ok(None) => Err(DocumentError::NoResponse),
        Err(e) => Err(DocumentError::Extraction {
            detail: e.to_string(),
        }),
    }
}

/// Best-effort deletion of every uploaded artifact. Failures are logged,
/// never fatal.
async fn delete_all(
    backend: &dyn ExtractionBackend,
    governor: &RetryGovernor,
    log: &RunLogger,
    artifacts: &[UploadedArtifact],
) {
    for artifact in artifacts {
        let outcome = governor
            .execute(&format!("delete {}", artifact.name), || {
                backend.delete(artifact)
            })
            .await;
        match outcome {
            Ok(Some(())) => {}
            Ok(None) => log.warn(&format!(
                "Could not delete remote file {} (retries exhausted).",
                artifact.name
            )),
            Err(e) => log.warn(&format!(
                "Could not delete remote file {}: {e}",
                artifact.name
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::error::RemoteError;
    use crate::progress::NoopProgressSink;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Backend that succeeds uploads/deletes and returns a fixed response,
    /// with counters for lifecycle assertions.
    struct CountingBackend {
        uploads: AtomicUsize,
        deletes: AtomicUsize,
        generate_response: Result<String, RemoteError>,
    }

    impl CountingBackend {
        fn new(generate_response: Result<String, RemoteError>) -> Self {
            Self {
                uploads: AtomicUsize::new(0),
                deletes: AtomicUsize::new(0),
                generate_response,
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for CountingBackend {
        async fn upload(&self, _path: &Path) -> Result<UploadedArtifact, RemoteError> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(UploadedArtifact {
                name: format!("files/{n}"),
                uri: format!("https://example.invalid/files/{n}"),
                mime_type: "image/jpeg".into(),
            })
        }

        async fn generate(
            &self,
            _prompt: &str,
            _artifacts: &[UploadedArtifact],
        ) -> Result<String, RemoteError> {
            self.generate_response.clone()
        }

        async fn delete(&self, _artifact: &UploadedArtifact) -> Result<(), RemoteError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fixture() -> (RetryGovernor, RunLogger, RunState) {
        let state = RunState::new();
        let log = RunLogger::new(state.clone(), Arc::new(NoopProgressSink));
        let config = BatchConfig::builder()
            .output_dir("/tmp/unused")
            .retry_base_delay(Duration::from_millis(1))
            .build()
            .unwrap();
        let governor = RetryGovernor::new(&config, log.clone());
        (governor, log, state)
    }

    fn pages(n: usize) -> Vec<PathBuf> {
        (1..=n)
            .map(|i| PathBuf::from(format!("/tmp/doc_images/page_{i:04}.jpg")))
            .collect()
    }

    #[tokio::test]
    async fn success_uploads_extracts_and_deletes_everything() {
        let (governor, log, state) = fixture();
        let backend = CountingBackend::new(Ok("a,b\n1,2\n".into()));

        let outcome = extract_tables(&backend, &governor, &log, &state, "extract", &pages(3))
            .await
            .unwrap();

        match outcome {
            ExtractOutcome::Extracted(text) => assert_eq!(text, "a,b\n1,2"),
            other => panic!("expected Extracted, got {other:?}"),
        }
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 3);
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn artifacts_are_deleted_even_when_extraction_fails() {
        let (governor, log, state) = fixture();
        let backend = CountingBackend::new(Err(RemoteError::Fatal {
            reason: "model refused".into(),
        }));

        let result =
            extract_tables(&backend, &governor, &log, &state, "extract", &pages(2)).await;

        assert!(matches!(result, Err(DocumentError::Extraction { .. })));
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_before_first_upload_cancels_without_uploading() {
        let (governor, log, state) = fixture();
        state.request_stop();
        let backend = CountingBackend::new(Ok("unused".into()));

        let outcome = extract_tables(&backend, &governor, &log, &state, "extract", &pages(5))
            .await
            .unwrap();

        assert!(matches!(outcome, ExtractOutcome::Cancelled));
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 0);
    }

    /// Backend that raises the stop flag while serving its first upload,
    /// simulating a user cancelling with the document partially uploaded.
    struct StoppingBackend {
        state: RunState,
        uploads: AtomicUsize,
        deletes: AtomicUsize,
    }

    #[async_trait]
    impl ExtractionBackend for StoppingBackend {
        async fn upload(&self, _path: &Path) -> Result<UploadedArtifact, RemoteError> {
            let n = self.uploads.fetch_add(1, Ordering::SeqCst);
            self.state.request_stop();
            Ok(UploadedArtifact {
                name: format!("files/{n}"),
                uri: format!("https://example.invalid/files/{n}"),
                mime_type: "image/jpeg".into(),
            })
        }

        async fn generate(
            &self,
            _prompt: &str,
            _artifacts: &[UploadedArtifact],
        ) -> Result<String, RemoteError> {
            panic!("the model must not be called after cancellation");
        }

        async fn delete(&self, _artifact: &UploadedArtifact) -> Result<(), RemoteError> {
            self.deletes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_raised_mid_upload_deletes_partial_uploads() {
        let (governor, log, state) = fixture();
        let backend = StoppingBackend {
            state: state.clone(),
            uploads: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        };

        let outcome = extract_tables(&backend, &governor, &log, &state, "extract", &pages(3))
            .await
            .unwrap();

        assert!(matches!(outcome, ExtractOutcome::Cancelled));
        // The flag was observed before the second upload; the one artifact
        // already uploaded must still be cleaned up.
        assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn whitespace_only_response_is_no_response() {
        let (governor, log, state) = fixture();
        let backend = CountingBackend::new(Ok("   \n\n  ".into()));

        let result =
            extract_tables(&backend, &governor, &log, &state, "extract", &pages(1)).await;

        assert!(matches!(result, Err(DocumentError::NoResponse)));
        assert_eq!(backend.deletes.load(Ordering::SeqCst), 1);
    }
}
