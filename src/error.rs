//! Error types for the pdf2sheet library.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`RemoteError`] — a single remote call failed. The variant carries the
//!   retry decision as data: [`RemoteError::RateLimited`] is retried by the
//!   [`crate::retry::RetryGovernor`] with backoff, [`RemoteError::Fatal`]
//!   propagates immediately. Classification happens once, at construction
//!   (HTTP status code first, substring match on the body only as fallback),
//!   so the retry loop never inspects error strings.
//!
//! * [`DocumentError`] — **Non-fatal**: one document failed (corrupt PDF,
//!   uploads exhausted, save I/O error) but the batch continues. Contained
//!   at the single-document pipeline boundary and never unwinds the
//!   orchestrator's loop.
//!
//! * [`BatchError`] — **Fatal**: the run cannot start at all (no credential,
//!   client initialisation failed). Aborts before any document is touched.

use std::path::PathBuf;
use thiserror::Error;

/// Outcome classification for one remote call.
///
/// The tagged variants make the retryable/fatal distinction an explicit data
/// contract between [`crate::session`] and [`crate::retry`].
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The service signalled a request-quota condition (HTTP 429 or a
    /// rate-limit marker in the response body). Transient; retried with
    /// backoff.
    #[error("rate limit exceeded: {reason}")]
    RateLimited { reason: String },

    /// Any other remote failure (auth, malformed request, transport).
    /// Propagates immediately; fails the current document only.
    #[error("remote call failed: {reason}")]
    Fatal { reason: String },
}

impl RemoteError {
    /// True when the governor should sleep and retry this error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RemoteError::RateLimited { .. })
    }
}

/// A per-document failure. Logged, the document is marked failed, and the
/// batch moves on to the next document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The PDF could not be rasterised (corrupt file, unsupported format).
    #[error("could not convert PDF '{path}': {detail}")]
    Conversion { path: PathBuf, detail: String },

    /// At least one page image could not be uploaded after all retries.
    #[error("file uploading failed after multiple retries")]
    UploadFailed,

    /// The extraction request failed fatally at the remote side.
    #[error("extraction failed: {detail}")]
    Extraction { detail: String },

    /// Retries were exhausted or the response carried no usable text.
    #[error("no valid response from the model")]
    NoResponse,

    /// The extracted CSV could not be written to disk.
    #[error("failed to save CSV file '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A failure that aborts the entire run before any document is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    /// No API key is configured. The user must fill in settings first.
    #[error("API key is not configured. Please set it in Settings.")]
    CredentialMissing,

    /// The remote client could not be constructed.
    #[error("failed to initialise the extraction client: {detail}")]
    ClientInit { detail: String },

    /// The output folder could not be created.
    #[error("could not create output folder '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Failure of the optional notification collaborator. Always logged, never
/// fatal to the run.
#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_retryable() {
        let e = RemoteError::RateLimited {
            reason: "429 Too Many Requests".into(),
        };
        assert!(e.is_rate_limited());
        assert!(e.to_string().contains("429"));
    }

    #[test]
    fn fatal_is_not_retryable() {
        let e = RemoteError::Fatal {
            reason: "401 Unauthorized".into(),
        };
        assert!(!e.is_rate_limited());
    }

    #[test]
    fn conversion_display_names_file() {
        let e = DocumentError::Conversion {
            path: PathBuf::from("/docs/report.pdf"),
            detail: "bad xref table".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("report.pdf"), "got: {msg}");
        assert!(msg.contains("bad xref"), "got: {msg}");
    }

    #[test]
    fn output_dir_display_names_folder() {
        let e = BatchError::OutputDir {
            path: PathBuf::from("/data/out"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = e.to_string();
        assert!(msg.contains("/data/out"), "got: {msg}");
    }

    #[test]
    fn credential_missing_mentions_settings() {
        assert!(BatchError::CredentialMissing.to_string().contains("Settings"));
    }
}
