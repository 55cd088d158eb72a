//! # pdf2sheet
//!
//! Batch extraction of tabular data from PDFs into CSV spreadsheets, using a
//! vision language model.
//!
//! Each PDF is rasterised page-by-page to JPEG, the page images are uploaded
//! to the extraction service, a single model request per document returns
//! the tables as CSV text, and the per-document CSVs are finally merged into
//! one `combined_output.csv`. Rate limits are absorbed with exponential
//! backoff, and a cooperative stop flag lets a host cancel the batch at the
//! next document or upload boundary.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2sheet::{BatchConfig, BatchRunner};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from GEMINI_API_KEY by default
//!     let config = BatchConfig::builder()
//!         .output_dir("/data/statements")
//!         .dpi(300)
//!         .build()?;
//!
//!     let runner = BatchRunner::new(config);
//!     let handle = runner.start(vec![
//!         PathBuf::from("/data/statements/january.pdf"),
//!         PathBuf::from("/data/statements/february.pdf"),
//!     ]);
//!
//!     handle.wait().await;
//!     println!("{}", handle.snapshot().message);
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDFs
//!  │
//!  ├─ 1. Render     rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Extract    upload JPEGs, one model request per document, delete
//!  ├─ 3. Sanitize   strip code fences, normalise line endings
//!  ├─ 4. Save       <stem>.csv per document, image folder removed
//!  └─ 5. Aggregate  column-union merge into combined_output.csv
//! ```
//!
//! The worker runs on one background task ([`BatchRunner::start`]); hosts
//! observe it through [`RunState`] snapshots and the [`ProgressSink`] /
//! [`NotificationSink`] callbacks, and cancel it cooperatively through
//! [`RunHandle::request_stop`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod retry;
pub mod run;
pub mod session;
pub mod state;

pub use config::{BatchConfig, BatchConfigBuilder, DEFAULT_API_BASE};
pub use error::{BatchError, DocumentError, NotifyError, RemoteError};
pub use pipeline::render::{DocumentConverter, PdfiumConverter};
pub use progress::{
    NoopNotificationSink, NoopProgressSink, NotificationSink, ProgressSink, SharedProgressSink,
};
pub use run::{BatchRunner, CredentialStore, EnvCredentialStore, RunHandle};
pub use session::{ExtractionBackend, GeminiSession, UploadedArtifact};
pub use state::{RunSnapshot, RunState};
