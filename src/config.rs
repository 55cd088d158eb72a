//! Configuration types for batch table extraction.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share the config with the worker task and to diff two runs when their
//! outputs differ.
//!
//! # Design choice: builder over constructor
//! A ten-field constructor breaks on every new field. The builder lets
//! callers set only what they care about and rely on documented defaults.

use crate::error::BatchError;
use std::path::PathBuf;
use std::time::Duration;

/// Default Gemini REST endpoint. Overridable for tests and proxies.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Configuration for one batch run.
///
/// Built via [`BatchConfig::builder()`].
///
/// # Example
/// ```rust
/// use pdf2sheet::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .output_dir("/tmp/pdf2sheet")
///     .dpi(300)
///     .model("gemini-1.5-pro")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Folder that holds the source PDFs and receives the per-document CSVs,
    /// the per-document image working directories, and the final
    /// `combined_output.csv`. Required; created if absent.
    pub output_dir: PathBuf,

    /// Rendering DPI used when rasterising each PDF page. Range: 72–600.
    /// Default: 300.
    ///
    /// Table extraction needs more pixel density than prose transcription:
    /// at 150 DPI thin rules and small digits blur together and the model
    /// misreads adjacent columns. 300 DPI keeps cell boundaries crisp while
    /// JPEG pages stay under typical upload limits.
    pub dpi: u32,

    /// JPEG quality for rendered page images. Range: 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Model identifier sent with every extraction request.
    /// Default: "gemini-1.5-pro".
    pub model: String,

    /// Maximum invocations of one remote call before the governor gives up.
    /// Default: 3.
    pub max_attempts: u32,

    /// Initial backoff delay after a rate-limit failure. Default: 3 s.
    ///
    /// Grows by [`BatchConfig::backoff_growth`] after every attempt:
    /// 3 s → 4.5 s → 6.75 s. The slow start matches quota windows measured
    /// in requests-per-minute rather than per-second bursts.
    pub retry_base_delay: Duration,

    /// Multiplier applied to the backoff delay after each failed attempt.
    /// Default: 1.5.
    pub backoff_growth: f64,

    /// Per-request timeout for uploads, extraction calls, and deletions.
    /// Default: 120 s. Extraction requests carry every page of a document,
    /// so this is deliberately generous.
    pub request_timeout: Duration,

    /// Base URL of the extraction service. Default: [`DEFAULT_API_BASE`].
    /// Tests point this at a local stub server.
    pub api_base: String,

    /// Custom extraction prompt. If None, uses
    /// [`crate::prompts::EXTRACTION_PROMPT`].
    pub extraction_prompt: Option<String>,
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug, Default)]
pub struct BatchConfigBuilder {
    output_dir: Option<PathBuf>,
    dpi: Option<u32>,
    jpeg_quality: Option<u8>,
    model: Option<String>,
    max_attempts: Option<u32>,
    retry_base_delay: Option<Duration>,
    backoff_growth: Option<f64>,
    request_timeout: Option<Duration>,
    api_base: Option<String>,
    extraction_prompt: Option<String>,
}

impl BatchConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.dpi = Some(dpi.clamp(72, 600));
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.jpeg_quality = Some(q.clamp(1, 100));
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = Some(n.max(1));
        self
    }

    pub fn retry_base_delay(mut self, d: Duration) -> Self {
        self.retry_base_delay = Some(d);
        self
    }

    pub fn backoff_growth(mut self, g: f64) -> Self {
        self.backoff_growth = Some(g.max(1.0));
        self
    }

    pub fn request_timeout(mut self, d: Duration) -> Self {
        self.request_timeout = Some(d);
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extraction_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let output_dir = self
            .output_dir
            .ok_or_else(|| BatchError::InvalidConfig("output_dir is required".into()))?;

        let model = self.model.unwrap_or_else(|| "gemini-1.5-pro".to_string());
        if model.is_empty() {
            return Err(BatchError::InvalidConfig("model must not be empty".into()));
        }

        Ok(BatchConfig {
            output_dir,
            dpi: self.dpi.unwrap_or(300),
            jpeg_quality: self.jpeg_quality.unwrap_or(90),
            model,
            max_attempts: self.max_attempts.unwrap_or(3),
            retry_base_delay: self.retry_base_delay.unwrap_or(Duration::from_secs(3)),
            backoff_growth: self.backoff_growth.unwrap_or(1.5),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(120)),
            api_base: self.api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            extraction_prompt: self.extraction_prompt,
        })
    }
}
