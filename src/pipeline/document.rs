//! The single-document pipeline: convert → upload → extract → save → clean.
//!
//! Each document advances through its states strictly in order, and every
//! failure path is contained here — the orchestrator's loop only learns the
//! outcome, never an error it must unwind from. Progress maps document `i`
//! of `n` onto the slice `[(i-1)/n, i/n] * 100`: conversion pins the slice
//! start, the extraction request sits at 20 % of the slice width, and
//! completion closes the slice.
//!
//! The image working directory is removed on every exit path. A document
//! either contributes a CSV to the output folder or leaves no trace.

use crate::config::BatchConfig;
use crate::pipeline::extract::{extract_tables, ExtractOutcome};
use crate::pipeline::render::DocumentConverter;
use crate::pipeline::sanitize;
use crate::progress::RunLogger;
use crate::prompts::EXTRACTION_PROMPT;
use crate::retry::RetryGovernor;
use crate::session::ExtractionBackend;
use crate::state::RunState;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything the per-document pipeline needs, bundled once per run.
pub struct PipelineContext {
    pub config: BatchConfig,
    pub backend: Arc<dyn ExtractionBackend>,
    pub converter: Arc<dyn DocumentConverter>,
    pub governor: RetryGovernor,
    pub log: RunLogger,
    pub state: RunState,
}

/// One document's derived paths, created when processing starts.
pub struct DocumentTask {
    pub pdf_path: PathBuf,
    pub stem: String,
    /// Working directory for the page images, `<stem>_images` under the
    /// output folder.
    pub image_dir: PathBuf,
    /// Where the extracted CSV lands, `<stem>.csv` under the output folder.
    pub csv_path: PathBuf,
}

impl DocumentTask {
    pub fn new(pdf_path: &Path, output_dir: &Path) -> Self {
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Self {
            pdf_path: pdf_path.to_path_buf(),
            image_dir: output_dir.join(format!("{stem}_images")),
            csv_path: output_dir.join(format!("{stem}.csv")),
            stem,
        }
    }

    /// Remove the image working directory. Errors are logged only; a
    /// leftover folder never fails the document.
    async fn remove_image_dir(&self, log: &RunLogger) {
        match tokio::fs::remove_dir_all(&self.image_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log.warn(&format!(
                "Could not remove image folder '{}': {e}",
                self.image_dir.display()
            )),
        }
    }
}

/// Terminal state of one document's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// The CSV was written and the working directory removed.
    Completed,
    /// The stop flag was observed mid-document; no CSV was written and no
    /// error was raised.
    Cancelled,
    /// The document failed; the cause was logged. The batch continues.
    Failed,
}

/// Drive one document through the full pipeline.
///
/// `index` is 1-based; `total` is the batch size. All errors are contained
/// and logged here.
pub async fn process_document(
    ctx: &PipelineContext,
    pdf_path: &Path,
    index: usize,
    total: usize,
) -> DocumentOutcome {
    let task = DocumentTask::new(pdf_path, &ctx.config.output_dir);
    let slice_start = (index - 1) as f32 / total as f32 * 100.0;
    let slice_width = 100.0 / total as f32;

    // ── Converting ───────────────────────────────────────────────────────
    ctx.log.info(&format!(
        "({index}/{total}) Converting {}.pdf to images...",
        task.stem
    ));
    ctx.log
        .progress(slice_start, &format!("Processing {}...", task.stem));

    let image_paths = match ctx
        .converter
        .convert(pdf_path, ctx.config.dpi, &task.image_dir)
        .await
    {
        Ok(paths) => paths,
        Err(e) => {
            ctx.log.warn(&format!("[ERROR] {e}"));
            task.remove_image_dir(&ctx.log).await;
            return DocumentOutcome::Failed;
        }
    };
    ctx.log
        .info(&format!("Converted {} pages to images.", image_paths.len()));

    // ── Uploading / Extracting ───────────────────────────────────────────
    ctx.log.info("Sending images to AI for data extraction...");
    ctx.log.progress(
        slice_start + slice_width * 0.2,
        &format!("Extracting data from {}...", task.stem),
    );

    let prompt = ctx
        .config
        .extraction_prompt
        .as_deref()
        .unwrap_or(EXTRACTION_PROMPT);

    let outcome = extract_tables(
        ctx.backend.as_ref(),
        &ctx.governor,
        &ctx.log,
        &ctx.state,
        prompt,
        &image_paths,
    )
    .await;

    let text = match outcome {
        Ok(ExtractOutcome::Extracted(text)) => text,
        Ok(ExtractOutcome::Cancelled) => {
            task.remove_image_dir(&ctx.log).await;
            return DocumentOutcome::Cancelled;
        }
        Err(e) => {
            ctx.log
                .warn(&format!("[ERROR] {e} ({}.pdf)", task.stem));
            task.remove_image_dir(&ctx.log).await;
            return DocumentOutcome::Failed;
        }
    };

    // ── Saving ───────────────────────────────────────────────────────────
    let csv = sanitize::clean_csv(&text);
    if let Err(e) = tokio::fs::write(&task.csv_path, &csv).await {
        ctx.log.warn(&format!(
            "[ERROR] Failed to save CSV file '{}': {e}",
            task.csv_path.display()
        ));
        task.remove_image_dir(&ctx.log).await;
        return DocumentOutcome::Failed;
    }
    ctx.log
        .info(&format!("Successfully saved data to {}.csv", task.stem));

    // ── Cleaning ─────────────────────────────────────────────────────────
    task.remove_image_dir(&ctx.log).await;
    ctx.log.progress(
        index as f32 / total as f32 * 100.0,
        &format!("Completed {}", task.stem),
    );

    DocumentOutcome::Completed
}
