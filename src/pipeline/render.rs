//! Document conversion: rasterise every page of a PDF to JPEG files.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! blocking-pool thread so the worker task's runtime threads never stall
//! during CPU-heavy rendering.
//!
//! ## Why files instead of in-memory images?
//!
//! The extraction service consumes uploads from disk, and a multi-hundred
//! page document rendered at 300 DPI would not fit comfortably in memory.
//! Pages land in the document's working directory as `page_0001.jpg`,
//! `page_0002.jpg`, … so the returned sequence order is the page order by
//! construction.

use crate::error::DocumentError;
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::*;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Rasterises one PDF into an ordered sequence of page images.
///
/// A trait so the batch tests can run without a pdfium binary; the
/// production implementation is [`PdfiumConverter`].
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Render each page of `pdf_path` into `image_dir` (created if absent)
    /// at the given DPI. Returns the image paths in page order.
    async fn convert(
        &self,
        pdf_path: &Path,
        dpi: u32,
        image_dir: &Path,
    ) -> Result<Vec<PathBuf>, DocumentError>;
}

/// The pdfium-backed converter used in production.
pub struct PdfiumConverter {
    jpeg_quality: u8,
}

impl PdfiumConverter {
    pub fn new(jpeg_quality: u8) -> Self {
        Self { jpeg_quality }
    }
}

#[async_trait]
impl DocumentConverter for PdfiumConverter {
    async fn convert(
        &self,
        pdf_path: &Path,
        dpi: u32,
        image_dir: &Path,
    ) -> Result<Vec<PathBuf>, DocumentError> {
        let pdf = pdf_path.to_path_buf();
        let dir = image_dir.to_path_buf();
        let quality = self.jpeg_quality;

        tokio::task::spawn_blocking(move || render_blocking(&pdf, dpi, &dir, quality))
            .await
            .map_err(|e| DocumentError::Conversion {
                path: pdf_path.to_path_buf(),
                detail: format!("render task panicked: {e}"),
            })?
    }
}

/// Blocking implementation of page rendering.
fn render_blocking(
    pdf_path: &Path,
    dpi: u32,
    image_dir: &Path,
    jpeg_quality: u8,
) -> Result<Vec<PathBuf>, DocumentError> {
    std::fs::create_dir_all(image_dir).map_err(|e| DocumentError::Conversion {
        path: pdf_path.to_path_buf(),
        detail: format!("could not create '{}': {e}", image_dir.display()),
    })?;

    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| DocumentError::Conversion {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {total} pages");

    // PDF user space is 72 points per inch; scale up to the requested DPI.
    let scale = dpi as f32 / 72.0;
    let mut results = Vec::with_capacity(total);

    for (idx, page) in pages.iter().enumerate() {
        let width = (page.width().value * scale).round() as i32;
        let height = (page.height().value * scale).round() as i32;
        let render_config = PdfRenderConfig::new()
            .set_target_width(width)
            .set_maximum_height(height);

        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| DocumentError::Conversion {
                    path: pdf_path.to_path_buf(),
                    detail: format!("page {}: {e:?}", idx + 1),
                })?;
        let image = bitmap.as_image();

        let out_path = image_dir.join(format!("page_{:04}.jpg", idx + 1));
        let file = File::create(&out_path).map_err(|e| DocumentError::Conversion {
            path: pdf_path.to_path_buf(),
            detail: format!("could not write '{}': {e}", out_path.display()),
        })?;
        let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), jpeg_quality);
        encoder
            .encode_image(&image.to_rgb8())
            .map_err(|e| DocumentError::Conversion {
                path: pdf_path.to_path_buf(),
                detail: format!("JPEG encoding failed for page {}: {e}", idx + 1),
            })?;

        debug!(
            "rendered page {} → {} ({}x{} px)",
            idx + 1,
            out_path.display(),
            image.width(),
            image.height()
        );
        results.push(out_path);
    }

    Ok(results)
}
