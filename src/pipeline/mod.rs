//! Pipeline stages for one document's conversion-extraction-save cycle.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations (e.g. a different rendering backend) without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ extract ──▶ sanitize ──▶ document (save + cleanup)
//! (pdfium)   (upload/model/delete)  (fences, CRLF)
//! ```
//!
//! 1. [`render`]   — rasterise every page to JPEG files; runs in
//!    `spawn_blocking` because pdfium is not async-safe
//! 2. [`extract`]  — the only stage with network I/O: upload pages, issue
//!    one extraction request, always delete the uploads
//! 3. [`sanitize`] — deterministic cleanup of model quirks in the CSV text
//! 4. [`document`] — drives the stages for one document, maps its progress
//!    slice, saves the CSV, removes the image working directory

pub mod document;
pub mod extract;
pub mod render;
pub mod sanitize;
