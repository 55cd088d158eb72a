//! The instructional prompt sent with every extraction request.
//!
//! Centralising it here serves two purposes:
//!
//! 1. **Single source of truth** — tightening the output rules requires
//!    editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the prompt without calling a
//!    real model, so wording regressions are caught cheaply.
//!
//! Callers can override it via [`crate::config::BatchConfig::extraction_prompt`];
//! the constant here is used only when no override is provided.

/// Default prompt for extracting tabular data from a document's page images.
///
/// The rules mirror what the aggregator needs downstream: one header row,
/// all pages merged, raw CSV with no prose or fences, quoted fields where
/// the delimiter appears inside a value.
pub const EXTRACTION_PROMPT: &str = "\
Analyze the following images, which are pages from a single document.
Extract all tabular data into a single, clean, comma-separated CSV format.
- The first row must be the header row.
- Combine data from all pages into one CSV.
- Do not include any introductory text, explanations, or the '```csv' '```' markers.
- Only output the raw CSV data.
- Ensure all values are properly quoted if they contain commas.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_demands_header_row_and_raw_csv() {
        assert!(EXTRACTION_PROMPT.contains("header row"));
        assert!(EXTRACTION_PROMPT.contains("raw CSV"));
        assert!(EXTRACTION_PROMPT.contains("quoted"));
    }
}
