//! Combining per-document CSVs into one spreadsheet.
//!
//! Every completed document leaves `<stem>.csv` in the output folder; after
//! the batch finishes, [`combine`] merges them into `combined_output.csv`.
//! Documents rarely share an identical schema, so the combined header is the
//! *union* of all source columns in first-seen order: files are visited in
//! lexicographic name order, and a value lands under the column whose header
//! text matches, with empty cells where a source lacks the column.
//!
//! All functions here are synchronous; the orchestrator calls them after the
//! last document, when nothing else is in flight.

use crate::progress::RunLogger;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Name of the merged spreadsheet written into the output folder.
pub const COMBINED_FILENAME: &str = "combined_output.csv";

/// What [`combine`] produced: the merged file and the sources it consumed.
#[derive(Debug)]
pub struct CombineReport {
    pub combined_path: PathBuf,
    pub sources: Vec<PathBuf>,
}

/// Merge every per-document CSV in `output_dir` into `combined_output.csv`.
///
/// Returns `Ok(None)` when there is nothing to combine (logged, not an
/// error). Sources that cannot be parsed are logged and skipped; the merge
/// proceeds with the rest.
pub fn combine(output_dir: &Path, log: &RunLogger) -> csv::Result<Option<CombineReport>> {
    let candidates = discover_sources(output_dir)?;
    if candidates.is_empty() {
        log.info("No CSV files were generated to combine.");
        return Ok(None);
    }

    // Union header across all sources, in first-seen order.
    let mut columns: Vec<String> = Vec::new();
    let mut column_index: HashMap<String, usize> = HashMap::new();
    let mut tables: Vec<(Vec<usize>, Vec<Vec<String>>)> = Vec::new();
    let mut sources: Vec<PathBuf> = Vec::new();

    for path in candidates {
        let (header, rows) = match read_table(&path) {
            Ok(Some(table)) => table,
            Ok(None) => continue, // empty file contributes nothing
            Err(e) => {
                log.warn(&format!(
                    "Skipping '{}': could not read CSV ({e})",
                    path.display()
                ));
                continue;
            }
        };

        let mapping: Vec<usize> = header
            .into_iter()
            .map(|name| {
                *column_index.entry(name.clone()).or_insert_with(|| {
                    columns.push(name);
                    columns.len() - 1
                })
            })
            .collect();

        tables.push((mapping, rows));
        sources.push(path);
    }

    if sources.is_empty() {
        log.info("No CSV files were generated to combine.");
        return Ok(None);
    }

    let combined_path = output_dir.join(COMBINED_FILENAME);
    let mut writer = csv::Writer::from_path(&combined_path)?;
    writer.write_record(&columns)?;
    for (mapping, rows) in &tables {
        for row in rows {
            let mut record = vec![String::new(); columns.len()];
            for (src_idx, value) in row.iter().enumerate() {
                if let Some(&dst) = mapping.get(src_idx) {
                    record[dst] = value.clone();
                }
            }
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;

    Ok(Some(CombineReport {
        combined_path,
        sources,
    }))
}

/// Delete the per-document CSVs that were merged. Failures are logged only;
/// a stray intermediate never fails the run.
pub fn remove_sources(report: &CombineReport, log: &RunLogger) {
    for path in &report.sources {
        if let Err(e) = std::fs::remove_file(path) {
            log.warn(&format!(
                "Could not remove intermediate file '{}': {e}",
                path.display()
            ));
        }
    }
}

/// All `.csv` files in the output folder except the combined output itself,
/// in lexicographic name order so the merge is deterministic.
fn discover_sources(output_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(output_dir)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        let is_combined = path
            .file_name()
            .map(|n| n == COMBINED_FILENAME)
            .unwrap_or(false);
        if is_csv && !is_combined && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Read one source CSV as (header, data rows). `Ok(None)` for empty files.
fn read_table(path: &Path) -> csv::Result<Option<(Vec<String>, Vec<Vec<String>>)>> {
    // Sources come from a language model, so row widths may be ragged;
    // flexible mode keeps a short row from discarding the whole file.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut records = reader.records();
    let header = match records.next() {
        Some(first) => first?.iter().map(str::to_string).collect::<Vec<_>>(),
        None => return Ok(None),
    };

    let mut rows = Vec::new();
    for record in records {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(Some((header, rows)))
}
