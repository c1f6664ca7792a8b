//! Data row → `NormalizedRow`
//!
//! Normalization is a pure function of one row and the header width, so rows
//! can be normalized on any task in any order.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::SheetError;
use crate::grid::upstream::CellData;
use crate::types::{NormalizedRow, UrlEntry};

/// Upstream per-cell character limit
pub const MAX_CELL_CHARS: usize = 50_000;

/// A row that was skipped during processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    pub row_index: usize,
    pub message: String,
}

impl From<RowFailure> for SheetError {
    fn from(failure: RowFailure) -> Self {
        SheetError::RowNormalization {
            row_index: failure.row_index,
            message: failure.message,
        }
    }
}

/// Normalize one data row.
///
/// `row_index` is the 0-based data row position (source row minus the header).
/// Cells past `header_len` are ignored; missing cells become empty strings.
pub fn normalize_row(
    row_index: usize,
    cells: &[CellData],
    header_len: usize,
) -> Result<NormalizedRow, RowFailure> {
    let mut columns = BTreeMap::new();
    let mut urls: Vec<UrlEntry> = Vec::new();

    for j in 0..header_len {
        let Some(cell) = cells.get(j) else {
            columns.insert(j, String::new());
            continue;
        };

        let text = cell.text();
        let chars = text.chars().count();
        if chars > MAX_CELL_CHARS {
            return Err(RowFailure {
                row_index,
                message: format!(
                    "column {} holds {} characters (limit {})",
                    j, chars, MAX_CELL_CHARS
                ),
            });
        }
        columns.insert(j, text);

        for url in cell.link_candidates() {
            if !urls.iter().any(|u| u.url == url) {
                urls.push(UrlEntry::new(j, url));
            }
        }
    }

    Ok(NormalizedRow {
        row_index,
        columns,
        urls,
    })
}

/// Normalize a batch of rows starting at `first_index`, collecting failures
/// instead of stopping at the first one.
pub fn normalize_batch(
    first_index: usize,
    rows: &[Vec<CellData>],
    header_len: usize,
) -> (Vec<NormalizedRow>, Vec<RowFailure>) {
    let mut normalized = Vec::with_capacity(rows.len());
    let mut failures = Vec::new();

    for (offset, cells) in rows.iter().enumerate() {
        match normalize_row(first_index + offset, cells, header_len) {
            Ok(row) => normalized.push(row),
            Err(failure) => failures.push(failure),
        }
    }

    (normalized, failures)
}
