//! Upstream payload → header, data rows and merge ranges

use serde::Deserialize;

use crate::error::{SheetError, SheetResult};
use crate::grid::upstream::{CellData, GridRange, UpstreamPayload, UpstreamSheet};
use crate::types::MergeRange;

/// Intermediate model of one sheet
///
/// Row 0 of the upstream grid is always the header; `data_rows` holds the
/// remaining rows, each padded to at least the header width.
#[derive(Debug, Clone, Default)]
pub struct ParsedGrid {
    pub title: String,
    pub header: Vec<String>,
    pub data_rows: Vec<Vec<CellData>>,
    /// Merge ranges rebased to data-row coordinates
    pub merges: Vec<MergeRange>,
}

impl ParsedGrid {
    pub fn width(&self) -> usize {
        self.header.len()
    }
}

/// Parse a raw upstream payload, picking the tab named `tab` when the
/// payload holds a whole spreadsheet (first tab otherwise).
pub fn parse_payload(payload: &serde_json::Value, tab: Option<&str>) -> SheetResult<ParsedGrid> {
    let payload = UpstreamPayload::deserialize(payload)
        .map_err(|e| SheetError::UpstreamFetch(format!("malformed upstream payload: {}", e)))?;

    let sheet = match payload {
        UpstreamPayload::Sheet(sheet) => sheet,
        UpstreamPayload::Spreadsheet(mut spreadsheet) => {
            if spreadsheet.sheets.is_empty() {
                return Err(SheetError::UpstreamFetch(
                    "upstream spreadsheet has no sheets".to_string(),
                ));
            }
            let position = tab
                .and_then(|name| {
                    spreadsheet
                        .sheets
                        .iter()
                        .position(|s| s.title() == Some(name))
                })
                .unwrap_or(0);
            spreadsheet.sheets.swap_remove(position)
        }
    };

    Ok(parse_sheet(sheet))
}

/// Parse one upstream sheet object
pub fn parse_sheet(sheet: UpstreamSheet) -> ParsedGrid {
    let title = sheet.title().unwrap_or_default().to_string();

    let mut rows = sheet
        .data
        .into_iter()
        .flat_map(|block| block.row_data.into_iter())
        .map(|row| row.values);

    let header: Vec<String> = match rows.next() {
        Some(cells) => cells.iter().map(CellData::text).collect(),
        None => Vec::new(),
    };
    let width = header.len();

    let data_rows: Vec<Vec<CellData>> = rows
        .map(|mut cells| {
            if cells.len() < width {
                cells.resize_with(width, CellData::default);
            }
            cells
        })
        .collect();

    let total_rows = data_rows.len() + 1;
    let merges = sheet
        .merges
        .iter()
        .filter_map(|range| rebase_merge(range, total_rows, width))
        .collect();

    ParsedGrid {
        title,
        header,
        data_rows,
        merges,
    }
}

/// Convert an absolute merge range into data-row coordinates.
///
/// Missing start indices mean 0, missing end indices mean "to the edge of
/// the grid". Ranges that lie entirely inside the header row are dropped;
/// ranges that start in the header are clamped to the first data row.
fn rebase_merge(range: &GridRange, total_rows: usize, width: usize) -> Option<MergeRange> {
    let start_row = range.start_row_index.unwrap_or(0).max(0) as usize;
    let end_row = match range.end_row_index {
        Some(end) if end < 0 => return None,
        Some(end) => end as usize,
        None => total_rows,
    };
    let start_col = range.start_column_index.unwrap_or(0).max(0) as usize;
    let end_col = match range.end_column_index {
        Some(end) if end < 0 => return None,
        Some(end) => end as usize,
        None => width,
    };

    if end_row <= 1 {
        return None;
    }

    Some(MergeRange::new(
        start_row.max(1) - 1,
        end_row - 1,
        start_col,
        end_col,
    ))
}
