//! Spreadsheet ingestion
//!
//! - `upstream`: the provider's loose JSON shape
//! - `parser`: payload → header, data rows, merges
//! - `normalizer`: data row → `NormalizedRow`
//! - `source`: where payloads come from (HTTP, files)

pub mod normalizer;
pub mod parser;
pub mod source;
pub mod upstream;

pub use normalizer::{normalize_batch, normalize_row, RowFailure, MAX_CELL_CHARS};
pub use parser::{parse_payload, parse_sheet, ParsedGrid};
pub use source::{extract_spreadsheet_id, FileGridSource, GridSource, HttpGridSource};
