use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

//==============================================================================
// Sheet identity
//==============================================================================

/// A spreadsheet tab attached to a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sheet {
    pub id: String,
    pub course_id: String,
    pub name: String,
    /// Identifier of the spreadsheet at the upstream provider
    pub spreadsheet_id: String,
    /// Tab title to pick when the upstream payload holds several tabs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Whether viewers must be enrolled in the owning course
    #[serde(default = "default_true")]
    pub requires_membership: bool,
}

fn default_true() -> bool {
    true
}

impl Sheet {
    pub fn new(
        id: impl Into<String>,
        course_id: impl Into<String>,
        name: impl Into<String>,
        spreadsheet_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            course_id: course_id.into(),
            name: name.into(),
            spreadsheet_id: spreadsheet_id.into(),
            tab: None,
            created_at: Utc::now(),
            requires_membership: true,
        }
    }

    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }

    pub fn with_requires_membership(mut self, requires_membership: bool) -> Self {
        self.requires_membership = requires_membership;
        self
    }
}

/// A course as seen by portal clients; sheets belong to courses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default = "default_true")]
    pub requires_membership: bool,
}

impl Course {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            requires_membership: true,
        }
    }
}

//==============================================================================
// Normalized rows
//==============================================================================

/// A hyperlink found in one column of a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlEntry {
    pub column_index: usize,
    pub url: String,
}

impl UrlEntry {
    pub fn new(column_index: usize, url: impl Into<String>) -> Self {
        Self {
            column_index,
            url: url.into(),
        }
    }
}

/// One data row, flattened to position-indexed text plus extracted links.
///
/// `columns` always holds exactly one entry per header column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRow {
    pub row_index: usize,
    pub columns: BTreeMap<usize, String>,
    #[serde(default)]
    pub urls: Vec<UrlEntry>,
}

impl NormalizedRow {
    /// Text of column `index`, empty when the column is absent
    pub fn column(&self, index: usize) -> &str {
        self.columns.get(&index).map(String::as_str).unwrap_or("")
    }
}

/// Half-open rectangular merge range in data-row coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRange {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

impl MergeRange {
    pub fn new(start_row: usize, end_row: usize, start_col: usize, end_col: usize) -> Self {
        Self {
            start_row,
            end_row,
            start_col,
            end_col,
        }
    }

    pub fn row_span(&self) -> usize {
        self.end_row.saturating_sub(self.start_row)
    }

    pub fn col_span(&self) -> usize {
        self.end_col.saturating_sub(self.start_col)
    }

    /// True when the range is non-empty and fits a grid of `rows` x `cols`
    pub fn fits(&self, rows: usize, cols: usize) -> bool {
        self.start_row < self.end_row
            && self.start_col < self.end_col
            && self.end_row <= rows
            && self.end_col <= cols
    }
}

//==============================================================================
// Stored content
//==============================================================================

/// Physical encoding used to persist per-row hyperlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Full,
    Optimized,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(StorageMode::Full),
            "optimized" => Ok(StorageMode::Optimized),
            other => Err(format!("unknown storage mode '{}'", other)),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Full => write!(f, "full"),
            StorageMode::Optimized => write!(f, "optimized"),
        }
    }
}

/// Dense hyperlink list for one row (optimized storage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowLinks {
    pub row_index: usize,
    pub links: Vec<UrlEntry>,
}

/// Where the hyperlinks of a stored sheet live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rows", rename_all = "camelCase")]
pub enum HyperlinkSource {
    /// Links are kept on each `NormalizedRow::urls`
    PerCell,
    /// Links are lifted into a dense per-row list; row `urls` are empty
    PerRowOptimized(Vec<RowLinks>),
}

impl HyperlinkSource {
    pub fn storage_mode(&self) -> StorageMode {
        match self {
            HyperlinkSource::PerCell => StorageMode::Full,
            HyperlinkSource::PerRowOptimized(_) => StorageMode::Optimized,
        }
    }
}

/// Everything persisted for one processed sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetContent {
    pub sheet_id: String,
    pub header: Vec<String>,
    pub rows: Vec<NormalizedRow>,
    #[serde(default)]
    pub merges: Vec<MergeRange>,
    pub hyperlinks: HyperlinkSource,
    pub processed_at: DateTime<Utc>,
    #[serde(default)]
    pub error_count: usize,
}

impl SheetContent {
    /// Assemble content for storage, moving row links into the dense
    /// per-row list when `mode` is optimized.
    pub fn build(
        sheet_id: impl Into<String>,
        header: Vec<String>,
        mut rows: Vec<NormalizedRow>,
        merges: Vec<MergeRange>,
        mode: StorageMode,
    ) -> Self {
        rows.sort_by_key(|r| r.row_index);

        let hyperlinks = match mode {
            StorageMode::Full => HyperlinkSource::PerCell,
            StorageMode::Optimized => {
                let dense = rows
                    .iter_mut()
                    .filter(|r| !r.urls.is_empty())
                    .map(|r| RowLinks {
                        row_index: r.row_index,
                        links: std::mem::take(&mut r.urls),
                    })
                    .collect();
                HyperlinkSource::PerRowOptimized(dense)
            }
        };

        Self {
            sheet_id: sheet_id.into(),
            header,
            rows,
            merges,
            hyperlinks,
            processed_at: Utc::now(),
            error_count: 0,
        }
    }

    pub fn with_error_count(mut self, error_count: usize) -> Self {
        self.error_count = error_count;
        self
    }

    pub fn storage_mode(&self) -> StorageMode {
        self.hyperlinks.storage_mode()
    }

    /// Compare everything except the processing timestamp
    pub fn same_payload(&self, other: &SheetContent) -> bool {
        self.sheet_id == other.sheet_id
            && self.header == other.header
            && self.rows == other.rows
            && self.merges == other.merges
            && self.hyperlinks == other.hyperlinks
            && self.error_count == other.error_count
    }

    pub fn status(&self) -> ProcessingStatus {
        ProcessingStatus {
            processed: true,
            row_count: self.rows.len(),
            error_count: self.error_count,
            processed_at: Some(self.processed_at),
            storage_mode: Some(self.storage_mode()),
        }
    }
}

/// Lightweight projection of a sheet's stored content
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStatus {
    pub processed: bool,
    pub row_count: usize,
    #[serde(default)]
    pub error_count: usize,
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_mode: Option<StorageMode>,
}

impl ProcessingStatus {
    pub fn unprocessed() -> Self {
        Self::default()
    }
}

//==============================================================================
// Reconstructed grid
//==============================================================================

/// A hyperlink positioned in data-row coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLink {
    pub row: usize,
    pub col: usize,
    pub url: String,
}

/// Top-left cell of the merge range that hides a secondary cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MainCell {
    pub main_cell_row: usize,
    pub main_cell_col: usize,
}

/// One directly rendered cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderCell {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub row_span: usize,
    pub col_span: usize,
}

/// Display-ready grid rebuilt from stored content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedGrid {
    /// Row-major text matrix; row 0 is the header
    pub values: Vec<Vec<String>>,
    /// One object per data row keyed by header title, plus `_hyperlinks`
    pub structured_rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub hyperlinks: Vec<CellLink>,
    #[serde(serialize_with = "serialize_coord_map")]
    pub merged_cells_map: BTreeMap<(usize, usize), MainCell>,
    /// Data rows for rendering; `None` marks a cell hidden by a merge
    pub cells: Vec<Vec<Option<RenderCell>>>,
}

impl ReconstructedGrid {
    /// Number of data rows (header excluded)
    pub fn row_count(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&RenderCell> {
        self.cells.get(row).and_then(|r| r.get(col)).and_then(Option::as_ref)
    }
}

fn serialize_coord_map<S>(
    map: &BTreeMap<(usize, usize), MainCell>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::SerializeMap;
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for ((row, col), main) in map {
        out.serialize_entry(&format!("{}-{}", row, col), main)?;
    }
    out.end()
}
