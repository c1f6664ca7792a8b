//! Stored content → display-ready grid
//!
//! The inverse of row normalization: rebuilds the value matrix, per-row
//! objects keyed by header title, the flat hyperlink list, and merge spans.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::types::{
    CellLink, HyperlinkSource, MainCell, MergeRange, NormalizedRow, ReconstructedGrid,
    RenderCell, RowLinks, SheetContent, UrlEntry,
};

/// Key under which each structured row carries its header → URL map
pub const HYPERLINKS_KEY: &str = "_hyperlinks";

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Rebuild the whole grid
pub fn reconstruct(content: &SheetContent) -> ReconstructedGrid {
    let row_count = content
        .rows
        .iter()
        .map(|r| r.row_index + 1)
        .max()
        .unwrap_or(0);
    build_grid(content, row_count)
}

fn build_grid(content: &SheetContent, row_count: usize) -> ReconstructedGrid {
    let header = &content.header;
    let width = header.len();

    // Value matrix, header first. Indices without a stored row stay blank.
    let mut values = Vec::with_capacity(row_count + 1);
    values.push(header.clone());
    values.extend((0..row_count).map(|_| vec![String::new(); width]));
    for row in &content.rows {
        if row.row_index >= row_count {
            continue;
        }
        let target = &mut values[row.row_index + 1];
        for (j, cell) in target.iter_mut().enumerate() {
            *cell = row.column(j).to_string();
        }
    }

    let links_by_row = collect_links(&content.rows, &content.hyperlinks);

    let hyperlinks: Vec<CellLink> = links_by_row
        .iter()
        .flat_map(|(row, links)| {
            links.iter().map(move |l| CellLink {
                row: *row,
                col: l.column_index,
                url: l.url.clone(),
            })
        })
        .collect();

    let mut structured_rows = Vec::with_capacity(row_count);
    let mut cells: Vec<Vec<Option<RenderCell>>> = Vec::with_capacity(row_count);
    for r in 0..row_count {
        let row_values = &values[r + 1];
        let row_links = links_by_row.get(&r).map(Vec::as_slice).unwrap_or(&[]);

        // A column titled like the reserved key stays reachable through
        // `values` and `cells` only
        let mut object = Map::new();
        for (title, value) in header.iter().zip(row_values) {
            if title != HYPERLINKS_KEY {
                object.insert(title.clone(), Value::String(value.clone()));
            }
        }
        let mut link_map = Map::new();
        for link in row_links {
            if let Some(title) = header.get(link.column_index) {
                link_map.insert(title.clone(), Value::String(link.url.clone()));
            }
        }
        object.insert(HYPERLINKS_KEY.to_string(), Value::Object(link_map));
        structured_rows.push(object);

        let render_row: Vec<Option<RenderCell>> = row_values
            .iter()
            .enumerate()
            .map(|(c, value)| {
                Some(RenderCell {
                    value: value.clone(),
                    url: row_links
                        .iter()
                        .rev()
                        .find(|l| l.column_index == c)
                        .map(|l| l.url.clone()),
                    row_span: 1,
                    col_span: 1,
                })
            })
            .collect();
        cells.push(render_row);
    }

    let merged_cells_map = apply_merges(&content.merges, row_count, width, &mut cells);

    ReconstructedGrid {
        values,
        structured_rows,
        hyperlinks,
        merged_cells_map,
        cells,
    }
}

/// Gather links per row from whichever encoding the content uses, ordered
/// by row then column.
fn collect_links(
    rows: &[NormalizedRow],
    source: &HyperlinkSource,
) -> BTreeMap<usize, Vec<UrlEntry>> {
    let mut by_row: BTreeMap<usize, Vec<UrlEntry>> = BTreeMap::new();
    match source {
        HyperlinkSource::PerCell => {
            for row in rows.iter().filter(|r| !r.urls.is_empty()) {
                by_row
                    .entry(row.row_index)
                    .or_default()
                    .extend(row.urls.iter().cloned());
            }
        }
        HyperlinkSource::PerRowOptimized(dense) => {
            for RowLinks { row_index, links } in dense.iter().filter(|r| !r.links.is_empty()) {
                by_row
                    .entry(*row_index)
                    .or_default()
                    .extend(links.iter().cloned());
            }
        }
    }
    for links in by_row.values_mut() {
        links.sort_by_key(|l| l.column_index);
    }
    by_row
}

/// Attach spans to main cells and hide secondary cells.
///
/// Ranges are applied in order; when ranges overlap, the later one claims
/// the shared cells. Ranges that are empty or leave the grid are skipped.
fn apply_merges(
    merges: &[MergeRange],
    row_count: usize,
    width: usize,
    cells: &mut [Vec<Option<RenderCell>>],
) -> BTreeMap<(usize, usize), MainCell> {
    let mut spans: BTreeMap<(usize, usize), (usize, usize)> = BTreeMap::new();
    let mut merged: BTreeMap<(usize, usize), MainCell> = BTreeMap::new();

    for m in merges {
        if !m.fits(row_count, width) {
            warn!(
                start_row = m.start_row,
                end_row = m.end_row,
                start_col = m.start_col,
                end_col = m.end_col,
                row_count,
                width,
                "skipping merge range outside the grid"
            );
            continue;
        }

        let main = (m.start_row, m.start_col);
        merged.remove(&main);
        spans.insert(main, (m.row_span(), m.col_span()));

        for r in m.start_row..m.end_row {
            for c in m.start_col..m.end_col {
                if (r, c) == main {
                    continue;
                }
                spans.remove(&(r, c));
                merged.insert(
                    (r, c),
                    MainCell {
                        main_cell_row: m.start_row,
                        main_cell_col: m.start_col,
                    },
                );
            }
        }
    }

    for ((r, c), (row_span, col_span)) in &spans {
        if let Some(Some(cell)) = cells.get_mut(*r).and_then(|row| row.get_mut(*c)) {
            cell.row_span = *row_span;
            cell.col_span = *col_span;
        }
    }
    for (r, c) in merged.keys() {
        if let Some(slot) = cells.get_mut(*r).and_then(|row| row.get_mut(*c)) {
            *slot = None;
        }
    }

    merged
}

//==============================================================================
// Pagination
//==============================================================================

/// One page of a reconstructed sheet
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPage {
    /// 1-based page number
    pub page: usize,
    pub limit: usize,
    pub total_rows: usize,
    pub total_pages: usize,
    /// Data-row index of the first row on this page
    pub row_offset: usize,
    pub has_more: bool,
    pub grid: ReconstructedGrid,
}

/// Reconstruct a window of rows.
///
/// Rows are rebased so the page's grid starts at data row 0; `row_offset`
/// maps them back. Merge ranges are clipped to the window.
pub fn reconstruct_page(content: &SheetContent, page: usize, limit: usize) -> GridPage {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let page = page.max(1);

    let total_rows = content
        .rows
        .iter()
        .map(|r| r.row_index + 1)
        .max()
        .unwrap_or(0);
    let total_pages = total_rows.div_ceil(limit);

    let row_offset = (page - 1).saturating_mul(limit).min(total_rows);
    let window_end = row_offset.saturating_add(limit).min(total_rows);

    let in_window = |index: usize| index >= row_offset && index < window_end;

    let rows: Vec<NormalizedRow> = content
        .rows
        .iter()
        .filter(|r| in_window(r.row_index))
        .map(|r| NormalizedRow {
            row_index: r.row_index - row_offset,
            columns: r.columns.clone(),
            urls: r.urls.clone(),
        })
        .collect();

    let hyperlinks = match &content.hyperlinks {
        HyperlinkSource::PerCell => HyperlinkSource::PerCell,
        HyperlinkSource::PerRowOptimized(dense) => HyperlinkSource::PerRowOptimized(
            dense
                .iter()
                .filter(|r| in_window(r.row_index))
                .map(|r| RowLinks {
                    row_index: r.row_index - row_offset,
                    links: r.links.clone(),
                })
                .collect(),
        ),
    };

    let merges = content
        .merges
        .iter()
        .filter_map(|m| {
            let start = m.start_row.max(row_offset);
            let end = m.end_row.min(window_end);
            (start < end).then(|| {
                MergeRange::new(start - row_offset, end - row_offset, m.start_col, m.end_col)
            })
        })
        .collect();

    let window = SheetContent {
        sheet_id: content.sheet_id.clone(),
        header: content.header.clone(),
        rows,
        merges,
        hyperlinks,
        processed_at: content.processed_at,
        error_count: content.error_count,
    };

    GridPage {
        page,
        limit,
        total_rows,
        total_pages,
        row_offset,
        has_more: window_end < total_rows,
        grid: build_grid(&window, window_end - row_offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StorageMode;

    fn row(index: usize, cols: &[&str], urls: Vec<UrlEntry>) -> NormalizedRow {
        NormalizedRow {
            row_index: index,
            columns: cols
                .iter()
                .enumerate()
                .map(|(i, c)| (i, c.to_string()))
                .collect(),
            urls,
        }
    }

    fn header(titles: &[&str]) -> Vec<String> {
        titles.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_merge_example() {
        let content = SheetContent::build(
            "s1",
            header(&["A", "B"]),
            vec![row(0, &["x", "y"], vec![])],
            vec![MergeRange::new(0, 1, 0, 2)],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);

        let main = grid.cell(0, 0).unwrap();
        assert_eq!(main.row_span, 1);
        assert_eq!(main.col_span, 2);
        assert!(grid.cell(0, 1).is_none());
        assert_eq!(
            grid.merged_cells_map.get(&(0, 1)),
            Some(&MainCell {
                main_cell_row: 0,
                main_cell_col: 0
            })
        );
        assert_eq!(grid.merged_cells_map.len(), 1);
    }

    #[test]
    fn test_out_of_bounds_merge_is_ignored() {
        let content = SheetContent::build(
            "s1",
            header(&["A", "B"]),
            vec![row(0, &["x", "y"], vec![])],
            vec![MergeRange::new(0, 5, 0, 2), MergeRange::new(0, 1, 1, 1)],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);
        assert!(grid.merged_cells_map.is_empty());
        assert_eq!(grid.values[1], vec!["x", "y"]);
        assert_eq!(grid.cell(0, 0).unwrap().col_span, 1);
    }

    #[test]
    fn test_overlapping_merges_last_wins() {
        let content = SheetContent::build(
            "s1",
            header(&["A", "B", "C"]),
            vec![row(0, &["1", "2", "3"], vec![]), row(1, &["4", "5", "6"], vec![])],
            vec![MergeRange::new(0, 1, 0, 2), MergeRange::new(0, 2, 1, 3)],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);

        // (0,1) was secondary in the first range, main in the second
        let claimed = grid.cell(0, 1).unwrap();
        assert_eq!((claimed.row_span, claimed.col_span), (2, 2));
        assert!(!grid.merged_cells_map.contains_key(&(0, 1)));
        assert_eq!(
            grid.merged_cells_map.get(&(1, 2)),
            Some(&MainCell {
                main_cell_row: 0,
                main_cell_col: 1
            })
        );
        // first range keeps its own main cell
        assert_eq!(grid.cell(0, 0).unwrap().col_span, 2);
    }

    #[test]
    fn test_missing_row_indices_become_blank_rows() {
        let content = SheetContent::build(
            "s1",
            header(&["A"]),
            vec![row(0, &["a"], vec![]), row(2, &["c"], vec![])],
            vec![],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);
        assert_eq!(grid.row_count(), 3);
        assert_eq!(grid.values[2], vec![""]);
        assert_eq!(grid.structured_rows[1]["A"], "");
    }

    #[test]
    fn test_optimized_links_are_not_duplicated() {
        let rows = vec![row(0, &["doc"], vec![UrlEntry::new(0, "https://a.example")])];
        let full = reconstruct(&SheetContent::build(
            "s1",
            header(&["A"]),
            rows.clone(),
            vec![],
            StorageMode::Full,
        ));
        let optimized = reconstruct(&SheetContent::build(
            "s1",
            header(&["A"]),
            rows,
            vec![],
            StorageMode::Optimized,
        ));
        assert_eq!(full.hyperlinks, optimized.hyperlinks);
        assert_eq!(optimized.hyperlinks.len(), 1);
        assert_eq!(optimized.structured_rows[0][HYPERLINKS_KEY]["A"], "https://a.example");
    }

    #[test]
    fn test_reserved_header_title_keeps_link_map() {
        let content = SheetContent::build(
            "s1",
            header(&["Name", HYPERLINKS_KEY]),
            vec![row(0, &["ann", "shadowed"], vec![UrlEntry::new(0, "https://a.example")])],
            vec![],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);
        assert_eq!(grid.structured_rows[0][HYPERLINKS_KEY]["Name"], "https://a.example");
        assert_eq!(grid.values[1], vec!["ann", "shadowed"]);
        assert_eq!(grid.cell(0, 1).map(|c| c.value.as_str()), Some("shadowed"));
    }

    #[test]
    fn test_render_cell_carries_url() {
        let content = SheetContent::build(
            "s1",
            header(&["A", "B"]),
            vec![row(0, &["x", "y"], vec![UrlEntry::new(1, "https://b.example")])],
            vec![],
            StorageMode::Full,
        );
        let grid = reconstruct(&content);
        assert!(grid.cell(0, 0).unwrap().url.is_none());
        assert_eq!(grid.cell(0, 1).unwrap().url.as_deref(), Some("https://b.example"));
    }

    #[test]
    fn test_merged_map_serializes_with_string_keys() {
        let content = SheetContent::build(
            "s1",
            header(&["A", "B"]),
            vec![row(0, &["x", "y"], vec![])],
            vec![MergeRange::new(0, 1, 0, 2)],
            StorageMode::Full,
        );
        let json = serde_json::to_value(reconstruct(&content)).unwrap();
        assert_eq!(json["mergedCellsMap"]["0-1"]["mainCellRow"], 0);
        assert_eq!(json["mergedCellsMap"]["0-1"]["mainCellCol"], 0);
    }

    #[test]
    fn test_page_window() {
        let rows = (0..5)
            .map(|i| row(i, &[i.to_string().as_str()], vec![]))
            .collect();
        let content = SheetContent::build(
            "s1",
            header(&["N"]),
            rows,
            vec![MergeRange::new(1, 4, 0, 1)],
            StorageMode::Full,
        );

        let page = reconstruct_page(&content, 2, 2);
        assert_eq!(page.total_rows, 5);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.row_offset, 2);
        assert!(page.has_more);
        assert_eq!(page.grid.values, vec![vec!["N"], vec!["2"], vec!["3"]]);
        // merge 1..4 clipped to 2..4, rebased to 0..2
        assert_eq!(page.grid.cell(0, 0).unwrap().row_span, 2);

        let last = reconstruct_page(&content, 3, 2);
        assert!(!last.has_more);
        assert_eq!(last.grid.row_count(), 1);

        let beyond = reconstruct_page(&content, 9, 2);
        assert_eq!(beyond.grid.row_count(), 0);
    }

    #[test]
    fn test_page_limit_clamped() {
        let content = SheetContent::build("s1", header(&["A"]), vec![], vec![], StorageMode::Full);
        let page = reconstruct_page(&content, 0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.total_pages, 0);
        assert_eq!(reconstruct_page(&content, 1, 10_000).limit, MAX_PAGE_LIMIT);
    }
}
