//! Content storage
//!
//! A store keeps two things per sheet: the `Sheet` identity record and, once
//! processed, its `SheetContent`. Content is always replaced wholesale, so a
//! reader sees either the previous version or the new one.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SheetResult;
use crate::types::{MergeRange, NormalizedRow, ProcessingStatus, Sheet, SheetContent, StorageMode};

pub use file::FileContentStore;
pub use memory::InMemoryContentStore;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Create or update the identity record of a sheet
    async fn register_sheet(&self, sheet: Sheet) -> SheetResult<()>;

    /// Fails with `NotFound` for unknown ids
    async fn get_sheet(&self, sheet_id: &str) -> SheetResult<Sheet>;

    /// All sheets, optionally restricted to one course, ordered by id
    async fn list_sheets(&self, course_id: Option<&str>) -> SheetResult<Vec<Sheet>>;

    /// Atomically replace the stored content of `content.sheet_id`.
    ///
    /// Fails with `NotFound` when the sheet is not registered. Storing a
    /// payload identical to the current one only moves `processed_at`. On
    /// error the previously stored content and status are left in place.
    async fn put_content(&self, content: SheetContent) -> SheetResult<()>;

    /// Fails with `NotFound` when nothing has been processed for the sheet
    async fn get_content(&self, sheet_id: &str) -> SheetResult<Arc<SheetContent>>;

    /// Delete stored content; returns whether a record existed
    async fn clear_content(&self, sheet_id: &str) -> SheetResult<bool>;

    /// Lightweight status projection; does not load row bodies
    async fn get_processing_status(&self, sheet_id: &str) -> SheetResult<ProcessingStatus>;

    async fn replace_content(
        &self,
        sheet_id: &str,
        header: Vec<String>,
        rows: Vec<NormalizedRow>,
        merges: Vec<MergeRange>,
        mode: StorageMode,
    ) -> SheetResult<()> {
        self.put_content(SheetContent::build(sheet_id, header, rows, merges, mode))
            .await
    }
}
