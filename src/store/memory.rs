use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::ContentStore;
use crate::error::{SheetError, SheetResult};
use crate::types::{ProcessingStatus, Sheet, SheetContent};

#[derive(Default)]
struct Inner {
    sheets: HashMap<String, Sheet>,
    contents: HashMap<String, Arc<SheetContent>>,
    statuses: HashMap<String, ProcessingStatus>,
}

/// Process-local store. Content and status are swapped under one write lock.
#[derive(Default)]
pub struct InMemoryContentStore {
    inner: RwLock<Inner>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn register_sheet(&self, sheet: Sheet) -> SheetResult<()> {
        let mut inner = self.inner.write().await;
        inner.sheets.insert(sheet.id.clone(), sheet);
        Ok(())
    }

    async fn get_sheet(&self, sheet_id: &str) -> SheetResult<Sheet> {
        self.inner
            .read()
            .await
            .sheets
            .get(sheet_id)
            .cloned()
            .ok_or_else(|| SheetError::NotFound(format!("sheet '{}'", sheet_id)))
    }

    async fn list_sheets(&self, course_id: Option<&str>) -> SheetResult<Vec<Sheet>> {
        let inner = self.inner.read().await;
        let mut sheets: Vec<Sheet> = inner
            .sheets
            .values()
            .filter(|s| course_id.map_or(true, |c| s.course_id == c))
            .cloned()
            .collect();
        sheets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sheets)
    }

    async fn put_content(&self, content: SheetContent) -> SheetResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.sheets.contains_key(&content.sheet_id) {
            return Err(SheetError::NotFound(format!("sheet '{}'", content.sheet_id)));
        }

        if let Some(existing) = inner.contents.get(&content.sheet_id) {
            if existing.same_payload(&content) {
                debug!(sheet_id = %content.sheet_id, "content unchanged, refreshing timestamp");
            }
        }

        let sheet_id = content.sheet_id.clone();
        inner.statuses.insert(sheet_id.clone(), content.status());
        inner.contents.insert(sheet_id, Arc::new(content));
        Ok(())
    }

    async fn get_content(&self, sheet_id: &str) -> SheetResult<Arc<SheetContent>> {
        self.inner
            .read()
            .await
            .contents
            .get(sheet_id)
            .cloned()
            .ok_or_else(|| SheetError::NotFound(format!("content for sheet '{}'", sheet_id)))
    }

    async fn clear_content(&self, sheet_id: &str) -> SheetResult<bool> {
        let mut inner = self.inner.write().await;
        inner.statuses.remove(sheet_id);
        Ok(inner.contents.remove(sheet_id).is_some())
    }

    async fn get_processing_status(&self, sheet_id: &str) -> SheetResult<ProcessingStatus> {
        let inner = self.inner.read().await;
        if !inner.sheets.contains_key(sheet_id) {
            return Err(SheetError::NotFound(format!("sheet '{}'", sheet_id)));
        }
        Ok(inner
            .statuses
            .get(sheet_id)
            .cloned()
            .unwrap_or_else(ProcessingStatus::unprocessed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NormalizedRow, StorageMode};

    fn row(index: usize, text: &str) -> NormalizedRow {
        NormalizedRow {
            row_index: index,
            columns: [(0, text.to_string())].into_iter().collect(),
            urls: vec![],
        }
    }

    #[tokio::test]
    async fn test_replace_requires_registered_sheet() {
        let store = InMemoryContentStore::new();
        let err = store
            .replace_content("nope", vec!["A".into()], vec![], vec![], StorageMode::Full)
            .await
            .unwrap_err();
        assert!(matches!(err, SheetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_projection() {
        let store = InMemoryContentStore::new();
        store
            .register_sheet(Sheet::new("s1", "c1", "Week 1", "abc"))
            .await
            .unwrap();

        let before = store.get_processing_status("s1").await.unwrap();
        assert!(!before.processed);

        store
            .replace_content(
                "s1",
                vec!["A".into()],
                vec![row(0, "x"), row(1, "y")],
                vec![],
                StorageMode::Full,
            )
            .await
            .unwrap();

        let after = store.get_processing_status("s1").await.unwrap();
        assert!(after.processed);
        assert_eq!(after.row_count, 2);
        assert!(after.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_sheets_by_course() {
        let store = InMemoryContentStore::new();
        store.register_sheet(Sheet::new("b", "c1", "B", "x")).await.unwrap();
        store.register_sheet(Sheet::new("a", "c1", "A", "y")).await.unwrap();
        store.register_sheet(Sheet::new("z", "c2", "Z", "z")).await.unwrap();

        let c1 = store.list_sheets(Some("c1")).await.unwrap();
        let ids: Vec<&str> = c1.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list_sheets(None).await.unwrap().len(), 3);
    }
}
