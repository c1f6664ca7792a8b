use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::ContentStore;
use crate::error::{SheetError, SheetResult};
use crate::types::{ProcessingStatus, Sheet, SheetContent};

/// JSON-file store rooted at a data directory:
///
/// ```text
/// <root>/sheets/<id>.json    identity records
/// <root>/content/<id>.json   full content
/// <root>/status/<id>.json    status projection
/// ```
///
/// Every write goes to a temporary file that is renamed over the target, so
/// readers never observe a half-written record. Content and status are both
/// staged before either is renamed; if the status rename fails the previous
/// content is put back.
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, kind: &str, sheet_id: &str) -> SheetResult<PathBuf> {
        let valid = !sheet_id.is_empty()
            && sheet_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SheetError::Storage(format!(
                "invalid sheet id '{}'",
                sheet_id
            )));
        }
        Ok(self.root.join(kind).join(format!("{}.json", sheet_id)))
    }

    async fn read_record<T: DeserializeOwned>(path: &Path) -> SheetResult<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => serde_json::from_str(&text).map(Some).map_err(|e| {
                SheetError::Storage(format!("corrupt record {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SheetError::Storage(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn write_record<T: Serialize + Sync>(path: &Path, record: &T) -> SheetResult<()> {
        let tmp = Self::stage_record(path, record).await?;
        Self::commit(&tmp, path).await
    }

    /// Write `record` to a temp file next to `path`; nothing is visible yet
    async fn stage_record<T: Serialize + Sync>(path: &Path, record: &T) -> SheetResult<PathBuf> {
        let json = serde_json::to_vec_pretty(record)?;
        Self::stage_bytes(path, &json).await
    }

    async fn stage_bytes(path: &Path, bytes: &[u8]) -> SheetResult<PathBuf> {
        let dir = path
            .parent()
            .ok_or_else(|| SheetError::Storage(format!("no parent for {}", path.display())))?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| SheetError::Storage(format!("cannot create {}: {}", dir.display(), e)))?;

        let tmp = dir.join(format!(".{}.tmp", Uuid::new_v4()));
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            Self::discard(&tmp).await;
            return Err(SheetError::Storage(format!(
                "cannot write {}: {}",
                tmp.display(),
                e
            )));
        }
        Ok(tmp)
    }

    async fn commit(tmp: &Path, path: &Path) -> SheetResult<()> {
        if let Err(e) = tokio::fs::rename(tmp, path).await {
            Self::discard(tmp).await;
            return Err(SheetError::Storage(format!(
                "cannot replace {}: {}",
                path.display(),
                e
            )));
        }
        Ok(())
    }

    async fn discard(tmp: &Path) {
        if let Err(e) = tokio::fs::remove_file(tmp).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %e, "cannot remove temp file");
            }
        }
    }

    async fn read_bytes(path: &Path) -> SheetResult<Option<Vec<u8>>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SheetError::Storage(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Put the previous content record back after a failed status commit
    async fn roll_back_content(path: &Path, previous: Option<Vec<u8>>) {
        let restored = match previous {
            Some(bytes) => match Self::stage_bytes(path, &bytes).await {
                Ok(tmp) => Self::commit(&tmp, path).await,
                Err(e) => Err(e),
            },
            None => Self::remove_record(path).await.map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(path = %path.display(), error = %e, "cannot roll back content record");
        }
    }

    async fn remove_record(path: &Path) -> SheetResult<bool> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SheetError::Storage(format!(
                "cannot delete {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn register_sheet(&self, sheet: Sheet) -> SheetResult<()> {
        let path = self.record_path("sheets", &sheet.id)?;
        Self::write_record(&path, &sheet).await
    }

    async fn get_sheet(&self, sheet_id: &str) -> SheetResult<Sheet> {
        let path = self.record_path("sheets", sheet_id)?;
        Self::read_record(&path)
            .await?
            .ok_or_else(|| SheetError::NotFound(format!("sheet '{}'", sheet_id)))
    }

    async fn list_sheets(&self, course_id: Option<&str>) -> SheetResult<Vec<Sheet>> {
        let dir = self.root.join("sheets");
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(SheetError::Storage(format!(
                    "cannot list {}: {}",
                    dir.display(),
                    e
                )))
            }
        };

        let mut sheets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(sheet) = Self::read_record::<Sheet>(&path).await? {
                if course_id.map_or(true, |c| sheet.course_id == c) {
                    sheets.push(sheet);
                }
            }
        }
        sheets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sheets)
    }

    async fn put_content(&self, content: SheetContent) -> SheetResult<()> {
        self.get_sheet(&content.sheet_id).await?;

        let content_path = self.record_path("content", &content.sheet_id)?;
        let status_path = self.record_path("status", &content.sheet_id)?;
        let previous = Self::read_bytes(&content_path).await?;

        // Stage both records before either becomes visible
        let content_tmp = Self::stage_record(&content_path, &content).await?;
        let status_tmp = match Self::stage_record(&status_path, &content.status()).await {
            Ok(tmp) => tmp,
            Err(e) => {
                Self::discard(&content_tmp).await;
                return Err(e);
            }
        };

        if let Err(e) = Self::commit(&content_tmp, &content_path).await {
            Self::discard(&status_tmp).await;
            return Err(e);
        }
        if let Err(e) = Self::commit(&status_tmp, &status_path).await {
            Self::roll_back_content(&content_path, previous).await;
            return Err(e);
        }
        Ok(())
    }

    async fn get_content(&self, sheet_id: &str) -> SheetResult<Arc<SheetContent>> {
        let path = self.record_path("content", sheet_id)?;
        Self::read_record(&path)
            .await?
            .map(Arc::new)
            .ok_or_else(|| SheetError::NotFound(format!("content for sheet '{}'", sheet_id)))
    }

    async fn clear_content(&self, sheet_id: &str) -> SheetResult<bool> {
        let status_path = self.record_path("status", sheet_id)?;
        Self::remove_record(&status_path).await?;
        let content_path = self.record_path("content", sheet_id)?;
        Self::remove_record(&content_path).await
    }

    async fn get_processing_status(&self, sheet_id: &str) -> SheetResult<ProcessingStatus> {
        self.get_sheet(sheet_id).await?;
        let path = self.record_path("status", sheet_id)?;
        Ok(Self::read_record(&path)
            .await?
            .unwrap_or_else(ProcessingStatus::unprocessed))
    }
}
