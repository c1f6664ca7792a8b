//! Content store behavior, shared by the in-memory and file stores

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use course_sheets::error::SheetError;
use course_sheets::store::{ContentStore, FileContentStore, InMemoryContentStore};
use course_sheets::types::{MergeRange, NormalizedRow, Sheet, SheetContent, StorageMode, UrlEntry};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

fn row(index: usize, value: &str) -> NormalizedRow {
    NormalizedRow {
        row_index: index,
        columns: BTreeMap::from([(0, value.to_string())]),
        urls: vec![],
    }
}

fn content(sheet_id: &str, values: &[&str]) -> SheetContent {
    let rows = values.iter().enumerate().map(|(i, v)| row(i, v)).collect();
    SheetContent::build(sheet_id, vec!["A".into()], rows, vec![], StorageMode::Full)
}

async fn stores() -> Vec<(Arc<dyn ContentStore>, Option<tempfile::TempDir>)> {
    let dir = tempfile::TempDir::new().unwrap();
    vec![
        (Arc::new(InMemoryContentStore::new()), None),
        (Arc::new(FileContentStore::new(dir.path())), Some(dir)),
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
// SHEETS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_register_and_list_by_course() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("b", "cs101", "B", "x")).await.unwrap();
        store.register_sheet(Sheet::new("a", "cs101", "A", "y")).await.unwrap();
        store.register_sheet(Sheet::new("c", "cs202", "C", "z")).await.unwrap();

        let ids: Vec<String> = store
            .list_sheets(Some("cs101"))
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list_sheets(None).await.unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_unknown_sheet_is_not_found() {
    for (store, _dir) in stores().await {
        assert!(matches!(
            store.get_sheet("nope").await,
            Err(SheetError::NotFound(_))
        ));
        assert!(matches!(
            store.put_content(content("nope", &["x"])).await,
            Err(SheetError::NotFound(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// CONTENT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_replace_is_wholesale() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();

        store.put_content(content("s", &["1", "2", "3"])).await.unwrap();
        store.put_content(content("s", &["only"])).await.unwrap();

        let stored = store.get_content("s").await.unwrap();
        assert_eq!(stored.rows.len(), 1);
        assert_eq!(stored.rows[0].column(0), "only");
    }
}

#[tokio::test]
async fn test_identical_payload_refreshes_timestamp() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();

        let first = content("s", &["1"]);
        let first_at = first.processed_at;
        store.put_content(first).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let second = content("s", &["1"]);
        let second_at = second.processed_at;
        assert!(second_at > first_at);
        store.put_content(second).await.unwrap();

        let status = store.get_processing_status("s").await.unwrap();
        assert_eq!(status.processed_at, Some(second_at));
        let stored = store.get_content("s").await.unwrap();
        assert_eq!(stored.processed_at, second_at);
        assert!(stored.same_payload(&content("s", &["1"])));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reads_see_whole_versions() {
    let old = vec!["old"; 2_000];
    let new = vec!["new"; 2_000];

    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
        store.put_content(content("s", &old)).await.unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                let done = Arc::clone(&done);
                tokio::spawn(async move {
                    let mut seen = Vec::new();
                    loop {
                        let last_pass = done.load(Ordering::SeqCst);
                        let stored = store.get_content("s").await.unwrap();
                        assert_eq!(stored.rows.len(), 2_000);
                        let first = stored.rows[0].column(0).to_string();
                        assert!(
                            stored.rows.iter().all(|r| r.column(0) == first),
                            "read mixed rows from two versions"
                        );
                        seen.push(first);
                        if last_pass {
                            break;
                        }
                        tokio::task::yield_now().await;
                    }
                    seen
                })
            })
            .collect();

        for _ in 0..5 {
            store.put_content(content("s", &new)).await.unwrap();
            store.put_content(content("s", &old)).await.unwrap();
        }
        store.put_content(content("s", &new)).await.unwrap();
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            let seen = reader.await.unwrap();
            assert!(seen.iter().all(|v| v == "old" || v == "new"));
            assert_eq!(seen.last().map(String::as_str), Some("new"));
        }
    }
}

#[tokio::test]
async fn test_status_projection() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();

        let status = store.get_processing_status("s").await.unwrap();
        assert!(!status.processed);
        assert_eq!(status.row_count, 0);

        store
            .put_content(content("s", &["1", "2"]).with_error_count(1))
            .await
            .unwrap();
        let status = store.get_processing_status("s").await.unwrap();
        assert!(status.processed);
        assert_eq!(status.row_count, 2);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.storage_mode, Some(StorageMode::Full));
    }
}

#[tokio::test]
async fn test_clear_content() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
        store.put_content(content("s", &["1"])).await.unwrap();

        assert!(store.clear_content("s").await.unwrap());
        assert!(!store.clear_content("s").await.unwrap());
        assert!(matches!(
            store.get_content("s").await,
            Err(SheetError::NotFound(_))
        ));
        assert!(!store.get_processing_status("s").await.unwrap().processed);
    }
}

#[tokio::test]
async fn test_replace_content_optimized_mode() {
    for (store, _dir) in stores().await {
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();

        let mut linked = row(0, "doc");
        linked.urls = vec![UrlEntry::new(0, "https://x.test/doc")];
        store
            .replace_content(
                "s",
                vec!["A".into()],
                vec![linked],
                vec![MergeRange::new(0, 1, 0, 1)],
                StorageMode::Optimized,
            )
            .await
            .unwrap();

        let stored = store.get_content("s").await.unwrap();
        assert_eq!(stored.storage_mode(), StorageMode::Optimized);
        assert!(stored.rows[0].urls.is_empty());
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// FILE STORE
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    {
        let store = FileContentStore::new(dir.path());
        store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
        store.put_content(content("s", &["kept"])).await.unwrap();
    }

    let reopened = FileContentStore::new(dir.path());
    let stored = reopened.get_content("s").await.unwrap();
    assert_eq!(stored.rows[0].column(0), "kept");
}

#[tokio::test]
async fn test_file_store_leaves_no_temp_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileContentStore::new(dir.path());
    store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
    store.put_content(content("s", &["1"])).await.unwrap();
    store.put_content(content("s", &["2"])).await.unwrap();

    let names: Vec<String> = std::fs::read_dir(dir.path().join("content"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["s.json"]);
}

#[tokio::test]
async fn test_file_store_rejects_path_ids() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileContentStore::new(dir.path());
    let result = store.register_sheet(Sheet::new("../evil", "c", "S", "x")).await;
    assert!(matches!(result, Err(SheetError::Storage(_))));
}

fn file_names(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_file_store_status_dir_unwritable_keeps_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileContentStore::new(dir.path());
    store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
    store.put_content(content("s", &["old"])).await.unwrap();

    // A plain file where the status directory should be
    std::fs::remove_dir_all(dir.path().join("status")).unwrap();
    std::fs::write(dir.path().join("status"), b"").unwrap();

    let result = store.put_content(content("s", &["new", "new"])).await;
    assert!(matches!(result, Err(SheetError::Storage(_))));

    let stored = store.get_content("s").await.unwrap();
    assert_eq!(stored.rows.len(), 1);
    assert_eq!(stored.rows[0].column(0), "old");
    assert_eq!(file_names(&dir.path().join("content")), vec!["s.json"]);
}

#[tokio::test]
async fn test_file_store_failed_status_commit_restores_content() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileContentStore::new(dir.path());
    store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();
    store.put_content(content("s", &["old"])).await.unwrap();

    // A non-empty directory at the status path makes the final rename fail
    let status_file = dir.path().join("status").join("s.json");
    std::fs::remove_file(&status_file).unwrap();
    std::fs::create_dir_all(status_file.join("blocker")).unwrap();

    let result = store.put_content(content("s", &["new", "new"])).await;
    assert!(matches!(result, Err(SheetError::Storage(_))));

    let stored = store.get_content("s").await.unwrap();
    assert_eq!(stored.rows.len(), 1);
    assert_eq!(stored.rows[0].column(0), "old");
    assert_eq!(file_names(&dir.path().join("content")), vec!["s.json"]);
    assert_eq!(file_names(&dir.path().join("status")), vec!["s.json"]);
}

#[tokio::test]
async fn test_file_store_failed_first_commit_leaves_nothing() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = FileContentStore::new(dir.path());
    store.register_sheet(Sheet::new("s", "c", "S", "x")).await.unwrap();

    std::fs::create_dir_all(dir.path().join("status").join("s.json").join("blocker")).unwrap();

    let result = store.put_content(content("s", &["new"])).await;
    assert!(matches!(result, Err(SheetError::Storage(_))));
    assert!(matches!(
        store.get_content("s").await,
        Err(SheetError::NotFound(_))
    ));
}
