//! HTTP API tests driven through the router

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use course_sheets::api::handlers::{health, ApiResponse};
use course_sheets::api::server::{router, ApiConfig, AppState};
use course_sheets::grid::FileGridSource;
use course_sheets::orchestrator::{OrchestratorSettings, ProcessingOrchestrator};
use course_sheets::store::InMemoryContentStore;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

fn upstream_grid() -> Value {
    json!({ "sheets": [{
        "properties": { "title": "Schedule" },
        "data": [{ "rowData": [
            { "values": [ {"formattedValue": "Week"}, {"formattedValue": "Topic"} ] },
            { "values": [ {"formattedValue": "1"}, {"formattedValue": "Intro", "hyperlink": "https://x.test/1"} ] },
            { "values": [ {"formattedValue": "2"}, {"formattedValue": "Traits"} ] },
            { "values": [ {"formattedValue": "3"}, {"formattedValue": "Async"} ] },
        ]}],
        "merges": [ {"startRowIndex": 2, "endRowIndex": 4, "startColumnIndex": 0, "endColumnIndex": 1} ],
    }]})
}

/// Router over an in-memory store and a directory of upstream payloads
fn app() -> (Router, TempDir) {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("sheet123.json"),
        serde_json::to_vec(&upstream_grid()).unwrap(),
    )
    .unwrap();

    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        Arc::new(InMemoryContentStore::new()),
        Arc::new(FileGridSource::new(dir.path())),
        OrchestratorSettings::default(),
    ));
    (router(Arc::new(AppState::new(orchestrator))), dir)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).unwrap())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn register(app: &Router) {
    let (status, _) = send(
        app,
        "POST",
        "/api/v1/sheets",
        Some(json!({
            "id": "schedule",
            "courseId": "cs101",
            "name": "Schedule",
            "spreadsheet": "https://docs.google.com/spreadsheets/d/sheet123/edit",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIG AND STATE
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_default() {
    let config = ApiConfig::default();
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.port, 8080);
}

#[test]
fn test_app_state_version() {
    let orchestrator = Arc::new(ProcessingOrchestrator::new(
        Arc::new(InMemoryContentStore::new()),
        Arc::new(FileGridSource::new("/nonexistent")),
        OrchestratorSettings::default(),
    ));
    let state = AppState::new(orchestrator);
    assert_eq!(state.version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_api_response_ok() {
    let response: ApiResponse<String> = ApiResponse::ok("x".to_string());
    assert!(response.success);
    assert_eq!(response.request_id.len(), 36);
}

// ═══════════════════════════════════════════════════════════════════════════
// INFO ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_health_handler() {
    use axum::response::IntoResponse;
    let response = health().await.into_response();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["data"]["status"], "healthy");
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let (app, _dir) = app();
    let (status, body) = send(&app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["endpoints"].as_array().unwrap().len() >= 10);
}

// ═══════════════════════════════════════════════════════════════════════════
// SHEETS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_register_and_get_sheet() {
    let (app, _dir) = app();
    register(&app).await;

    let (status, body) = send(&app, "GET", "/api/v1/sheets/schedule", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["spreadsheetId"], "sheet123");
    assert_eq!(body["data"]["requiresMembership"], true);
}

#[tokio::test]
async fn test_register_rejects_bad_spreadsheet() {
    let (app, _dir) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/sheets",
        Some(json!({ "courseId": "c", "name": "n", "spreadsheet": "https://example.com/x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_sheet_is_404() {
    let (app, _dir) = app();
    let (status, body) = send(&app, "GET", "/api/v1/sheets/nope/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

// ═══════════════════════════════════════════════════════════════════════════
// PROCESSING AND CONTENT
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_process_then_read_content() {
    let (app, _dir) = app();
    register(&app).await;

    let (status, body) = send(&app, "POST", "/api/v1/sheets/schedule/process", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["processedCount"], 3);

    let (status, body) = send(&app, "GET", "/api/v1/sheets/schedule/status", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["rowCount"], 3);

    let (status, body) = send(&app, "GET", "/api/v1/sheets/schedule/content", None).await;
    assert_eq!(status, StatusCode::OK);
    let grid = &body["data"]["content"]["grid"];
    assert_eq!(grid["values"][0], json!(["Week", "Topic"]));
    assert_eq!(grid["hyperlinks"], json!([{ "row": 0, "col": 1, "url": "https://x.test/1" }]));
    assert_eq!(grid["mergedCellsMap"]["2-0"], json!({ "mainCellRow": 1, "mainCellCol": 0 }));
    assert_eq!(body["data"]["needsFallback"], false);
}

#[tokio::test]
async fn test_process_without_body_uses_defaults() {
    let (app, _dir) = app();
    register(&app).await;
    let (status, body) = send(&app, "POST", "/api/v1/sheets/schedule/process", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
}

#[tokio::test]
async fn test_process_with_malformed_options_is_bad_request() {
    let (app, _dir) = app();
    register(&app).await;
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/sheets/schedule/process",
        Some(json!({ "background": "yes" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Nothing ran
    let (_, body) = send(&app, "GET", "/api/v1/sheets/schedule/status", None).await;
    assert_eq!(body["data"]["processed"], false);
}

#[tokio::test]
async fn test_content_pagination() {
    let (app, _dir) = app();
    register(&app).await;
    send(&app, "POST", "/api/v1/sheets/schedule/process", Some(json!({}))).await;

    let (status, body) = send(&app, "GET", "/api/v1/sheets/schedule/content?page=2&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    let page = &body["data"]["content"];
    assert_eq!(page["page"], 2);
    assert_eq!(page["totalRows"], 3);
    assert_eq!(page["rowOffset"], 2);
    assert_eq!(page["hasMore"], false);
    assert_eq!(page["grid"]["values"][1], json!(["3", "Async"]));
}

#[tokio::test]
async fn test_missing_content_with_fallback() {
    let (app, _dir) = app();
    register(&app).await;

    let (status, _) = send(&app, "GET", "/api/v1/sheets/schedule/content", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        "GET",
        "/api/v1/sheets/schedule/content?fallbackToApi=true",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["needsFallback"], true);
    assert_eq!(body["data"]["spreadsheetId"], "sheet123");
    assert!(body["data"].get("content").is_none());
}

#[tokio::test]
async fn test_clear_content() {
    let (app, _dir) = app();
    register(&app).await;
    send(&app, "POST", "/api/v1/sheets/schedule/process", Some(json!({}))).await;

    let (status, body) = send(&app, "DELETE", "/api/v1/sheets/schedule/content", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], true);

    let (_, body) = send(&app, "GET", "/api/v1/sheets/schedule/status", None).await;
    assert_eq!(body["data"]["processed"], false);
}

#[tokio::test]
async fn test_upstream_failure_is_502() {
    let (app, dir) = app();
    register(&app).await;
    std::fs::write(dir.path().join("sheet123.json"), b"not json").unwrap();

    let (status, body) = send(&app, "POST", "/api/v1/sheets/schedule/process", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_background_process_and_job_poll() {
    let (app, _dir) = app();
    register(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/sheets/schedule/process",
        Some(json!({ "background": true })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["status"], "accepted");
    let job_id = body["data"]["jobId"].as_str().unwrap().to_string();

    let mut state = Value::Null;
    for _ in 0..100 {
        let (status, body) = send(&app, "GET", &format!("/api/v1/jobs/{}", job_id), None).await;
        assert_eq!(status, StatusCode::OK);
        state = body["data"]["state"].clone();
        if state == "completed" || state == "failed" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state, "completed");
}

// ═══════════════════════════════════════════════════════════════════════════
// ACCESS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_access_by_sheet() {
    let (app, _dir) = app();
    register(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/access",
        Some(json!({
            "user": { "id": "u1", "enrollments": [{ "courseId": "cs101" }] },
            "sheetId": "schedule",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["granted"], true);
    assert_eq!(body["data"]["decision"], "granted");
    assert_eq!(body["data"]["reason"], "enrolled");
    assert_eq!(body["data"]["entityId"], "cs101");
}

#[tokio::test]
async fn test_access_denied_for_stranger() {
    let (app, _dir) = app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/v1/access",
        Some(json!({ "user": { "id": "u2" }, "entityId": "cs101" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["granted"], false);
    assert_eq!(body["data"]["decision"], "denied");
}

#[tokio::test]
async fn test_access_requires_target() {
    let (app, _dir) = app();
    let (status, _) = send(&app, "POST", "/api/v1/access", Some(json!({ "user": { "id": "u" } }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
