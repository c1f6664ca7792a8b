//! API request handlers
//!
//! Handlers for all REST API endpoints.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::server::AppState;
use crate::error::SheetError;
use crate::grid::extract_spreadsheet_id;
use crate::orchestrator::{ProcessOptions, ProcessOutcome};
use crate::permission::{AccessDecision, User};
use crate::reconstruct::{reconstruct_page, GridPage, DEFAULT_PAGE_LIMIT};
use crate::types::Sheet;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            request_id: Uuid::new_v4().to_string(),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self
    where
        T: Default,
    {
        Self {
            success: false,
            request_id: Uuid::new_v4().to_string(),
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Error half of every handler: an HTTP status plus the message placed in
/// the `error` field of the envelope.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

/// HTTP status for a library error
pub fn status_for(error: &SheetError) -> StatusCode {
    match error {
        SheetError::NotFound(_) => StatusCode::NOT_FOUND,
        SheetError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        SheetError::UpstreamFetch(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<SheetError> for ApiError {
    fn from(error: SheetError) -> Self {
        Self {
            status: status_for(&error),
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message);
        }
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Root endpoint response
#[derive(Serialize)]
pub struct RootResponse {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: Vec<EndpointInfo>,
}

#[derive(Serialize)]
pub struct EndpointInfo {
    pub path: String,
    pub method: String,
    pub description: String,
}

impl EndpointInfo {
    fn new(method: &str, path: &str, description: &str) -> Self {
        Self {
            path: path.to_string(),
            method: method.to_string(),
            description: description.to_string(),
        }
    }
}

/// GET / - Root info
pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = RootResponse {
        name: "Course Sheets API Server".to_string(),
        version: state.version.clone(),
        description: "Spreadsheet ingestion and grid reconstruction for course portals"
            .to_string(),
        endpoints: vec![
            EndpointInfo::new("GET", "/health", "Health check endpoint"),
            EndpointInfo::new("GET", "/version", "Get server version"),
            EndpointInfo::new("POST", "/api/v1/sheets", "Register a sheet"),
            EndpointInfo::new("GET", "/api/v1/sheets/:id", "Get a registered sheet"),
            EndpointInfo::new("POST", "/api/v1/sheets/:id/process", "Fetch and store a sheet"),
            EndpointInfo::new("GET", "/api/v1/sheets/:id/status", "Processing status"),
            EndpointInfo::new("GET", "/api/v1/sheets/:id/content", "Reconstructed grid page"),
            EndpointInfo::new("DELETE", "/api/v1/sheets/:id/content", "Clear stored content"),
            EndpointInfo::new("GET", "/api/v1/jobs/:id", "Background job status"),
            EndpointInfo::new("POST", "/api/v1/access", "Resolve a user's access"),
        ],
    };
    Json(ApiResponse::ok(response))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_message: String,
}

/// GET /health - Health check
pub async fn health() -> impl IntoResponse {
    Json(ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        uptime_message: "Server is running".to_string(),
    }))
}

/// Version response
#[derive(Serialize)]
pub struct VersionResponse {
    pub version: String,
    pub features: Vec<String>,
}

/// GET /version - Server version
pub async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(VersionResponse {
        version: state.version.clone(),
        features: vec![
            "register".to_string(),
            "process".to_string(),
            "status".to_string(),
            "content".to_string(),
            "access".to_string(),
        ],
    }))
}

/// Register request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSheetRequest {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub course_id: String,
    pub name: String,
    /// Spreadsheet URL or bare id
    pub spreadsheet: String,
    #[serde(default)]
    pub tab: Option<String>,
    #[serde(default)]
    pub requires_membership: Option<bool>,
}

/// POST /api/v1/sheets - Register a sheet
pub async fn register_sheet(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterSheetRequest>,
) -> ApiResult<Json<ApiResponse<Sheet>>> {
    let spreadsheet_id =
        extract_spreadsheet_id(&req.spreadsheet).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let id = req.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut sheet = Sheet::new(id, req.course_id, req.name, spreadsheet_id);
    if let Some(tab) = req.tab {
        sheet = sheet.with_tab(tab);
    }
    if let Some(requires_membership) = req.requires_membership {
        sheet = sheet.with_requires_membership(requires_membership);
    }

    state.store().register_sheet(sheet.clone()).await?;
    Ok(Json(ApiResponse::ok(sheet)))
}

/// GET /api/v1/sheets/:id - Registered sheet
pub async fn get_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Sheet>>> {
    let sheet = state.store().get_sheet(&id).await?;
    Ok(Json(ApiResponse::ok(sheet)))
}

/// POST /api/v1/sheets/:id/process - Fetch, normalize and store
///
/// The body is optional; an empty body means default options, a malformed
/// one is a 400. Background runs answer 202 with a job handle.
pub async fn process_sheet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Response> {
    let options = process_options(&body)?;
    let outcome = state.orchestrator.process(&id, options).await?;
    let status = match outcome {
        ProcessOutcome::Accepted(_) => StatusCode::ACCEPTED,
        ProcessOutcome::Completed(_) => StatusCode::OK,
    };
    Ok((status, Json(ApiResponse::ok(outcome))).into_response())
}

fn process_options(body: &[u8]) -> ApiResult<ProcessOptions> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProcessOptions::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("invalid process options: {}", e)))
}

/// GET /api/v1/sheets/:id/status - Processing status
pub async fn sheet_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let status = state.orchestrator.processing_status(&id).await?;
    Ok(Json(ApiResponse::ok(status)))
}

/// Content query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub fallback_to_api: bool,
}

/// Content response
///
/// When nothing is stored and the caller asked for a fallback, `needsFallback`
/// is set and `content` is absent; the client reads the spreadsheet itself.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentResponse {
    pub sheet_id: String,
    pub needs_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<GridPage>,
}

/// GET /api/v1/sheets/:id/content - Reconstructed grid page
pub async fn sheet_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ContentQuery>,
) -> ApiResult<Json<ApiResponse<ContentResponse>>> {
    let sheet = state.store().get_sheet(&id).await?;

    let content = match state.store().get_content(&id).await {
        Ok(content) => content,
        Err(SheetError::NotFound(_)) if query.fallback_to_api => {
            return Ok(Json(ApiResponse::ok(ContentResponse {
                sheet_id: sheet.id,
                needs_fallback: true,
                spreadsheet_id: Some(sheet.spreadsheet_id),
                content: None,
            })));
        }
        Err(e) => return Err(e.into()),
    };

    let page = reconstruct_page(
        &content,
        query.page.unwrap_or(1),
        query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
    );
    Ok(Json(ApiResponse::ok(ContentResponse {
        sheet_id: sheet.id,
        needs_fallback: false,
        spreadsheet_id: None,
        content: Some(page),
    })))
}

/// Clear response
#[derive(Serialize, Default)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// DELETE /api/v1/sheets/:id/content - Drop stored content
pub async fn clear_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<ClearResponse>>> {
    state.store().get_sheet(&id).await?;
    state.orchestrator.invalidate_fetch_cache(&id).await;
    let cleared = state.store().clear_content(&id).await?;
    Ok(Json(ApiResponse::ok(ClearResponse { cleared })))
}

/// GET /api/v1/jobs/:id - Background job status
pub async fn job_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let job = state.orchestrator.job_status(job_id).await?;
    Ok(Json(ApiResponse::ok(job)))
}

/// Access request; either `sheetId` or `entityId` names the target
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub user: User,
    #[serde(default)]
    pub sheet_id: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default = "default_requires_membership")]
    pub requires_membership: bool,
}

fn default_requires_membership() -> bool {
    true
}

/// Access response
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub entity_id: String,
    pub granted: bool,
    #[serde(flatten)]
    pub decision: AccessDecision,
}

/// POST /api/v1/access - Resolve access for a user
pub async fn check_access(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<Json<ApiResponse<AccessResponse>>> {
    let (entity_id, requires_membership) = match (req.sheet_id, req.entity_id) {
        (Some(sheet_id), _) => {
            let sheet = state.store().get_sheet(&sheet_id).await?;
            (sheet.course_id, sheet.requires_membership)
        }
        (None, Some(entity_id)) => (entity_id, req.requires_membership),
        (None, None) => return Err(ApiError::bad_request("sheetId or entityId is required")),
    };

    let decision = state
        .resolver
        .decide(&req.user, &entity_id, requires_membership);
    Ok(Json(ApiResponse::ok(AccessResponse {
        entity_id,
        granted: decision.is_granted(),
        decision,
    })))
}
