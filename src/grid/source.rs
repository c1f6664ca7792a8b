//! Upstream grid sources
//!
//! The fetch itself is opaque to the pipeline: a source hands back the raw
//! JSON payload and the parser takes it from there.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::error::{SheetError, SheetResult};
use crate::types::Sheet;

/// Something that can fetch the raw grid payload for a sheet
#[async_trait]
pub trait GridSource: Send + Sync {
    async fn fetch_sheet(&self, sheet: &Sheet) -> SheetResult<serde_json::Value>;
}

/// Fetches grids over HTTP from a provider endpoint.
///
/// `url_template` must contain `{spreadsheet_id}`; an API key, when set, is
/// passed as the `key` query parameter.
pub struct HttpGridSource {
    client: reqwest::Client,
    url_template: String,
    api_key: Option<String>,
}

impl HttpGridSource {
    pub fn new(
        url_template: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> SheetResult<Self> {
        let url_template = url_template.into();
        if !url_template.contains("{spreadsheet_id}") {
            return Err(SheetError::Config(format!(
                "upstream url '{}' has no {{spreadsheet_id}} placeholder",
                url_template
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SheetError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url_template,
            api_key,
        })
    }

    pub fn url_for(&self, sheet: &Sheet) -> String {
        self.url_template
            .replace("{spreadsheet_id}", &sheet.spreadsheet_id)
    }
}

#[async_trait]
impl GridSource for HttpGridSource {
    async fn fetch_sheet(&self, sheet: &Sheet) -> SheetResult<serde_json::Value> {
        let url = self.url_for(sheet);
        debug!(sheet_id = %sheet.id, %url, "fetching upstream grid");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SheetError::UpstreamFetch(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SheetError::UpstreamFetch(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SheetError::UpstreamFetch(format!("invalid JSON from {}: {}", url, e)))
    }
}

/// Reads grids from `<dir>/<spreadsheet_id>.json`
pub struct FileGridSource {
    dir: PathBuf,
}

impl FileGridSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, sheet: &Sheet) -> PathBuf {
        self.dir.join(format!("{}.json", sheet.spreadsheet_id))
    }
}

#[async_trait]
impl GridSource for FileGridSource {
    async fn fetch_sheet(&self, sheet: &Sheet) -> SheetResult<serde_json::Value> {
        let path = self.path_for(sheet);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            SheetError::UpstreamFetch(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            SheetError::UpstreamFetch(format!("invalid JSON in {}: {}", path.display(), e))
        })
    }
}

/// Extract the spreadsheet id from a share URL, or accept a bare id
pub fn extract_spreadsheet_id(input: &str) -> SheetResult<String> {
    let input = input.trim();

    let url_pattern = Regex::new(r"/spreadsheets/d/([A-Za-z0-9_-]+)")
        .map_err(|e| SheetError::Config(format!("Regex error: {}", e)))?;
    if let Some(captures) = url_pattern.captures(input) {
        if let Some(id) = captures.get(1) {
            return Ok(id.as_str().to_string());
        }
    }

    let bare_pattern = Regex::new(r"^[A-Za-z0-9_-]+$")
        .map_err(|e| SheetError::Config(format!("Regex error: {}", e)))?;
    if bare_pattern.is_match(input) {
        return Ok(input.to_string());
    }

    Err(SheetError::NotFound(format!(
        "no spreadsheet id in '{}'",
        input
    )))
}
