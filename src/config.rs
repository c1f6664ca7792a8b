//! Service configuration
//!
//! Loaded from an optional YAML file; every section falls back to defaults,
//! so an empty file (or no file) is a valid configuration.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8080
//! storage:
//!   data_dir: /var/lib/course-sheets
//! upstream:
//!   base_url: "https://sheets.googleapis.com/v4/spreadsheets/{spreadsheet_id}?includeGridData=true"
//!   api_key: "..."
//!   timeout_secs: 30
//! processing:
//!   fetch_cache_ttl_secs: 300
//!   chunk_size: 256
//!   storage_mode: optimized
//! cache:
//!   version: "2"
//!   max_slots: 5
//!   default_ttl_secs: 300
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::server::ApiConfig;
use crate::error::{SheetError, SheetResult};
use crate::grid::{FileGridSource, GridSource, HttpGridSource};
use crate::types::StorageMode;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ApiConfig,
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
    pub processing: ProcessingConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./sheet-data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// URL template containing `{spreadsheet_id}`; files under
    /// `<data_dir>/upstream` are used when unset
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub fetch_cache_ttl_secs: u64,
    /// Rows per normalization task
    pub chunk_size: usize,
    pub storage_mode: StorageMode,
    /// Finished background jobs are forgotten after this long
    pub job_retention_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            fetch_cache_ttl_secs: 300,
            chunk_size: 256,
            storage_mode: StorageMode::Full,
            job_retention_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Bumping this invalidates every client-side entry
    pub version: String,
    pub max_slots: usize,
    pub default_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: "2".to_string(),
            max_slots: 5,
            default_ttl_secs: 300,
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> SheetResult<Self> {
        let config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    SheetError::Config(format!("cannot read {}: {}", p.display(), e))
                })?;
                Self::from_yaml_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> SheetResult<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn validate(&self) -> SheetResult<()> {
        if self.upstream.timeout_secs == 0 {
            return Err(SheetError::Config("upstream.timeout_secs must be > 0".into()));
        }
        if self.processing.chunk_size == 0 {
            return Err(SheetError::Config("processing.chunk_size must be > 0".into()));
        }
        if self.cache.max_slots == 0 {
            return Err(SheetError::Config("cache.max_slots must be > 0".into()));
        }
        if self.cache.version.trim().is_empty() {
            return Err(SheetError::Config("cache.version must not be empty".into()));
        }
        if let Some(url) = &self.upstream.base_url {
            if !url.contains("{spreadsheet_id}") {
                return Err(SheetError::Config(
                    "upstream.base_url must contain {spreadsheet_id}".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    pub fn fetch_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.processing.fetch_cache_ttl_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.processing.job_retention_secs)
    }

    pub fn upstream_dir(&self) -> PathBuf {
        self.storage.data_dir.join("upstream")
    }

    /// Grid source selected by `upstream.base_url`
    pub fn grid_source(&self) -> SheetResult<Arc<dyn GridSource>> {
        match &self.upstream.base_url {
            Some(url) => Ok(Arc::new(HttpGridSource::new(
                url.clone(),
                self.upstream.api_key.clone(),
                self.upstream_timeout(),
            )?)),
            None => Ok(Arc::new(FileGridSource::new(self.upstream_dir()))),
        }
    }
}
