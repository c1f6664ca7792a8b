use thiserror::Error;

pub type SheetResult<T> = Result<T, SheetError>;

#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream fetch failed: {0}")]
    UpstreamFetch(String),

    #[error("Row {row_index} could not be normalized: {message}")]
    RowNormalization { row_index: usize, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SheetError {
    /// Short machine-readable code used in API responses and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            SheetError::NotFound(_) => "not_found",
            SheetError::UpstreamFetch(_) => "upstream_fetch",
            SheetError::RowNormalization { .. } => "row_normalization",
            SheetError::PermissionDenied(_) => "permission_denied",
            SheetError::Storage(_) => "storage",
            SheetError::Config(_) => "config",
            SheetError::Io(_) => "io",
            SheetError::Json(_) => "json",
            SheetError::Yaml(_) => "yaml",
        }
    }
}
