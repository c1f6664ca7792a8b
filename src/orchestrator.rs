//! Fetch → parse → normalize → store, for one sheet at a time
//!
//! Runs either inline (the caller waits for the report) or as a background
//! job (the caller gets a handle and polls). Stored content is only replaced
//! once every row has been normalized; a failed fetch leaves it untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{SheetError, SheetResult};
use crate::grid::upstream::CellData;
use crate::grid::{normalize_batch, parse_payload, GridSource, RowFailure};
use crate::store::ContentStore;
use crate::types::{NormalizedRow, ProcessingStatus, Sheet, SheetContent, StorageMode};

/// Options accepted by the processing trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessOptions {
    pub use_cache: bool,
    pub force_refresh: bool,
    pub background: bool,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            force_refresh: false,
            background: false,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    pub sheet_id: String,
    pub processed_count: usize,
    pub errors: Vec<RowFailure>,
    pub processed_at: DateTime<Utc>,
    /// Whether the upstream payload came from the fetch cache
    pub from_cache: bool,
    pub storage_mode: StorageMode,
}

/// Acknowledgement for a background run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessHandle {
    pub job_id: Uuid,
    pub sheet_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ProcessOutcome {
    Accepted(ProcessHandle),
    Completed(ProcessReport),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum JobState {
    Queued,
    Running,
    Completed { report: ProcessReport },
    Failed { message: String },
}

impl JobState {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed { .. } | JobState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: Uuid,
    pub sheet_id: String,
    #[serde(flatten)]
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Tunables for a processing orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub fetch_timeout: Duration,
    pub fetch_cache_ttl: Duration,
    pub chunk_size: usize,
    pub storage_mode: StorageMode,
    /// How long a finished background job stays pollable
    pub job_retention: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            fetch_cache_ttl: Duration::from_secs(300),
            chunk_size: 256,
            storage_mode: StorageMode::Full,
            job_retention: Duration::from_secs(3600),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            fetch_timeout: config.upstream_timeout(),
            fetch_cache_ttl: config.fetch_cache_ttl(),
            chunk_size: config.processing.chunk_size.max(1),
            storage_mode: config.processing.storage_mode,
            job_retention: config.job_retention(),
        }
    }
}

struct CachedFetch {
    payload: Arc<serde_json::Value>,
    fetched_at: Instant,
}

pub struct ProcessingOrchestrator {
    store: Arc<dyn ContentStore>,
    source: Arc<dyn GridSource>,
    settings: OrchestratorSettings,
    fetch_cache: RwLock<HashMap<String, CachedFetch>>,
    jobs: RwLock<HashMap<Uuid, JobStatus>>,
}

impl ProcessingOrchestrator {
    pub fn new(
        store: Arc<dyn ContentStore>,
        source: Arc<dyn GridSource>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            store,
            source,
            settings,
            fetch_cache: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Process one sheet.
    ///
    /// Unknown sheets fail with `NotFound` in both modes. In background mode
    /// the run is spawned and a handle is returned immediately.
    pub async fn process(
        self: &Arc<Self>,
        sheet_id: &str,
        options: ProcessOptions,
    ) -> SheetResult<ProcessOutcome> {
        let sheet = self.store.get_sheet(sheet_id).await?;

        if !options.background {
            return self.run(&sheet, options).await.map(ProcessOutcome::Completed);
        }

        self.prune_jobs().await;

        let job_id = Uuid::new_v4();
        let handle = ProcessHandle {
            job_id,
            sheet_id: sheet.id.clone(),
        };
        self.jobs.write().await.insert(
            job_id,
            JobStatus {
                job_id,
                sheet_id: sheet.id.clone(),
                state: JobState::Queued,
                submitted_at: Utc::now(),
                finished_at: None,
            },
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.set_job_state(job_id, JobState::Running).await;
            let state = match this.run(&sheet, options).await {
                Ok(report) => JobState::Completed { report },
                Err(e) => {
                    warn!(sheet_id = %sheet.id, %job_id, error = %e, "background processing failed");
                    JobState::Failed {
                        message: e.to_string(),
                    }
                }
            };
            this.set_job_state(job_id, state).await;
        });

        info!(sheet_id = %handle.sheet_id, %job_id, "background processing queued");
        Ok(ProcessOutcome::Accepted(handle))
    }

    pub async fn job_status(&self, job_id: Uuid) -> SheetResult<JobStatus> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .cloned()
            .ok_or_else(|| SheetError::NotFound(format!("job '{}'", job_id)))
    }

    /// Forget finished jobs older than the retention window; returns how
    /// many were dropped. Queued and running jobs are always kept.
    pub async fn prune_jobs(&self) -> usize {
        let retention = self.settings.job_retention;
        let now = Utc::now();
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| match job.finished_at {
            Some(finished_at) => (now - finished_at)
                .to_std()
                .map_or(true, |age| age < retention),
            None => true,
        });
        let dropped = before - jobs.len();
        if dropped > 0 {
            debug!(dropped, remaining = jobs.len(), "pruned finished jobs");
        }
        dropped
    }

    pub async fn processing_status(&self, sheet_id: &str) -> SheetResult<ProcessingStatus> {
        self.store.get_processing_status(sheet_id).await
    }

    /// Drop the cached upstream payload for a sheet
    pub async fn invalidate_fetch_cache(&self, sheet_id: &str) -> bool {
        self.fetch_cache.write().await.remove(sheet_id).is_some()
    }

    async fn set_job_state(&self, job_id: Uuid, state: JobState) {
        if let Some(job) = self.jobs.write().await.get_mut(&job_id) {
            if state.is_finished() {
                job.finished_at = Some(Utc::now());
            }
            job.state = state;
        }
    }

    async fn run(&self, sheet: &Sheet, options: ProcessOptions) -> SheetResult<ProcessReport> {
        let started = Instant::now();
        let (payload, from_cache) = self.load_payload(sheet, options).await?;

        let parsed = parse_payload(&payload, sheet.tab.as_deref())?;
        let width = parsed.width();
        debug!(
            sheet_id = %sheet.id,
            title = %parsed.title,
            rows = parsed.data_rows.len(),
            width,
            "parsed upstream grid"
        );

        let (rows, mut errors) = self.normalize_rows(parsed.data_rows, width).await;
        errors.sort_by_key(|e| e.row_index);
        for failure in &errors {
            warn!(sheet_id = %sheet.id, row = failure.row_index, "skipping row: {}", failure.message);
        }

        let processed_count = rows.len();
        let error_count = errors.len();
        let content = SheetContent::build(
            sheet.id.clone(),
            parsed.header,
            rows,
            parsed.merges,
            self.settings.storage_mode,
        )
        .with_error_count(error_count);
        let processed_at = content.processed_at;
        self.store.put_content(content).await?;

        info!(
            sheet_id = %sheet.id,
            processed_count,
            errors = errors.len(),
            from_cache,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sheet processed"
        );

        Ok(ProcessReport {
            sheet_id: sheet.id.clone(),
            processed_count,
            errors,
            processed_at,
            from_cache,
            storage_mode: self.settings.storage_mode,
        })
    }

    async fn load_payload(
        &self,
        sheet: &Sheet,
        options: ProcessOptions,
    ) -> SheetResult<(Arc<serde_json::Value>, bool)> {
        if options.use_cache && !options.force_refresh {
            if let Some(cached) = self.fetch_cache.read().await.get(&sheet.id) {
                if cached.fetched_at.elapsed() < self.settings.fetch_cache_ttl {
                    debug!(sheet_id = %sheet.id, "using cached upstream payload");
                    return Ok((Arc::clone(&cached.payload), true));
                }
            }
        }

        let fetched = tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch_sheet(sheet))
            .await
            .map_err(|_| {
                SheetError::UpstreamFetch(format!(
                    "fetch for sheet '{}' timed out after {:?}",
                    sheet.id, self.settings.fetch_timeout
                ))
            })??;

        let payload = Arc::new(fetched);
        self.fetch_cache.write().await.insert(
            sheet.id.clone(),
            CachedFetch {
                payload: Arc::clone(&payload),
                fetched_at: Instant::now(),
            },
        );
        Ok((payload, false))
    }

    /// Normalize rows in chunks on the blocking pool, then reassemble by
    /// row index.
    async fn normalize_rows(
        &self,
        data_rows: Vec<Vec<CellData>>,
        width: usize,
    ) -> (Vec<NormalizedRow>, Vec<RowFailure>) {
        let chunk_size = self.settings.chunk_size.max(1);
        let mut tasks = Vec::new();
        let mut first = 0;
        let mut remaining = data_rows.into_iter();
        loop {
            let chunk: Vec<Vec<CellData>> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();
            let handle =
                tokio::task::spawn_blocking(move || normalize_batch(first, &chunk, width));
            tasks.push((first, len, handle));
            first += len;
        }

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (first, len, handle) in tasks {
            match handle.await {
                Ok((normalized, failures)) => {
                    rows.extend(normalized);
                    errors.extend(failures);
                }
                Err(e) => {
                    errors.extend((first..first + len).map(|row_index| RowFailure {
                        row_index,
                        message: format!("normalization task failed: {}", e),
                    }));
                }
            }
        }

        rows.sort_by_key(|r| r.row_index);
        (rows, errors)
    }
}
