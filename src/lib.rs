//! Course Sheets - spreadsheet ingestion for course portals
//!
//! This library fetches spreadsheet tabs from an upstream provider, flattens
//! them into normalized rows, stores them, and rebuilds a display grid
//! (values, hyperlinks, merged cells) on demand.
//!
//! # Features
//!
//! - Tolerant parsing of the upstream grid payload
//! - Per-row normalization; one bad row never fails the sheet
//! - Full or optimized hyperlink storage
//! - Merge-aware grid reconstruction with pagination
//! - Versioned client-side cache with TTL and slot eviction
//! - Course membership access resolution
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use course_sheets::grid::FileGridSource;
//! use course_sheets::orchestrator::{OrchestratorSettings, ProcessOptions, ProcessingOrchestrator};
//! use course_sheets::store::{ContentStore, InMemoryContentStore};
//! use course_sheets::types::Sheet;
//!
//! # async fn run() -> course_sheets::SheetResult<()> {
//! let store = Arc::new(InMemoryContentStore::new());
//! store.register_sheet(Sheet::new("grades", "cs101", "Grades", "abc123")).await?;
//!
//! let orchestrator = Arc::new(ProcessingOrchestrator::new(
//!     store.clone(),
//!     Arc::new(FileGridSource::new("./upstream")),
//!     OrchestratorSettings::default(),
//! ));
//! orchestrator.process("grades", ProcessOptions::default()).await?;
//!
//! let content = store.get_content("grades").await?;
//! let grid = course_sheets::reconstruct::reconstruct(&content);
//! println!("rows: {}", grid.row_count());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod grid;
pub mod orchestrator;
pub mod permission;
pub mod reconstruct;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{SheetError, SheetResult};
pub use types::{MergeRange, NormalizedRow, ReconstructedGrid, Sheet, SheetContent, StorageMode};
