//! Ingestion Module - streams a CSV file into the `users` table
//!
//! Line source -> header parser -> nested field assigner -> record
//! transformer -> batch accumulator -> batch writer, driven by the
//! pipeline driver.

pub mod batch;
pub mod header;
pub mod line_source;
pub mod pipeline;
pub mod record;
pub mod transform;

pub use batch::{Batch, BatchAccumulator, BatchWriter};
pub use header::{FieldPath, Header};
pub use line_source::{LineSource, SourceLine};
pub use pipeline::{ingest_file, PipelineDriver, PipelineState};
pub use record::{assemble, RawNode, RawRecord, RawValue};
pub use transform::{transform, TargetRecord};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ingestion result
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionReport {
    /// Ingestion run ID
    pub run_id: Uuid,

    pub status: IngestionStatus,

    /// Every line read, header and blank lines included
    pub lines_read: u64,

    /// Non-blank lines after the header
    pub data_lines: u64,

    pub blank_lines: u64,

    /// Malformed lines dropped under the skip policy
    pub skipped_lines: u64,

    /// `age` values that were not integers and fell back to 0
    pub age_parse_warnings: u64,

    pub records_produced: u64,

    pub batches_submitted: u64,
    pub batches_written: u64,
    pub rows_written: u64,

    pub failed_batches: Vec<BatchFailure>,

    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    pub error: Option<String>,
}

impl IngestionReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: IngestionStatus::Running,
            lines_read: 0,
            data_lines: 0,
            blank_lines: 0,
            skipped_lines: 0,
            age_parse_warnings: 0,
            records_produced: 0,
            batches_submitted: 0,
            batches_written: 0,
            rows_written: 0,
            failed_batches: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            error: None,
        }
    }

    /// Run finished reading the whole file (batch failures allowed)
    pub fn is_success(&self) -> bool {
        matches!(self.status, IngestionStatus::Success | IngestionStatus::Partial)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IngestionStatus {
    Running,
    Success,
    /// Every line was consumed but at least one batch failed to write
    Partial,
    Failed,
}

/// One batch the store rejected
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchFailure {
    pub sequence: u64,
    pub rows: usize,
    pub message: String,
}
