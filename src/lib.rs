pub mod config;
pub mod db;
pub mod error;
pub mod ingestion;
pub mod logging;
pub mod server;

pub use config::{IngestConfig, MalformedRows, PipelineOptions};
pub use error::{IngestError, Result};
pub use ingestion::{IngestionReport, IngestionStatus, PipelineDriver, TargetRecord};
