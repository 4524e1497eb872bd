use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("CSV file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("Batch {sequence} ({rows} rows) failed to write: {source}")]
    Write {
        sequence: u64,
        rows: usize,
        #[source]
        source: Box<IngestError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),
}

impl IngestError {
    pub fn malformed(line: u64, reason: impl Into<String>) -> Self {
        IngestError::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_error_names_batch() {
        let err = IngestError::Write {
            sequence: 2,
            rows: 1000,
            source: Box::new(IngestError::Store("connection reset".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Batch 2 (1000 rows) failed to write: Store error: connection reset"
        );
    }

    #[test]
    fn test_malformed_names_line() {
        let err = IngestError::malformed(7, "too many values");
        assert_eq!(err.to_string(), "Malformed record on line 7: too many values");
    }
}
