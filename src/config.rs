//! Process configuration loaded from the environment (and `.env`)

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_WRITE_QUEUE_DEPTH: usize = 2;

/// What to do with a line that cannot be turned into a record
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRows {
    /// Fail the run on the first malformed line
    #[default]
    Abort,
    /// Log the line, count it and keep going
    Skip,
}

impl FromStr for MalformedRows {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "abort" => Ok(MalformedRows::Abort),
            "skip" => Ok(MalformedRows::Skip),
            other => Err(IngestError::Config(format!(
                "MALFORMED_ROWS must be 'abort' or 'skip', got '{}'",
                other
            ))),
        }
    }
}

/// Options the pipeline driver needs for one run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub malformed_rows: MalformedRows,
    pub write_queue_depth: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            malformed_rows: MalformedRows::Abort,
            write_queue_depth: DEFAULT_WRITE_QUEUE_DEPTH,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IngestConfig {
    pub csv_path: PathBuf,
    pub database_url: String,
    pub batch_size: usize,
    pub port: u16,
    pub malformed_rows: MalformedRows,
    pub write_queue_depth: usize,
}

impl IngestConfig {
    /// Read configuration from process environment variables.
    ///
    /// Call `dotenv::dotenv().ok()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (used by tests to avoid touching the process env)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let csv_path = lookup("CSV_FILE_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| IngestError::Config("CSV_FILE_PATH is not set".to_string()))?;

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| IngestError::Config("DATABASE_URL is not set".to_string()))?;

        let batch_size = parse_or(&lookup, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let write_queue_depth = parse_or(&lookup, "WRITE_QUEUE_DEPTH", DEFAULT_WRITE_QUEUE_DEPTH)?;
        let malformed_rows = match lookup("MALFORMED_ROWS") {
            Some(v) => v.parse()?,
            None => MalformedRows::default(),
        };

        let config = Self {
            csv_path,
            database_url,
            batch_size,
            port,
            malformed_rows,
            write_queue_depth,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if self.write_queue_depth == 0 {
            return Err(IngestError::Config(
                "WRITE_QUEUE_DEPTH must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            batch_size: self.batch_size,
            malformed_rows: self.malformed_rows,
            write_queue_depth: self.write_queue_depth,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| IngestError::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("CSV_FILE_PATH", "data/users.csv"),
            ("DATABASE_URL", "postgres://localhost/ingest"),
        ]))
        .unwrap();

        assert_eq!(config.csv_path, PathBuf::from("data/users.csv"));
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.port, 8080);
        assert_eq!(config.malformed_rows, MalformedRows::Abort);
        assert_eq!(config.write_queue_depth, 2);
    }

    #[test]
    fn test_overrides_parsed() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("CSV_FILE_PATH", "a.csv"),
            ("DATABASE_URL", "postgres://db"),
            ("BATCH_SIZE", "250"),
            ("PORT", "3000"),
            ("MALFORMED_ROWS", "Skip"),
        ]))
        .unwrap();

        assert_eq!(config.batch_size, 250);
        assert_eq!(config.port, 3000);
        assert_eq!(config.malformed_rows, MalformedRows::Skip);
    }

    #[test]
    fn test_missing_csv_path_rejected() {
        let err = IngestConfig::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://db")]))
            .unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = IngestConfig::from_lookup(lookup_from(&[
            ("CSV_FILE_PATH", "a.csv"),
            ("DATABASE_URL", "postgres://db"),
            ("BATCH_SIZE", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BATCH_SIZE"));
    }

    #[test]
    fn test_bad_port_rejected() {
        let err = IngestConfig::from_lookup(lookup_from(&[
            ("CSV_FILE_PATH", "a.csv"),
            ("DATABASE_URL", "postgres://db"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }
}
