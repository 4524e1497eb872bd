//! One-shot ingestion run from the command line
//!
//! Run with: cargo run --bin ingest -- --csv-path data/users.csv --report

use anyhow::{bail, Context, Result};
use clap::Parser;
use csv_ingest::db::{init_pool, with_pool, MemoryRecordStore, PgRecordStore, RecordStore};
use csv_ingest::ingestion::ingest_file;
use csv_ingest::{IngestConfig, IngestionReport, MalformedRows};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser)]
#[command(name = "ingest")]
#[command(about = "Load a CSV file into the users table")]
struct Args {
    /// CSV file to ingest (overrides CSV_FILE_PATH)
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Rows per INSERT (overrides BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Log and skip malformed lines instead of stopping
    #[arg(long)]
    skip_malformed: bool,

    /// Run against an in-memory store; no database needed
    #[arg(long)]
    dry_run: bool,

    /// Print the age distribution afterwards
    #[arg(long)]
    report: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    csv_ingest::logging::init("info");

    let args = Args::parse();

    let mut overrides: HashMap<&str, String> = HashMap::new();
    if let Some(path) = &args.csv_path {
        overrides.insert("CSV_FILE_PATH", path.display().to_string());
    }
    if let Some(batch_size) = args.batch_size {
        overrides.insert("BATCH_SIZE", batch_size.to_string());
    }
    if args.dry_run && std::env::var("DATABASE_URL").is_err() {
        overrides.insert("DATABASE_URL", "memory://".to_string());
    }

    let mut config = IngestConfig::from_lookup(|key| {
        overrides.get(key).cloned().or_else(|| std::env::var(key).ok())
    })
    .context("Invalid configuration")?;
    if args.skip_malformed {
        config.malformed_rows = MalformedRows::Skip;
    }

    if args.dry_run {
        println!("🧪 Dry run: records are kept in memory");
        return run(&config, Arc::new(MemoryRecordStore::new()), args.report).await;
    }

    let pool = init_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let report_ages = args.report;
    with_pool(pool, |pool| async move {
        let store = PgRecordStore::new(pool);
        store.ensure_schema().await.context("Failed to create users table")?;
        run(&config, Arc::new(store), report_ages).await
    })
    .await
}

async fn run(config: &IngestConfig, store: Arc<dyn RecordStore>, report_ages: bool) -> Result<()> {
    let report = ingest_file(&config.csv_path, store.clone(), config.pipeline_options())
        .await
        .with_context(|| format!("Ingestion of {} failed", config.csv_path.display()))?;

    println!("\n=== Ingestion Report ===");
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report_ages {
        match store.age_distribution().await {
            Ok(distribution) => {
                println!("\n=== Age Distribution ({} users) ===", distribution.total);
                print!("{}", distribution);
            }
            Err(e) => warn!("Age distribution query failed: {}", e),
        }
    }

    run_outcome(&report)
}

/// Only a failed run is an error; rejected batches are reported, not fatal
fn run_outcome(report: &IngestionReport) -> Result<()> {
    for failure in &report.failed_batches {
        warn!(
            sequence = failure.sequence,
            rows = failure.rows,
            "Batch was not written: {}",
            failure.message
        );
    }
    if !report.is_success() {
        bail!(
            "Ingestion did not complete: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv_ingest::ingestion::BatchFailure;
    use csv_ingest::IngestionStatus;

    #[test]
    fn test_partial_run_exits_cleanly() {
        let mut report = IngestionReport::new(uuid::Uuid::new_v4());
        report.status = IngestionStatus::Partial;
        report.failed_batches.push(BatchFailure {
            sequence: 2,
            rows: 1000,
            message: "Store error: connection reset".to_string(),
        });

        assert!(run_outcome(&report).is_ok());
    }

    #[test]
    fn test_failed_run_is_error() {
        let mut report = IngestionReport::new(uuid::Uuid::new_v4());
        report.status = IngestionStatus::Failed;
        report.error = Some("IO error: stream did not contain valid UTF-8".to_string());

        let err = run_outcome(&report).unwrap_err();
        assert!(err.to_string().contains("valid UTF-8"));
    }
}
