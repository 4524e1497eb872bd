//! HTTP server that runs a CSV ingestion per upload request
//!
//! Run with: cargo run --bin server

use anyhow::{Context, Result};
use clap::Parser;
use csv_ingest::db::{init_pool, with_pool, PgRecordStore};
use csv_ingest::server::{serve, AppState};
use csv_ingest::IngestConfig;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "server")]
#[command(about = "Serve the CSV upload endpoint")]
struct Args {
    /// CSV file to ingest on each upload (overrides CSV_FILE_PATH)
    #[arg(long)]
    csv_path: Option<PathBuf>,

    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Rows per INSERT (overrides BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,
}

impl Args {
    fn overrides(&self) -> HashMap<&'static str, String> {
        let mut map = HashMap::new();
        if let Some(path) = &self.csv_path {
            map.insert("CSV_FILE_PATH", path.display().to_string());
        }
        if let Some(port) = self.port {
            map.insert("PORT", port.to_string());
        }
        if let Some(batch_size) = self.batch_size {
            map.insert("BATCH_SIZE", batch_size.to_string());
        }
        map
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();
    csv_ingest::logging::init("info");

    let args = Args::parse();
    let overrides = args.overrides();
    let config = IngestConfig::from_lookup(|key| {
        overrides.get(key).cloned().or_else(|| std::env::var(key).ok())
    })
    .context("Invalid configuration")?;

    let pool = init_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    with_pool(pool, |pool| async move {
        let store = PgRecordStore::new(pool);
        store.ensure_schema().await.context("Failed to create users table")?;

        let state = Arc::new(AppState::new(
            config.csv_path.clone(),
            config.pipeline_options(),
            Arc::new(store),
        ));

        let listener = TcpListener::bind(("0.0.0.0", config.port))
            .await
            .with_context(|| format!("Failed to bind port {}", config.port))?;
        info!(
            "Server listening on port {} (csv: {}, batch size: {})",
            config.port,
            config.csv_path.display(),
            config.batch_size
        );

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };
        serve(listener, state, shutdown)
            .await
            .context("Server stopped with an error")
    })
    .await
}
