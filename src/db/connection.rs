//! Database connection management using sqlx
//!
//! The pool is created once at startup, handed to whoever needs it, and
//! closed on shutdown. Nothing here is process-global.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::time::Duration;
use tracing::info;

pub type DbPool = PgPool;

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    info!("Connected to {}", redact(database_url));
    Ok(pool)
}

/// Close every connection; waits for in-flight queries to finish
pub async fn close_pool(pool: &PgPool) {
    pool.close().await;
    info!("Database pool closed");
}

/// Run `work` with the pool, then close it whether `work` succeeded or not
pub async fn with_pool<T, F, Fut>(pool: PgPool, work: F) -> T
where
    F: FnOnce(PgPool) -> Fut,
    Fut: Future<Output = T>,
{
    let outcome = work(pool.clone()).await;
    close_pool(&pool).await;
    outcome
}

/// Host part of a connection string, without credentials
pub fn redact(database_url: &str) -> &str {
    database_url.rsplit('@').next().unwrap_or("database")
}
