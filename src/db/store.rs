//! Record stores: the Postgres `users` table and an in-memory stand-in

use crate::db::report::{AgeCounts, AgeDistribution};
use crate::error::{IngestError, Result};
use crate::ingestion::transform::TargetRecord;
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

pub const USERS_TABLE: &str = "public.users";

const COLUMNS_PER_ROW: usize = 4;
const MAX_BIND_PARAMS: usize = 65535;

/// Largest number of rows one INSERT statement can carry
pub const MAX_ROWS_PER_STATEMENT: usize = MAX_BIND_PARAMS / COLUMNS_PER_ROW;

/// Where transformed records end up
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist all records atomically. Returns rows written.
    async fn insert_batch(&self, records: &[TargetRecord]) -> Result<u64>;

    /// Percentage of stored rows per age bucket
    async fn age_distribution(&self) -> Result<AgeDistribution>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the target table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS public.users (
                id SERIAL PRIMARY KEY,
                name VARCHAR NOT NULL,
                age INT NOT NULL,
                address JSONB NULL,
                additional_info JSONB NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn insert_statement(records: &[TargetRecord]) -> QueryBuilder<'_, Postgres> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "INSERT INTO {} (name, age, address, additional_info) ",
        USERS_TABLE
    ));
    builder.push_values(records, |mut row, record| {
        row.push_bind(&record.name)
            .push_bind(record.age)
            .push_bind(record.address.as_ref().map(Json))
            .push_bind(record.additional_info.as_ref().map(Json));
    });
    builder
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_batch(&self, records: &[TargetRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        if records.len() <= MAX_ROWS_PER_STATEMENT {
            let result = insert_statement(records).build().execute(&self.pool).await?;
            debug!("Inserted {} rows", result.rows_affected());
            return Ok(result.rows_affected());
        }

        // Too many binds for one statement: split, but keep the batch atomic
        let mut tx = self.pool.begin().await?;
        let mut written = 0;
        for chunk in records.chunks(MAX_ROWS_PER_STATEMENT) {
            written += insert_statement(chunk)
                .build()
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;
        debug!("Inserted {} rows in one transaction", written);
        Ok(written)
    }

    async fn age_distribution(&self) -> Result<AgeDistribution> {
        let (total, under_20, from_20_to_40, from_40_to_60, over_60): (i64, i64, i64, i64, i64) =
            sqlx::query_as(
                r#"
                SELECT
                    COUNT(*),
                    COUNT(*) FILTER (WHERE age < 20),
                    COUNT(*) FILTER (WHERE age BETWEEN 20 AND 40),
                    COUNT(*) FILTER (WHERE age > 40 AND age <= 60),
                    COUNT(*) FILTER (WHERE age > 60)
                FROM public.users
                "#,
            )
            .fetch_one(&self.pool)
            .await?;

        let counts = AgeCounts {
            total: total as u64,
            under_20: under_20 as u64,
            from_20_to_40: from_20_to_40 as u64,
            from_40_to_60: from_40_to_60 as u64,
            over_60: over_60 as u64,
        };
        Ok(counts.distribution())
    }
}

#[derive(Default)]
struct MemoryState {
    rows: Vec<TargetRecord>,
    batch_sizes: Vec<usize>,
    calls: u64,
}

/// Ordered in-memory store for dry runs and tests.
///
/// Each `insert_batch` call is numbered from 1; calls listed in
/// `fail_on_calls` fail without storing anything.
#[derive(Default)]
pub struct MemoryRecordStore {
    state: Mutex<MemoryState>,
    failing_calls: HashSet<u64>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on_calls(mut self, calls: &[u64]) -> Self {
        self.failing_calls.extend(calls.iter().copied());
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // A poisoned lock only means a test panicked mid-insert
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn records(&self) -> Vec<TargetRecord> {
        self.state().rows.clone()
    }

    /// Sizes of the batches that were stored, in arrival order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state().batch_sizes.clone()
    }

    pub fn insert_calls(&self) -> u64 {
        self.state().calls
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_batch(&self, records: &[TargetRecord]) -> Result<u64> {
        let mut state = self.state();
        state.calls += 1;
        if self.failing_calls.contains(&state.calls) {
            return Err(IngestError::Store(format!(
                "simulated failure on insert call {}",
                state.calls
            )));
        }
        state.rows.extend_from_slice(records);
        state.batch_sizes.push(records.len());
        Ok(records.len() as u64)
    }

    async fn age_distribution(&self) -> Result<AgeDistribution> {
        let state = self.state();
        Ok(AgeCounts::from_ages(state.rows.iter().map(|r| r.age)).distribution())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(age: i32) -> TargetRecord {
        TargetRecord {
            name: format!("user {}", age),
            age,
            address: None,
            additional_info: None,
        }
    }

    #[test]
    fn test_statement_row_limit() {
        assert_eq!(MAX_ROWS_PER_STATEMENT, 16383);
    }

    #[test]
    fn test_insert_statement_shape() {
        let records = vec![record(1), record(2)];
        let builder = insert_statement(&records);
        assert_eq!(
            builder.sql(),
            "INSERT INTO public.users (name, age, address, additional_info) VALUES ($1, $2, $3, $4), ($5, $6, $7, $8)"
        );
    }

    #[tokio::test]
    async fn test_memory_store_keeps_order() {
        let store = MemoryRecordStore::new();
        store.insert_batch(&[record(1), record(2)]).await.unwrap();
        store.insert_batch(&[record(3)]).await.unwrap();

        let ages: Vec<i32> = store.records().iter().map(|r| r.age).collect();
        assert_eq!(ages, vec![1, 2, 3]);
        assert_eq!(store.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_memory_store_failure_stores_nothing() {
        let store = MemoryRecordStore::new().fail_on_calls(&[2]);
        store.insert_batch(&[record(1)]).await.unwrap();
        assert!(store.insert_batch(&[record(2)]).await.is_err());
        store.insert_batch(&[record(3)]).await.unwrap();

        assert_eq!(store.insert_calls(), 3);
        assert_eq!(store.batch_sizes(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_memory_store_distribution() {
        let store = MemoryRecordStore::new();
        store.insert_batch(&[record(10), record(50)]).await.unwrap();
        let dist = store.age_distribution().await.unwrap();
        assert_eq!(dist.total, 2);
        assert_eq!(dist.under_20, 50.0);
        assert_eq!(dist.from_40_to_60, 50.0);
    }
}
