//! Database module for PostgreSQL connection and operations
//!
//! Pool lifecycle, the `users` record store and the post-run age report.

pub mod connection;
pub mod report;
pub mod store;

pub use connection::{close_pool, init_pool, with_pool, DbPool};
pub use report::{run_age_report, AgeCounts, AgeDistribution};
pub use store::{MemoryRecordStore, PgRecordStore, RecordStore};
