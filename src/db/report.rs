//! Age distribution report run after an ingestion completes

use crate::db::store::RecordStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Raw bucket counts over the `age` column
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeCounts {
    pub total: u64,
    pub under_20: u64,
    pub from_20_to_40: u64,
    pub from_40_to_60: u64,
    pub over_60: u64,
}

impl AgeCounts {
    /// Buckets: `< 20`, `20..=40`, `41..=60`, `> 60`
    pub fn from_ages<I: IntoIterator<Item = i32>>(ages: I) -> Self {
        let mut counts = Self::default();
        for age in ages {
            counts.total += 1;
            match age {
                a if a < 20 => counts.under_20 += 1,
                20..=40 => counts.from_20_to_40 += 1,
                41..=60 => counts.from_40_to_60 += 1,
                _ => counts.over_60 += 1,
            }
        }
        counts
    }

    pub fn distribution(&self) -> AgeDistribution {
        let pct = |n: u64| {
            if self.total == 0 {
                0.0
            } else {
                n as f64 * 100.0 / self.total as f64
            }
        };
        AgeDistribution {
            total: self.total,
            under_20: pct(self.under_20),
            from_20_to_40: pct(self.from_20_to_40),
            from_40_to_60: pct(self.from_40_to_60),
            over_60: pct(self.over_60),
        }
    }
}

/// Percentage of all rows per age bucket
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeDistribution {
    pub total: u64,
    pub under_20: f64,
    pub from_20_to_40: f64,
    pub from_40_to_60: f64,
    pub over_60: f64,
}

impl AgeDistribution {
    pub fn rows(&self) -> [(&'static str, f64); 4] {
        [
            ("< 20", self.under_20),
            ("20 to 40", self.from_20_to_40),
            ("40 to 60", self.from_40_to_60),
            ("> 60", self.over_60),
        ]
    }
}

impl fmt::Display for AgeDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} | {:>14}", "Age-Group", "% Distribution")?;
        writeln!(f, "{:-<10}-+-{:-<14}", "", "")?;
        for (label, pct) in self.rows() {
            writeln!(f, "{:<10} | {:>14.2}", label, pct)?;
        }
        Ok(())
    }
}

/// Fetch and log the distribution. Errors are logged, never returned:
/// the caller has already answered its client by the time this runs.
pub async fn run_age_report(store: Arc<dyn RecordStore>) -> Option<AgeDistribution> {
    match store.age_distribution().await {
        Ok(distribution) => {
            info!(total = distribution.total, "Age distribution\n{}", distribution);
            Some(distribution)
        }
        Err(e) => {
            error!("Age distribution report failed: {}", e);
            None
        }
    }
}
