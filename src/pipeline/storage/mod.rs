//! Publishing and reading result generations.
//!
//! A generation is exported all-or-nothing: numeric integrity is checked before anything is
//! written, and readers only ever see a generation once it is complete.

pub mod fs;
pub mod in_memory;
pub mod snapshot;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::error::{ComputationError, Result};
use crate::observability::metrics;
use crate::pipeline::aggregate::ResultTable;
use crate::pipeline::processing::Violation;
use crate::pipeline::report::RunReport;
use crate::pipeline::summary::Summary;

pub use fs::FsResultStore;
pub use in_memory::InMemoryResultStore;
pub use snapshot::{Snapshot, SnapshotHandle};

/// Sortable generation id: UTC timestamp plus a random suffix.
pub fn new_generation_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", now.format("%Y%m%dT%H%M%S"), &suffix[..8])
}

/// Everything one successful run produced.
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub summary: Summary,
    /// Every result table, the combined table included
    pub tables: Vec<ResultTable>,
    pub run: RunReport,
    pub violations: Vec<Violation>,
}

impl Generation {
    /// First non-finite number across the summary and every table.
    pub fn check_finite(&self) -> std::result::Result<(), ComputationError> {
        self.summary.check_finite()?;
        for table in &self.tables {
            table.check_finite()?;
        }
        Ok(())
    }

    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.id, self.created_at, self.summary, self.tables)
    }
}

/// Where generations are published and read back from.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Make `generation` the current one. Either all of it becomes visible or none of it.
    async fn publish(&self, generation: &Generation) -> Result<()>;

    /// The current generation, if any has been published.
    async fn load_current(&self) -> Result<Option<Snapshot>>;

    /// Leave a record of a generation that was rejected before publication.
    async fn mark_failed(&self, generation_id: &str, error: &ComputationError) -> Result<()>;
}

/// Check numeric integrity, then publish. A rejected generation is marked failed and the
/// current one stays in place.
#[instrument(skip_all, fields(generation = %generation.id, tables = generation.tables.len()))]
pub async fn export(store: &dyn ResultStore, generation: Generation) -> Result<Snapshot> {
    if let Err(e) = generation.check_finite() {
        error!("Refusing to publish generation {}: {}", generation.id, e);
        metrics::export::rejected();
        store.mark_failed(&generation.id, &e).await?;
        return Err(e.into());
    }

    store.publish(&generation).await?;
    for table in &generation.tables {
        metrics::export::table_written(&table.name, table.len());
    }
    info!("Published generation {}", generation.id);
    Ok(generation.into_snapshot())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_ids_sort_by_time() {
        let earlier = DateTime::parse_from_rfc3339("2024-03-01T09:15:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = DateTime::parse_from_rfc3339("2024-03-01T09:15:01Z")
            .unwrap()
            .with_timezone(&Utc);

        let a = new_generation_id(earlier);
        let b = new_generation_id(later);
        assert!(a.starts_with("20240301T091500-"));
        assert_eq!(a.len(), "20240301T091500-".len() + 8);
        assert!(a < b);
    }
}
