use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::pipeline::aggregate::ResultTable;
use crate::pipeline::summary::Summary;

/// One published generation, read-only.
#[derive(Debug, Clone)]
pub struct Snapshot {
    generation: String,
    created_at: DateTime<Utc>,
    summary: Summary,
    tables: BTreeMap<String, Arc<ResultTable>>,
}

impl Snapshot {
    pub fn new(
        generation: impl Into<String>,
        created_at: DateTime<Utc>,
        summary: Summary,
        tables: impl IntoIterator<Item = ResultTable>,
    ) -> Self {
        Self {
            generation: generation.into(),
            created_at,
            summary,
            tables: tables
                .into_iter()
                .map(|t| (t.name.clone(), Arc::new(t)))
                .collect(),
        }
    }

    pub fn generation(&self) -> &str {
        &self.generation
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn table(&self, name: &str) -> Option<Arc<ResultTable>> {
        self.tables.get(name).cloned()
    }

    /// Table names in lexical order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn row_counts(&self) -> BTreeMap<&str, usize> {
        self.tables
            .iter()
            .map(|(name, t)| (name.as_str(), t.len()))
            .collect()
    }
}

/// The live snapshot. Readers clone the `Arc` and never observe a partial swap.
#[derive(Debug, Default)]
pub struct SnapshotHandle {
    current: RwLock<Option<Arc<Snapshot>>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(snapshot: Snapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install `snapshot` and return the one it replaced.
    pub fn swap(&self, snapshot: Snapshot) -> Option<Arc<Snapshot>> {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.replace(Arc::new(snapshot))
    }
}
