use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Generation, ResultStore, Snapshot};
use crate::error::{ComputationError, Result};

/// In-memory result store for development and testing
#[derive(Default)]
pub struct InMemoryResultStore {
    generations: RwLock<BTreeMap<String, Generation>>,
    current: RwLock<Option<String>>,
    failed: RwLock<Vec<(String, ComputationError)>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn current_id(&self) -> Option<String> {
        self.current.read().await.clone()
    }

    pub async fn generation_count(&self) -> usize {
        self.generations.read().await.len()
    }

    pub async fn failures(&self) -> Vec<(String, ComputationError)> {
        self.failed.read().await.clone()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn publish(&self, generation: &Generation) -> Result<()> {
        self.generations
            .write()
            .await
            .insert(generation.id.clone(), generation.clone());
        *self.current.write().await = Some(generation.id.clone());
        debug!("Stored generation {} in memory", generation.id);
        Ok(())
    }

    async fn load_current(&self) -> Result<Option<Snapshot>> {
        let current = self.current.read().await;
        let generations = self.generations.read().await;
        Ok(current
            .as_ref()
            .and_then(|id| generations.get(id))
            .map(|g| g.clone().into_snapshot()))
    }

    async fn mark_failed(&self, generation_id: &str, error: &ComputationError) -> Result<()> {
        self.failed
            .write()
            .await
            .push((generation_id.to_string(), error.clone()));
        Ok(())
    }
}
