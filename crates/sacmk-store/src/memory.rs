use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::{AuditEvent, ResourceState};
use crate::store::StateStore;

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<String, ResourceState>,
    events: Vec<AuditEvent>,
}

/// In-memory implementation of [`StateStore`].
///
/// All data is lost on process exit. Suitable for tests and `--ephemeral` runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStore {
    async fn get_resource(&self, name: &str) -> Result<Option<ResourceState>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.resources.get(name).cloned())
    }

    async fn list_resources(&self) -> Result<Vec<ResourceState>, StoreError> {
        let guard = self.inner.read().await;
        let mut all: Vec<ResourceState> = guard.resources.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn upsert_resource(&self, state: &ResourceState) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.resources.insert(state.name.clone(), state.clone());
        Ok(())
    }

    async fn delete_resource(&self, name: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.resources.remove(name);
        Ok(())
    }

    async fn append_event(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard.events.push(event.clone());
        Ok(())
    }

    async fn list_events(
        &self,
        name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let guard = self.inner.read().await;
        let filtered: Vec<AuditEvent> = guard
            .events
            .iter()
            .filter(|ev| match name {
                Some(n) => ev.resource_name() == Some(n),
                None => true,
            })
            .cloned()
            .collect();

        let start = filtered.len().saturating_sub(limit as usize);
        Ok(filtered[start..].to_vec())
    }
}
