use async_trait::async_trait;

use crate::error::StoreError;
use crate::state::{AuditEvent, ResourceState};

/// Persistence for encryption-settings records, keyed by declaration name.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    async fn get_resource(&self, name: &str) -> Result<Option<ResourceState>, StoreError>;
    async fn list_resources(&self) -> Result<Vec<ResourceState>, StoreError>;
    async fn upsert_resource(&self, state: &ResourceState) -> Result<(), StoreError>;
    async fn delete_resource(&self, name: &str) -> Result<(), StoreError>;

    async fn append_event(&self, event: &AuditEvent) -> Result<(), StoreError>;

    /// The most recent `limit` events, oldest first, optionally only those
    /// about resource `name`.
    async fn list_events(
        &self,
        name: Option<&str>,
        limit: u32,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}
