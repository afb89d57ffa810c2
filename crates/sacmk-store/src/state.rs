use chrono::{DateTime, Utc};
use sacmk_domain::{DeclaredConfiguration, DeclaredFragment, ResourceHandle};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Declaration name; the key of this record.
    pub name: String,
    /// Desired configuration as last applied (or as recovered by import).
    pub desired: DeclaredConfiguration,
    /// Hex SHA-256 of `desired` at the time it was applied.
    pub desired_hash: String,
    /// Set once a write has succeeded or the settings were imported.
    pub handle: Option<ResourceHandle>,
    /// What the last read recovered from the account.
    pub observed: Option<DeclaredFragment>,
    pub last_reconciled_at: Option<DateTime<Utc>>,
}

impl ResourceState {
    pub fn new(name: impl Into<String>, desired: DeclaredConfiguration) -> Self {
        let desired_hash = compute_desired_hash(&desired);
        Self {
            name: name.into(),
            desired,
            desired_hash,
            handle: None,
            observed: None,
            last_reconciled_at: None,
        }
    }
}

/// Stable fingerprint of a declared configuration, used to detect edits
/// between runs.
///
/// `key_vault_uri` is left out since it is computed rather than declared.
pub fn compute_desired_hash(desired: &DeclaredConfiguration) -> String {
    let mut normalized = desired.clone();
    if let Some(kv) = normalized.key_vault_ref.as_mut() {
        kv.key_vault_uri = None;
    }
    let bytes = serde_json::to_vec(&normalized).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AuditEvent {
    ReconcileStarted {
        id: Uuid,
        at: DateTime<Utc>,
        dry_run: bool,
    },
    ReconcileCompleted {
        id: Uuid,
        at: DateTime<Utc>,
        changes: usize,
        dry_run: bool,
    },
    SettingsApplied {
        id: Uuid,
        at: DateTime<Utc>,
        name: String,
        handle: ResourceHandle,
    },
    SettingsReverted {
        id: Uuid,
        at: DateTime<Utc>,
        name: String,
        storage_account_id: String,
    },
    SettingsImported {
        id: Uuid,
        at: DateTime<Utc>,
        name: String,
        handle: ResourceHandle,
    },
    RecordDropped {
        id: Uuid,
        at: DateTime<Utc>,
        name: String,
    },
}

impl AuditEvent {
    pub fn resource_name(&self) -> Option<&str> {
        match self {
            AuditEvent::SettingsApplied { name, .. }
            | AuditEvent::SettingsReverted { name, .. }
            | AuditEvent::SettingsImported { name, .. }
            | AuditEvent::RecordDropped { name, .. } => Some(name),
            _ => None,
        }
    }
}
