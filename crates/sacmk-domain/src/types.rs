use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::resource_id::{parse_storage_account_id, ResourceId};

/// Trailing segment that marks the encryption-settings facet of a storage account.
pub const ENCRYPTION_SETTINGS_SUFFIX: &str = "encryptionSettings";

// ── Identifiers ──────────────────────────────────────────────────────────────

/// Key under which the state store indexes one encryption-settings resource.
///
/// Always `<storage_account_id>/encryptionSettings`; the settings have no
/// remote identity of their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle(pub String);

impl ResourceHandle {
    pub fn new(s: impl Into<String>) -> Self {
        ResourceHandle(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The storage-account portion, with the `/encryptionSettings` suffix
    /// removed when present.
    pub fn storage_account_id(&self) -> &str {
        let trimmed = self.0.trim_end_matches('/');
        trimmed
            .strip_suffix(ENCRYPTION_SETTINGS_SUFFIX)
            .and_then(|s| s.strip_suffix('/'))
            .unwrap_or(trimmed)
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Enums ─────────────────────────────────────────────────────────────────────

/// Where the storage service gets its encryption key from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeySource {
    #[default]
    #[serde(rename = "Microsoft.Storage")]
    PlatformManaged,
    #[serde(rename = "Microsoft.Keyvault", alias = "Microsoft.KeyVault")]
    KeyVaultManaged,
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::PlatformManaged => write!(f, "Microsoft.Storage"),
            KeySource::KeyVaultManaged => write!(f, "Microsoft.Keyvault"),
        }
    }
}

// ── Core structs ──────────────────────────────────────────────────────────────

/// Reference to a customer-managed key held in a key vault.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultRef {
    /// Only orders this resource after the vault access policy in the owning
    /// graph. Not sent anywhere.
    pub key_vault_policy_id: String,
    pub key_vault_id: String,
    pub key_name: String,
    pub key_version: String,
    /// Resolved from `key_vault_id` on write, read back from the account on read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_uri: Option<String>,
}

/// Desired state of the encryption settings of one storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredConfiguration {
    pub storage_account_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_vault_ref: Option<KeyVaultRef>,
}

impl DeclaredConfiguration {
    pub fn new(storage_account_id: impl Into<String>) -> Self {
        Self {
            storage_account_id: storage_account_id.into(),
            key_vault_ref: None,
        }
    }

    pub fn with_key_vault(mut self, key_vault_ref: KeyVaultRef) -> Self {
        self.key_vault_ref = Some(key_vault_ref);
        self
    }

    /// Overlay a read result: `key_vault_ref` becomes whatever the read recovered.
    pub fn apply_fragment(&mut self, fragment: &DeclaredFragment) {
        self.key_vault_ref = fragment.key_vault_ref.clone();
    }

    /// Schema-level checks applied to user-authored declarations.
    ///
    /// Imported records are not validated: their `key_vault_id` and
    /// `key_vault_policy_id` are empty until the caller fills them in.
    pub fn validate(&self) -> Result<(), DomainError> {
        parse_storage_account_id(&self.storage_account_id)?;

        let Some(kv) = &self.key_vault_ref else {
            return Ok(());
        };

        ResourceId::parse(&kv.key_vault_policy_id).map_err(|e| {
            DomainError::invalid("key_vault.key_vault_policy_id", e.to_string())
        })?;
        ResourceId::parse(&kv.key_vault_id)
            .map_err(|e| DomainError::invalid("key_vault.key_vault_id", e.to_string()))?;

        if kv.key_name.trim().is_empty() {
            return Err(DomainError::invalid("key_vault.key_name", "must not be empty"));
        }
        if kv.key_version.trim().is_empty() {
            return Err(DomainError::invalid(
                "key_vault.key_version",
                "must not be empty",
            ));
        }
        Ok(())
    }
}

/// What a read recovers from the remote account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredFragment {
    /// `None` when the account carries no key-vault properties.
    pub key_vault_ref: Option<KeyVaultRef>,
    /// Informational; not part of the desired state.
    pub blob_encryption_enabled: Option<bool>,
    /// Informational; not part of the desired state.
    pub file_encryption_enabled: Option<bool>,
}
