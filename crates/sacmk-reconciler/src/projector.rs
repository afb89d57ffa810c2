//! Translation between declared configurations and the ARM encryption shape.

use sacmk_domain::{DeclaredConfiguration, DeclaredFragment, KeySource, KeyVaultRef};
use sacmk_driver::{AccountUpdateParameters, KeyVaultProperties, StorageAccount};

use crate::policy;

/// How a declaration selects its encryption key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySelection<'a> {
    /// A key-vault block with a key name: customer-managed key.
    KeyVault(&'a KeyVaultRef),
    /// No key-vault block: platform-managed key.
    NotConfigured,
    /// A key-vault block whose key name is empty. Falls back to a
    /// platform-managed key.
    BlankKeyName,
}

pub fn key_selection(declared: &DeclaredConfiguration) -> KeySelection<'_> {
    match &declared.key_vault_ref {
        None => KeySelection::NotConfigured,
        Some(kv) if kv.key_name.is_empty() => KeySelection::BlankKeyName,
        Some(kv) => KeySelection::KeyVault(kv),
    }
}

/// Build the update body for `declared`.
///
/// `resolved_uri` is the vault URI resolved from `key_vault_id`; it is only
/// used when the declaration selects a key-vault key.
pub fn to_wire_update(
    declared: &DeclaredConfiguration,
    resolved_uri: Option<&str>,
) -> AccountUpdateParameters {
    let mut payload = policy::baseline();

    if let KeySelection::KeyVault(kv) = key_selection(declared) {
        let encryption = &mut payload.properties.encryption;
        encryption.key_source = KeySource::KeyVaultManaged;
        encryption.key_vault_properties = Some(KeyVaultProperties {
            key_name: Some(kv.key_name.clone()),
            key_version: Some(kv.key_version.clone()),
            key_vault_uri: resolved_uri.map(str::to_string),
        });
    }

    payload
}

/// Recover the declared-state view of `remote`.
///
/// The account never reports which vault or access policy a key came from,
/// so `prior_key_vault_id` and `prior_policy_id` are copied in unchanged.
pub fn from_wire_read(
    remote: &StorageAccount,
    prior_key_vault_id: &str,
    prior_policy_id: &str,
) -> DeclaredFragment {
    let encryption = remote.encryption();
    let services = encryption.and_then(|e| e.services.as_ref());

    let key_vault_ref = encryption
        .and_then(|e| e.key_vault_properties.as_ref())
        .filter(|p| !p.is_empty())
        .map(|p| KeyVaultRef {
            key_vault_policy_id: prior_policy_id.to_string(),
            key_vault_id: prior_key_vault_id.to_string(),
            key_name: p.key_name.clone().unwrap_or_default(),
            key_version: p.key_version.clone().unwrap_or_default(),
            key_vault_uri: p.key_vault_uri.clone(),
        });

    DeclaredFragment {
        key_vault_ref,
        blob_encryption_enabled: services
            .and_then(|s| s.blob.as_ref())
            .and_then(|s| s.enabled),
        file_encryption_enabled: services
            .and_then(|s| s.file.as_ref())
            .and_then(|s| s.enabled),
    }
}
