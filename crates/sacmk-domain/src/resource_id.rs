use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;
use crate::types::{ResourceHandle, ENCRYPTION_SETTINGS_SUFFIX};

// ── Structured ARM identifiers ───────────────────────────────────────────────

/// A parsed Azure Resource Manager identifier of the form
/// `/subscriptions/{sub}/resourceGroups/{group}/providers/{ns}/{type}/{name}[/...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.Storage`.
    pub provider: Option<String>,
    /// Remaining key/value segments in the order they appear.
    pub path: Vec<(String, String)>,
}

impl ResourceId {
    /// Parse `id` into its key/value segments.
    ///
    /// The identifier must start with `/`, split into an even number of
    /// non-empty segments, and carry both a `subscriptions` and a
    /// `resourceGroups` pair. `resourcegroups` is accepted as well since ARM
    /// lower-cases it in some responses.
    pub fn parse(id: &str) -> Result<Self, DomainError> {
        if !id.starts_with('/') {
            return Err(DomainError::malformed(id, "identifier must start with '/'"));
        }

        let trimmed = id.trim_start_matches('/').trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(DomainError::malformed(id, "identifier has no segments"));
        }

        let components: Vec<&str> = trimmed.split('/').collect();
        if components.len() % 2 != 0 {
            return Err(DomainError::malformed(
                id,
                "the number of path segments is not divisible by 2",
            ));
        }

        let mut subscription_id = None;
        let mut resource_group = None;
        let mut provider = None;
        let mut path = Vec::new();

        for pair in components.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() || value.is_empty() {
                return Err(DomainError::malformed(
                    id,
                    "key/value segments cannot be empty",
                ));
            }
            match key {
                "subscriptions" if subscription_id.is_none() => {
                    subscription_id = Some(value.to_string())
                }
                k if k.eq_ignore_ascii_case("resourceGroups") && resource_group.is_none() => {
                    resource_group = Some(value.to_string())
                }
                "providers" if provider.is_none() => provider = Some(value.to_string()),
                _ => path.push((key.to_string(), value.to_string())),
            }
        }

        let subscription_id = subscription_id
            .ok_or_else(|| DomainError::malformed(id, "no subscription id found"))?;
        let resource_group = resource_group
            .ok_or_else(|| DomainError::malformed(id, "no resource group found"))?;

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            path,
        })
    }

    /// Value of the first path segment named `key` (case-sensitive).
    pub fn segment(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn require(&self, id: &str, key: &str) -> Result<String, DomainError> {
        self.segment(key)
            .map(str::to_string)
            .ok_or_else(|| DomainError::malformed(id, format!("no `{}` segment found", key)))
    }
}

impl FromStr for ResourceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceId::parse(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}",
            self.subscription_id, self.resource_group
        )?;
        if let Some(p) = &self.provider {
            write!(f, "/providers/{}", p)?;
        }
        for (k, v) in &self.path {
            write!(f, "/{}/{}", k, v)?;
        }
        Ok(())
    }
}

// ── Storage accounts ─────────────────────────────────────────────────────────

/// The two parts of a storage-account id the remote API is keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageAccountRef {
    pub resource_group: String,
    pub account_name: String,
}

impl fmt::Display for StorageAccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_group, self.account_name)
    }
}

pub fn parse_storage_account_id(id: &str) -> Result<StorageAccountRef, DomainError> {
    let parsed = ResourceId::parse(id)?;
    let account_name = parsed.require(id, "storageAccounts")?;
    Ok(StorageAccountRef {
        resource_group: parsed.resource_group,
        account_name,
    })
}

/// Append the fixed `encryptionSettings` suffix. Pure and deterministic.
pub fn derive_handle(storage_account_id: &str) -> ResourceHandle {
    ResourceHandle::new(format!(
        "{}/{}",
        storage_account_id, ENCRYPTION_SETTINGS_SUFFIX
    ))
}

// ── Key vaults ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVaultLocation {
    pub subscription_id: String,
    pub resource_group: String,
    pub vault_name: String,
}

pub fn parse_key_vault_id(id: &str) -> Result<KeyVaultLocation, DomainError> {
    let parsed = ResourceId::parse(id)?;
    let vault_name = parsed.require(id, "vaults")?;
    Ok(KeyVaultLocation {
        subscription_id: parsed.subscription_id,
        resource_group: parsed.resource_group,
        vault_name,
    })
}
