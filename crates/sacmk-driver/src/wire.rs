//! ARM JSON shapes for storage-account encryption (api-version 2019-04-01).
//!
//! Only the fields this crate reads or writes are modelled; everything else in
//! the account body is ignored on decode.

use sacmk_domain::KeySource;
use serde::{Deserialize, Serialize};

// ── Read side ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<AccountProperties>,
}

impl StorageAccount {
    pub fn encryption(&self) -> Option<&Encryption> {
        self.properties.as_ref().and_then(|p| p.encryption.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<Encryption>,
}

// ── Write side ────────────────────────────────────────────────────────────────

/// Body of `PATCH .../storageAccounts/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdateParameters {
    pub properties: AccountPropertiesUpdateParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPropertiesUpdateParameters {
    pub encryption: Encryption,
}

impl AccountUpdateParameters {
    pub fn from_encryption(encryption: Encryption) -> Self {
        Self {
            properties: AccountPropertiesUpdateParameters { encryption },
        }
    }

    pub fn encryption(&self) -> &Encryption {
        &self.properties.encryption
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encryption {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<EncryptionServices>,
    #[serde(rename = "keySource", default)]
    pub key_source: KeySource,
    #[serde(
        rename = "keyvaultproperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub key_vault_properties: Option<KeyVaultProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionServices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<EncryptionService>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<EncryptionService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionService {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl EncryptionService {
    pub fn enabled() -> Self {
        Self { enabled: Some(true) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyVaultProperties {
    #[serde(rename = "keyname", default, skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(rename = "keyversion", default, skip_serializing_if = "Option::is_none")]
    pub key_version: Option<String>,
    #[serde(rename = "keyvaulturi", default, skip_serializing_if = "Option::is_none")]
    pub key_vault_uri: Option<String>,
}

impl KeyVaultProperties {
    /// True when no field is set, i.e. the object serializes as `{}`.
    pub fn is_empty(&self) -> bool {
        self.key_name.is_none() && self.key_version.is_none() && self.key_vault_uri.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_body_shape() {
        let payload = AccountUpdateParameters::from_encryption(Encryption {
            services: Some(EncryptionServices {
                blob: Some(EncryptionService::enabled()),
                file: Some(EncryptionService::enabled()),
            }),
            key_source: KeySource::KeyVaultManaged,
            key_vault_properties: Some(KeyVaultProperties {
                key_name: Some("k1".into()),
                key_version: Some("v1".into()),
                key_vault_uri: Some("https://vault1.vault.azure.net/".into()),
            }),
        });
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "properties": {
                    "encryption": {
                        "services": {
                            "blob": { "enabled": true },
                            "file": { "enabled": true }
                        },
                        "keySource": "Microsoft.Keyvault",
                        "keyvaultproperties": {
                            "keyname": "k1",
                            "keyversion": "v1",
                            "keyvaulturi": "https://vault1.vault.azure.net/"
                        }
                    }
                }
            })
        );
    }

    #[test]
    fn empty_key_vault_properties_serialize_as_empty_object() {
        let enc = Encryption {
            services: None,
            key_source: KeySource::PlatformManaged,
            key_vault_properties: Some(KeyVaultProperties::default()),
        };
        let v = serde_json::to_value(&enc).unwrap();
        assert_eq!(v["keyvaultproperties"], json!({}));
        assert_eq!(v["keySource"], "Microsoft.Storage");
    }

    #[test]
    fn decodes_account_and_ignores_unknown_fields() {
        let body = json!({
            "id": "/subscriptions/S/resourceGroups/G/providers/Microsoft.Storage/storageAccounts/acct1",
            "name": "acct1",
            "location": "eastus2",
            "properties": {
                "provisioningState": "Succeeded",
                "encryption": {
                    "services": {
                        "blob": { "enabled": true, "lastEnabledTime": "2019-12-01T00:00:00Z" },
                        "file": { "enabled": false }
                    },
                    "keySource": "Microsoft.Storage"
                }
            }
        });
        let acct: StorageAccount = serde_json::from_value(body).unwrap();
        let enc = acct.encryption().unwrap();
        assert_eq!(enc.key_source, KeySource::PlatformManaged);
        assert!(enc.key_vault_properties.is_none());
        let services = enc.services.as_ref().unwrap();
        assert_eq!(services.blob.as_ref().unwrap().enabled, Some(true));
        assert_eq!(services.file.as_ref().unwrap().enabled, Some(false));
    }
}
