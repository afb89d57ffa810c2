use serde::{Deserialize, Serialize};

/// Raw YAML representation of one declaration file.
#[derive(Debug, Deserialize, Serialize)]
pub struct RawDocument {
    #[serde(default)]
    pub encryption_settings: Vec<RawEncryptionSettings>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawEncryptionSettings {
    pub name: String,
    pub storage_account_id: String,
    pub key_vault: Option<RawKeyVault>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RawKeyVault {
    pub key_vault_policy_id: String,
    pub key_vault_id: String,
    pub key_name: String,
    pub key_version: String,
    /// Computed; parsed only so it can be rejected with a clear message.
    pub key_vault_uri: Option<String>,
}
