use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use sacmk_domain::{parse_key_vault_id, KeySource, StorageAccountRef};
use tokio::sync::Mutex;
use tracing::debug;

use crate::driver::{KeyVaultResolver, StorageAccountsApi};
use crate::error::DriverError;
use crate::wire::{
    AccountProperties, AccountUpdateParameters, Encryption, EncryptionService, EncryptionServices,
    StorageAccount,
};

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<StorageAccountRef, Encryption>,
    removed: HashSet<StorageAccountRef>,
    updates: Vec<(StorageAccountRef, AccountUpdateParameters)>,
    reads: usize,
}

/// A stand-in for the storage and key-vault APIs that keeps everything in memory.
///
/// - Every account exists until [`LocalDriver::remove_account`] is called and
///   starts out with platform-managed encryption on blob and file.
/// - Vault URIs resolve to `https://<vault-name>.vault.azure.net/`.
/// - Performs no network I/O.
#[derive(Debug, Default, Clone)]
pub struct LocalDriver {
    inner: Arc<Mutex<Inner>>,
}

impl LocalDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored encryption block of `account`.
    pub async fn seed(&self, account: &StorageAccountRef, encryption: Encryption) {
        let mut guard = self.inner.lock().await;
        guard.removed.remove(account);
        guard.accounts.insert(account.clone(), encryption);
    }

    /// Make `account` answer `NotFound` from now on.
    pub async fn remove_account(&self, account: &StorageAccountRef) {
        let mut guard = self.inner.lock().await;
        guard.accounts.remove(account);
        guard.removed.insert(account.clone());
    }

    /// Every update issued so far, oldest first.
    pub async fn updates(&self) -> Vec<(StorageAccountRef, AccountUpdateParameters)> {
        self.inner.lock().await.updates.clone()
    }

    pub async fn read_count(&self) -> usize {
        self.inner.lock().await.reads
    }
}

fn default_encryption() -> Encryption {
    Encryption {
        services: Some(EncryptionServices {
            blob: Some(EncryptionService::enabled()),
            file: Some(EncryptionService::enabled()),
        }),
        key_source: KeySource::PlatformManaged,
        key_vault_properties: None,
    }
}

#[async_trait]
impl StorageAccountsApi for LocalDriver {
    async fn update(
        &self,
        account: &StorageAccountRef,
        payload: &AccountUpdateParameters,
    ) -> Result<(), DriverError> {
        debug!(%account, "LocalDriver: update");
        let mut guard = self.inner.lock().await;
        if guard.removed.contains(account) {
            return Err(DriverError::NotFound(format!("storage account {}", account)));
        }
        guard.updates.push((account.clone(), payload.clone()));

        let mut encryption = payload.encryption().clone();
        if encryption.services.is_none() {
            encryption.services = guard
                .accounts
                .get(account)
                .and_then(|e| e.services.clone())
                .or_else(|| default_encryption().services);
        }
        // An empty key-vault block carries nothing worth echoing back.
        if encryption
            .key_vault_properties
            .as_ref()
            .is_some_and(|p| p.is_empty())
        {
            encryption.key_vault_properties = None;
        }
        guard.accounts.insert(account.clone(), encryption);
        Ok(())
    }

    async fn get_properties(
        &self,
        account: &StorageAccountRef,
    ) -> Result<StorageAccount, DriverError> {
        debug!(%account, "LocalDriver: get_properties");
        let mut guard = self.inner.lock().await;
        guard.reads += 1;
        if guard.removed.contains(account) {
            return Err(DriverError::NotFound(format!("storage account {}", account)));
        }
        let encryption = guard
            .accounts
            .get(account)
            .cloned()
            .unwrap_or_else(default_encryption);

        Ok(StorageAccount {
            id: None,
            name: Some(account.account_name.clone()),
            properties: Some(AccountProperties {
                encryption: Some(encryption),
            }),
        })
    }
}

#[async_trait]
impl KeyVaultResolver for LocalDriver {
    async fn base_url_from_id(&self, key_vault_id: &str) -> Result<String, DriverError> {
        let vault = parse_key_vault_id(key_vault_id)
            .map_err(|e| DriverError::NotFound(format!("key vault: {}", e)))?;
        Ok(format!("https://{}.vault.azure.net/", vault.vault_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::KeyVaultProperties;

    fn account() -> StorageAccountRef {
        StorageAccountRef {
            resource_group: "G".into(),
            account_name: "acct1".into(),
        }
    }

    #[tokio::test]
    async fn unknown_account_reads_as_platform_managed() {
        let driver = LocalDriver::new();
        let acct = driver.get_properties(&account()).await.unwrap();
        let enc = acct.encryption().unwrap();
        assert_eq!(enc.key_source, KeySource::PlatformManaged);
        assert!(enc.key_vault_properties.is_none());
        assert_eq!(driver.read_count().await, 1);
    }

    #[tokio::test]
    async fn update_is_visible_on_read() {
        let driver = LocalDriver::new();
        let payload = AccountUpdateParameters::from_encryption(Encryption {
            services: None,
            key_source: KeySource::KeyVaultManaged,
            key_vault_properties: Some(KeyVaultProperties {
                key_name: Some("k1".into()),
                key_version: Some("v1".into()),
                key_vault_uri: Some("https://vault1.vault.azure.net/".into()),
            }),
        });
        driver.update(&account(), &payload).await.unwrap();

        let acct = driver.get_properties(&account()).await.unwrap();
        let enc = acct.encryption().unwrap();
        assert_eq!(enc.key_source, KeySource::KeyVaultManaged);
        assert!(enc.services.is_some(), "services should be kept");
        assert_eq!(driver.updates().await.len(), 1);
    }

    #[tokio::test]
    async fn removed_account_is_not_found() {
        let driver = LocalDriver::new();
        driver.remove_account(&account()).await;
        assert!(driver.get_properties(&account()).await.unwrap_err().is_not_found());
        let err = driver
            .update(&account(), &AccountUpdateParameters::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(driver.updates().await.is_empty());
    }

    #[tokio::test]
    async fn resolves_vault_name_to_uri() {
        let driver = LocalDriver::new();
        let uri = driver
            .base_url_from_id(
                "/subscriptions/S/resourceGroups/G/providers/Microsoft.KeyVault/vaults/vault1",
            )
            .await
            .unwrap();
        assert_eq!(uri, "https://vault1.vault.azure.net/");
        assert!(driver.base_url_from_id("vault1").await.is_err());
    }
}
