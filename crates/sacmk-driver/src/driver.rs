use async_trait::async_trait;
use sacmk_domain::StorageAccountRef;

use crate::error::DriverError;
use crate::wire::{AccountUpdateParameters, StorageAccount};

/// The slice of the storage-account management API the controller needs.
///
/// Implementations own transport, authentication and any retry policy.
#[async_trait]
pub trait StorageAccountsApi: Send + Sync + 'static {
    /// Subscription every call is addressed to, when the client is bound to
    /// one. Accounts are named by resource group and account name only.
    fn subscription_id(&self) -> Option<&str> {
        None
    }

    // ── Mutating ──────────────────────────────────────────────────────────────

    /// Apply a partial update to the account. A missing account is
    /// `DriverError::NotFound`.
    async fn update(
        &self,
        account: &StorageAccountRef,
        payload: &AccountUpdateParameters,
    ) -> Result<(), DriverError>;

    // ── Read-only ─────────────────────────────────────────────────────────────

    /// Fetch the account. A missing account is `DriverError::NotFound`.
    async fn get_properties(
        &self,
        account: &StorageAccountRef,
    ) -> Result<StorageAccount, DriverError>;
}

/// Resolves a key vault's data-plane base URL (e.g.
/// `https://vault1.vault.azure.net/`) from its ARM resource id.
#[async_trait]
pub trait KeyVaultResolver: Send + Sync + 'static {
    async fn base_url_from_id(&self, key_vault_id: &str) -> Result<String, DriverError>;
}
