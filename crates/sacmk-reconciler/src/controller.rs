use std::sync::Arc;

use sacmk_domain::{
    derive_handle, parse_storage_account_id, DeclaredConfiguration, DeclaredFragment,
    ResourceHandle, ResourceId, StorageAccountRef,
};
use sacmk_driver::{AccountUpdateParameters, KeyVaultResolver, StorageAccountsApi};
use tracing::{debug, info, warn};

use crate::error::{CancelReason, ReconcileError};
use crate::keyvault::resolve_key_vault_uri;
use crate::policy;
use crate::projector::{from_wire_read, key_selection, to_wire_update, KeySelection};
use crate::scope::{Operation, OperationScope, Timeouts};

/// Outcome of an operation that can find the storage account gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed<T> {
    Present(T),
    /// The storage account no longer exists; the caller drops its record.
    Absent,
}

impl<T> Observed<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Observed::Absent)
    }

    pub fn present(self) -> Option<T> {
        match self {
            Observed::Present(v) => Some(v),
            Observed::Absent => None,
        }
    }
}

/// What create-or-update and import hand back for the state store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionSettingsRecord {
    pub handle: ResourceHandle,
    /// The input configuration with `key_vault_ref` replaced by what the
    /// read-back recovered.
    pub declared: DeclaredConfiguration,
    pub fragment: DeclaredFragment,
}

/// Drives the lifecycle of the encryption settings of one storage account
/// at a time.
///
/// Holds no state between calls. Every operation issues at most one write and
/// one read, in that order, each through the caller's [`OperationScope`].
pub struct EncryptionSettingsController {
    accounts: Arc<dyn StorageAccountsApi>,
    vaults: Arc<dyn KeyVaultResolver>,
    timeouts: Timeouts,
}

impl EncryptionSettingsController {
    pub fn new(accounts: Arc<dyn StorageAccountsApi>, vaults: Arc<dyn KeyVaultResolver>) -> Self {
        Self {
            accounts,
            vaults,
            timeouts: Timeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Write the declared settings, then read them back.
    ///
    /// `existing` is the handle recorded by a previous successful call; it only
    /// picks the update timeout over the create timeout. Nothing is returned
    /// for the store unless the write succeeded.
    pub async fn create_or_update(
        &self,
        declared: &DeclaredConfiguration,
        existing: Option<&ResourceHandle>,
        scope: &OperationScope,
    ) -> Result<Observed<EncryptionSettingsRecord>, ReconcileError> {
        let op = if existing.is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        let scope = scope.with_timeout(self.timeouts.for_operation(op));
        let account = self.account_ref(&declared.storage_account_id)?;

        let payload = self.build_payload(declared, op, &account, &scope).await?;
        info!(
            %account,
            key_source = %payload.encryption().key_source,
            "{} encryption settings",
            if op == Operation::Create { "Creating" } else { "Updating" }
        );
        self.write(op, &account, &payload, &scope).await?;

        let handle = derive_handle(&declared.storage_account_id);
        debug!(%handle, "Encryption settings written");

        match self.read_account(op, declared, &account, &scope).await? {
            Observed::Present(fragment) => {
                let mut refreshed = declared.clone();
                refreshed.apply_fragment(&fragment);
                Ok(Observed::Present(EncryptionSettingsRecord {
                    handle,
                    declared: refreshed,
                    fragment,
                }))
            }
            Observed::Absent => {
                warn!(%account, "Storage account disappeared right after the encryption update");
                Ok(Observed::Absent)
            }
        }
    }

    /// Fetch the account and project its encryption block. Never writes.
    pub async fn read(
        &self,
        declared: &DeclaredConfiguration,
        scope: &OperationScope,
    ) -> Result<Observed<DeclaredFragment>, ReconcileError> {
        let scope = scope.with_timeout(self.timeouts.read);
        let account = self.account_ref(&declared.storage_account_id)?;
        self.read_account(Operation::Read, declared, &account, &scope)
            .await
    }

    /// Put the account back on platform-managed keys.
    ///
    /// The settings are a facet of the account, so this is a write; the
    /// account itself is left alone.
    pub async fn delete(
        &self,
        declared: &DeclaredConfiguration,
        scope: &OperationScope,
    ) -> Result<(), ReconcileError> {
        let scope = scope.with_timeout(self.timeouts.delete);
        let account = self.account_ref(&declared.storage_account_id)?;

        info!(%account, "Reverting encryption settings to platform-managed keys");
        self.write(Operation::Delete, &account, &policy::revert_to_default(), &scope)
            .await
    }

    /// Adopt the settings of an existing account.
    ///
    /// `handle` is a storage-account id, with or without the
    /// `/encryptionSettings` suffix. The vault id and access-policy id cannot
    /// be recovered from the account, so a recovered `key_vault_ref` carries
    /// empty strings for both.
    pub async fn import(
        &self,
        handle: &str,
        scope: &OperationScope,
    ) -> Result<Observed<EncryptionSettingsRecord>, ReconcileError> {
        let scope = scope.with_timeout(self.timeouts.for_operation(Operation::Import));
        let storage_account_id = ResourceHandle::new(handle).storage_account_id().to_string();
        let account = self.account_ref(&storage_account_id)?;
        let declared = DeclaredConfiguration::new(storage_account_id.clone());

        info!(%account, "Importing encryption settings");
        match self
            .read_account(Operation::Import, &declared, &account, &scope)
            .await?
        {
            Observed::Present(fragment) => {
                let mut recovered = declared;
                recovered.apply_fragment(&fragment);
                Ok(Observed::Present(EncryptionSettingsRecord {
                    handle: derive_handle(&storage_account_id),
                    declared: recovered,
                    fragment,
                }))
            }
            Observed::Absent => Ok(Observed::Absent),
        }
    }

    /// Parse `storage_account_id`, refusing ids outside the subscription the
    /// storage client is bound to. The client addresses accounts by group and
    /// name only, so such an id would reach a different account or none.
    fn account_ref(&self, storage_account_id: &str) -> Result<StorageAccountRef, ReconcileError> {
        let account = parse_storage_account_id(storage_account_id)?;
        if let Some(bound) = self.accounts.subscription_id() {
            let declared = ResourceId::parse(storage_account_id)?.subscription_id;
            if !declared.eq_ignore_ascii_case(bound) {
                return Err(ReconcileError::InvalidDeclaration {
                    field: "storage_account_id".into(),
                    reason: format!(
                        "is in subscription {} but the storage client is bound to {}",
                        declared, bound
                    ),
                });
            }
        }
        Ok(account)
    }

    async fn build_payload(
        &self,
        declared: &DeclaredConfiguration,
        op: Operation,
        account: &StorageAccountRef,
        scope: &OperationScope,
    ) -> Result<AccountUpdateParameters, ReconcileError> {
        match key_selection(declared) {
            KeySelection::KeyVault(kv) => {
                let uri = scope
                    .run(resolve_key_vault_uri(self.vaults.as_ref(), &kv.key_vault_id))
                    .await
                    .map_err(|reason| cancelled(op, account, reason))??;
                Ok(to_wire_update(declared, Some(&uri)))
            }
            KeySelection::BlankKeyName => {
                warn!(
                    %account,
                    "key_vault block has an empty key name; using platform-managed keys"
                );
                Ok(to_wire_update(declared, None))
            }
            KeySelection::NotConfigured => Ok(to_wire_update(declared, None)),
        }
    }

    async fn write(
        &self,
        op: Operation,
        account: &StorageAccountRef,
        payload: &AccountUpdateParameters,
        scope: &OperationScope,
    ) -> Result<(), ReconcileError> {
        scope
            .run(self.accounts.update(account, payload))
            .await
            .map_err(|reason| cancelled(op, account, reason))?
            .map_err(|source| ReconcileError::RemoteWrite {
                account: account.to_string(),
                source,
            })
    }

    async fn read_account(
        &self,
        op: Operation,
        declared: &DeclaredConfiguration,
        account: &StorageAccountRef,
        scope: &OperationScope,
    ) -> Result<Observed<DeclaredFragment>, ReconcileError> {
        let (key_vault_id, policy_id) = declared
            .key_vault_ref
            .as_ref()
            .map(|kv| (kv.key_vault_id.as_str(), kv.key_vault_policy_id.as_str()))
            .unwrap_or(("", ""));

        let result = scope
            .run(self.accounts.get_properties(account))
            .await
            .map_err(|reason| cancelled(op, account, reason))?;

        match result {
            Ok(remote) => Ok(Observed::Present(from_wire_read(
                &remote,
                key_vault_id,
                policy_id,
            ))),
            Err(e) if e.is_not_found() => {
                info!(%account, "Storage account not found; encryption settings are absent");
                Ok(Observed::Absent)
            }
            Err(source) => Err(ReconcileError::RemoteRead {
                account: account.to_string(),
                source,
            }),
        }
    }
}

fn cancelled(op: Operation, account: &StorageAccountRef, reason: CancelReason) -> ReconcileError {
    warn!(%account, operation = %op, %reason, "Operation cancelled");
    ReconcileError::Cancelled {
        operation: op,
        account: account.to_string(),
        reason,
    }
}
