use sacmk_driver::{DriverError, KeyVaultResolver};
use tracing::debug;

use crate::error::ReconcileError;

/// Look up the data-plane URI of the vault named by `key_vault_id`.
///
/// Any resolver failure, or an empty answer, is a `Lookup` error carrying the
/// vault id.
pub async fn resolve_key_vault_uri(
    resolver: &dyn KeyVaultResolver,
    key_vault_id: &str,
) -> Result<String, ReconcileError> {
    let uri = resolver
        .base_url_from_id(key_vault_id)
        .await
        .map_err(|source| ReconcileError::Lookup {
            key_vault_id: key_vault_id.to_string(),
            source,
        })?;

    if uri.trim().is_empty() {
        return Err(ReconcileError::Lookup {
            key_vault_id: key_vault_id.to_string(),
            source: DriverError::ReadFailed("resolver returned an empty vault URI".into()),
        });
    }

    debug!(key_vault_id, %uri, "Resolved key vault URI");
    Ok(uri)
}
