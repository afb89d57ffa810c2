pub mod error;
pub mod resource_id;
pub mod types;

#[cfg(test)]
mod tests;

pub use error::DomainError;
pub use resource_id::{
    derive_handle, parse_key_vault_id, parse_storage_account_id, KeyVaultLocation, ResourceId,
    StorageAccountRef,
};
pub use types::*;
