pub mod azure;
pub mod driver;
pub mod error;
pub mod local;
pub mod wire;

pub use azure::{AzureDriver, AzureDriverConfig};
pub use driver::{KeyVaultResolver, StorageAccountsApi};
pub use error::DriverError;
pub use local::LocalDriver;
pub use wire::{
    AccountProperties, AccountPropertiesUpdateParameters, AccountUpdateParameters, Encryption,
    EncryptionService, EncryptionServices, KeyVaultProperties, StorageAccount,
};
