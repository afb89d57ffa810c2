//! Default encryption configuration every write starts from.

use sacmk_domain::KeySource;
use sacmk_driver::{
    AccountUpdateParameters, Encryption, EncryptionService, EncryptionServices, KeyVaultProperties,
};

fn all_services_enabled() -> EncryptionServices {
    EncryptionServices {
        blob: Some(EncryptionService::enabled()),
        file: Some(EncryptionService::enabled()),
    }
}

/// Blob and file encryption on, platform-managed keys, empty key-vault block.
pub fn baseline() -> AccountUpdateParameters {
    AccountUpdateParameters::from_encryption(Encryption {
        services: Some(all_services_enabled()),
        key_source: KeySource::PlatformManaged,
        key_vault_properties: Some(KeyVaultProperties::default()),
    })
}

/// The write issued in place of a delete: platform-managed keys with the
/// key-vault block left out entirely.
pub fn revert_to_default() -> AccountUpdateParameters {
    AccountUpdateParameters::from_encryption(Encryption {
        services: Some(all_services_enabled()),
        key_source: KeySource::PlatformManaged,
        key_vault_properties: None,
    })
}
