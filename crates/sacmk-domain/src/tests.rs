#[cfg(test)]
mod tests {
    use crate::types::*;
    use crate::DomainError;

    const ACCOUNT: &str =
        "/subscriptions/S/resourceGroups/G/providers/Microsoft.Storage/storageAccounts/acct1";
    const VAULT: &str =
        "/subscriptions/S/resourceGroups/G/providers/Microsoft.KeyVault/vaults/vault1";

    fn key_vault() -> KeyVaultRef {
        KeyVaultRef {
            key_vault_policy_id: format!("{}/objectId/abc", VAULT),
            key_vault_id: VAULT.into(),
            key_name: "k1".into(),
            key_version: "v1".into(),
            key_vault_uri: None,
        }
    }

    #[test]
    fn handle_strips_suffix() {
        let handle = ResourceHandle::new(format!("{}/encryptionSettings", ACCOUNT));
        assert_eq!(handle.storage_account_id(), ACCOUNT);
    }

    #[test]
    fn handle_without_suffix_is_unchanged() {
        let handle = ResourceHandle::new(ACCOUNT);
        assert_eq!(handle.storage_account_id(), ACCOUNT);
    }

    #[test]
    fn key_source_wire_names() {
        assert_eq!(
            serde_json::to_value(KeySource::PlatformManaged).unwrap(),
            "Microsoft.Storage"
        );
        assert_eq!(
            serde_json::to_value(KeySource::KeyVaultManaged).unwrap(),
            "Microsoft.Keyvault"
        );
        let parsed: KeySource = serde_json::from_str("\"Microsoft.KeyVault\"").unwrap();
        assert_eq!(parsed, KeySource::KeyVaultManaged);
    }

    #[test]
    fn validate_accepts_platform_managed() {
        DeclaredConfiguration::new(ACCOUNT).validate().unwrap();
    }

    #[test]
    fn validate_accepts_key_vault() {
        DeclaredConfiguration::new(ACCOUNT)
            .with_key_vault(key_vault())
            .validate()
            .unwrap();
    }

    #[test]
    fn validate_rejects_bad_account_id() {
        let err = DeclaredConfiguration::new("not-an-id").validate().unwrap_err();
        assert!(matches!(err, DomainError::MalformedIdentifier { .. }));
    }

    #[test]
    fn validate_rejects_empty_key_name() {
        let mut kv = key_vault();
        kv.key_name = "  ".into();
        let err = DeclaredConfiguration::new(ACCOUNT)
            .with_key_vault(kv)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("key_name"), "got: {}", err);
    }

    #[test]
    fn validate_rejects_bad_vault_id() {
        let mut kv = key_vault();
        kv.key_vault_id = "vault1".into();
        let err = DeclaredConfiguration::new(ACCOUNT)
            .with_key_vault(kv)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("key_vault_id"), "got: {}", err);
    }

    #[test]
    fn uri_omitted_from_json_when_unset() {
        let decl = DeclaredConfiguration::new(ACCOUNT).with_key_vault(key_vault());
        let json = serde_json::to_value(&decl).unwrap();
        assert!(json["key_vault_ref"].get("key_vault_uri").is_none());
    }

    #[test]
    fn apply_fragment_replaces_key_vault_ref() {
        let mut decl = DeclaredConfiguration::new(ACCOUNT).with_key_vault(key_vault());
        decl.apply_fragment(&DeclaredFragment::default());
        assert!(decl.key_vault_ref.is_none());

        let mut recovered = key_vault();
        recovered.key_vault_uri = Some("https://vault1.vault.azure.net/".into());
        decl.apply_fragment(&DeclaredFragment {
            key_vault_ref: Some(recovered.clone()),
            blob_encryption_enabled: Some(true),
            file_encryption_enabled: Some(true),
        });
        assert_eq!(decl.key_vault_ref, Some(recovered));
    }
}
