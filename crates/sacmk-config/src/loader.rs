use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sacmk_domain::{DeclaredConfiguration, KeyVaultRef};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::{RawDocument, RawEncryptionSettings, RawKeyVault};

/// One named encryption-settings declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub config: DeclaredConfiguration,
    /// File the declaration was read from.
    pub source: PathBuf,
}

/// Walk `dir` recursively and load every declaration in `*.yml` / `*.yaml`
/// files.
///
/// Expected file shape:
/// ```text
/// encryption_settings:
///   - name: prod-data
///     storage_account_id: /subscriptions/.../storageAccounts/acct1
///     key_vault:               # optional
///       key_vault_policy_id: ...
///       key_vault_id: ...
///       key_name: ...
///       key_version: ...
/// ```
///
/// Results are sorted by name. Names must be unique across the directory.
pub fn load_declarations(dir: &Path) -> Result<Vec<Declaration>, ConfigError> {
    // read_dir up front so a missing directory is an error rather than empty
    std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;
    files.sort();

    let mut out: Vec<Declaration> = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for file in files {
        let content = std::fs::read_to_string(&file).map_err(|e| ConfigError::Io {
            path: file.display().to_string(),
            source: e,
        })?;
        // Empty files are allowed and contribute nothing.
        if content.trim().is_empty() {
            continue;
        }
        let doc: RawDocument =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
                path: file.display().to_string(),
                source: e,
            })?;
        debug!("Loading {} declaration(s) from {}", doc.encryption_settings.len(), file.display());

        for raw in doc.encryption_settings {
            if let Some(first) = seen.get(&raw.name) {
                return Err(ConfigError::Duplicate {
                    name: raw.name,
                    path: file.display().to_string(),
                    first: first.display().to_string(),
                });
            }
            let decl = convert_declaration(raw, &file)?;
            seen.insert(decl.name.clone(), file.clone());
            out.push(decl);
        }
    }

    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn convert_declaration(raw: RawEncryptionSettings, path: &Path) -> Result<Declaration, ConfigError> {
    if raw.name.trim().is_empty() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: "declaration name must not be empty".into(),
        });
    }

    let key_vault_ref = raw
        .key_vault
        .map(|kv| convert_key_vault(kv, &raw.name, path))
        .transpose()?;

    let config = DeclaredConfiguration {
        storage_account_id: raw.storage_account_id,
        key_vault_ref,
    };
    config.validate().map_err(|e| ConfigError::Invalid {
        name: raw.name.clone(),
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Declaration {
        name: raw.name,
        config,
        source: path.to_path_buf(),
    })
}

fn convert_key_vault(raw: RawKeyVault, name: &str, path: &Path) -> Result<KeyVaultRef, ConfigError> {
    if raw.key_vault_uri.is_some() {
        return Err(ConfigError::Conversion {
            path: path.display().to_string(),
            message: format!(
                "'{}': key_vault.key_vault_uri is computed from key_vault_id and cannot be set",
                name
            ),
        });
    }
    Ok(KeyVaultRef {
        key_vault_policy_id: raw.key_vault_policy_id,
        key_vault_id: raw.key_vault_id,
        key_name: raw.key_name,
        key_version: raw.key_version,
        key_vault_uri: None,
    })
}
