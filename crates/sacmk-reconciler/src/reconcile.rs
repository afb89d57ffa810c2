use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sacmk_config::Declaration;
use sacmk_domain::{DeclaredConfiguration, DeclaredFragment};
use sacmk_store::{compute_desired_hash, AuditEvent, ResourceState, StateStore};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::controller::{EncryptionSettingsController, Observed};
use crate::error::ReconcileError;
use crate::projector::{key_selection, KeySelection};
use crate::report::{Change, ReconcileReport, ReconcileRequest};
use crate::scope::OperationScope;

enum Planned<'a> {
    Create(&'a Declaration),
    Update(&'a Declaration, &'a ResourceState),
    Replace(&'a Declaration, &'a ResourceState),
}

/// Bring every declaration under `req.declarations_dir` in line with the
/// remote accounts and record the outcome in `store`.
///
/// Per-resource failures are collected in the report and do not stop the
/// run; store failures do. Cancelling `scope` stops the run after the
/// in-flight resource, leaving the remaining ones for the next run.
pub async fn reconcile(
    req: ReconcileRequest,
    store: Arc<dyn StateStore>,
    controller: &EncryptionSettingsController,
    scope: &OperationScope,
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport::new(req.dry_run);

    // 1. Load YAML
    info!("Loading declarations from {:?}", req.declarations_dir);
    let declarations = sacmk_config::load_declarations(&req.declarations_dir)?;
    debug!("Loaded {} declarations", declarations.len());

    // 2. Load recorded state
    let actual: HashMap<String, ResourceState> = store
        .list_resources()
        .await?
        .into_iter()
        .map(|s| (s.name.clone(), s))
        .collect();

    // 3. Diff
    let declared_names: HashSet<&str> = declarations.iter().map(|d| d.name.as_str()).collect();
    let mut stale: Vec<&ResourceState> = actual
        .values()
        .filter(|s| !declared_names.contains(s.name.as_str()))
        .collect();
    stale.sort_by(|a, b| a.name.cmp(&b.name));

    for state in &stale {
        report.changes.push(Change::Reverted {
            name: state.name.clone(),
            storage_account_id: state.desired.storage_account_id.clone(),
        });
    }

    let mut plan: Vec<Planned<'_>> = Vec::new();
    for decl in &declarations {
        match actual.get(&decl.name) {
            None => {
                report.changes.push(Change::Created {
                    name: decl.name.clone(),
                    storage_account_id: decl.config.storage_account_id.clone(),
                });
                plan.push(Planned::Create(decl));
            }
            Some(state) if state.desired.storage_account_id != decl.config.storage_account_id => {
                report.changes.push(Change::Replaced {
                    name: decl.name.clone(),
                    from: state.desired.storage_account_id.clone(),
                    to: decl.config.storage_account_id.clone(),
                });
                plan.push(Planned::Replace(decl, state));
            }
            Some(state)
                if state.handle.is_none()
                    || state.desired_hash != compute_desired_hash(&decl.config) =>
            {
                report.changes.push(Change::Updated {
                    name: decl.name.clone(),
                    storage_account_id: decl.config.storage_account_id.clone(),
                });
                plan.push(Planned::Update(decl, state));
            }
            Some(_) => debug!(name = %decl.name, "Unchanged"),
        }
    }

    // 4. Dry-run gate
    if req.dry_run {
        info!("Dry run, skipping remote writes");
        return Ok(report);
    }

    // 5. Apply
    let run_id = Uuid::new_v4();
    store
        .append_event(&AuditEvent::ReconcileStarted {
            id: run_id,
            at: Utc::now(),
            dry_run: false,
        })
        .await?;

    // Reverts first so a declaration moved to a new name on the same account
    // ends up applied rather than reverted.
    let mut halted = false;
    for state in stale {
        match revert(store.as_ref(), controller, &state.name, &state.desired, scope).await? {
            Ok(()) => drop_record(store.as_ref(), &state.name).await?,
            Err(e) => {
                report.errors.push(format!("{}: {}", state.name, e));
                if scope.is_cancelled() {
                    halted = true;
                    break;
                }
            }
        }
    }

    for step in plan {
        if halted {
            break;
        }
        let (decl, existing) = match step {
            Planned::Create(decl) => (decl, None),
            Planned::Update(decl, state) => (decl, Some(state.clone())),
            Planned::Replace(decl, state) => {
                if let Err(e) =
                    revert(store.as_ref(), controller, &decl.name, &state.desired, scope).await?
                {
                    report.errors.push(format!("{}: {}", decl.name, e));
                    halted = scope.is_cancelled();
                    continue;
                }
                // The old account is released. Until the new one is written the
                // record names it without a handle, which the next run retries
                // as an update.
                let mut pending = state.clone();
                pending.desired = decl.config.clone();
                pending.desired_hash = compute_desired_hash(&decl.config);
                pending.handle = None;
                pending.observed = None;
                store.upsert_resource(&pending).await?;
                (decl, Some(pending))
            }
        };

        let handle = existing.as_ref().and_then(|s| s.handle.as_ref());
        match controller.create_or_update(&decl.config, handle, scope).await {
            Ok(Observed::Present(record)) => {
                let mut state = existing
                    .unwrap_or_else(|| ResourceState::new(&decl.name, decl.config.clone()));
                state.desired = decl.config.clone();
                state.desired_hash = compute_desired_hash(&decl.config);
                state.handle = Some(record.handle.clone());
                state.observed = Some(record.fragment);
                state.last_reconciled_at = Some(Utc::now());
                store.upsert_resource(&state).await?;

                store
                    .append_event(&AuditEvent::SettingsApplied {
                        id: Uuid::new_v4(),
                        at: Utc::now(),
                        name: decl.name.clone(),
                        handle: record.handle,
                    })
                    .await?;
            }
            Ok(Observed::Absent) => {
                report.errors.push(format!(
                    "{}: storage account {} not found after update",
                    decl.name, decl.config.storage_account_id
                ));
                if existing.is_some() {
                    drop_record(store.as_ref(), &decl.name).await?;
                }
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", decl.name, e));
                halted = scope.is_cancelled();
            }
        }
    }

    if halted {
        warn!("Reconcile cancelled, remaining resources left for the next run");
    }

    // 6. Final audit event
    store
        .append_event(&AuditEvent::ReconcileCompleted {
            id: run_id,
            at: Utc::now(),
            changes: report.changes.len(),
            dry_run: false,
        })
        .await?;

    info!(
        "Reconcile complete: {} changes, {} errors",
        report.changes.len(),
        report.errors.len()
    );
    Ok(report)
}

/// Read every recorded resource back from its account.
///
/// Records whose account is gone are dropped. Differences between the
/// recorded key and the one found on the account are reported as drift but
/// not corrected.
pub async fn refresh(
    store: Arc<dyn StateStore>,
    controller: &EncryptionSettingsController,
    scope: &OperationScope,
) -> Result<ReconcileReport, ReconcileError> {
    let mut report = ReconcileReport::new(false);
    let mut states = store.list_resources().await?;
    states.sort_by(|a, b| a.name.cmp(&b.name));

    for mut state in states {
        if state.handle.is_none() {
            continue;
        }
        match controller.read(&state.desired, scope).await {
            Ok(Observed::Present(fragment)) => {
                if let Some(detail) = drift(&state.desired, &fragment) {
                    warn!(name = %state.name, %detail, "Encryption settings drifted");
                    report.changes.push(Change::Drifted {
                        name: state.name.clone(),
                        detail,
                    });
                }
                state.observed = Some(fragment);
                state.last_reconciled_at = Some(Utc::now());
                store.upsert_resource(&state).await?;
            }
            Ok(Observed::Absent) => {
                report.changes.push(Change::Dropped {
                    name: state.name.clone(),
                });
                drop_record(store.as_ref(), &state.name).await?;
            }
            Err(e) => {
                report.errors.push(format!("{}: {}", state.name, e));
                if scope.is_cancelled() {
                    break;
                }
            }
        }
    }

    Ok(report)
}

/// Adopt the encryption settings of an existing account under `name`.
///
/// Returns `None` when the account does not exist. The recovered record has
/// empty vault and policy ids until a declaration with the same name is
/// applied.
pub async fn import_settings(
    name: &str,
    handle: &str,
    store: Arc<dyn StateStore>,
    controller: &EncryptionSettingsController,
    scope: &OperationScope,
) -> Result<Option<ResourceState>, ReconcileError> {
    if store.get_resource(name).await?.is_some() {
        return Err(ReconcileError::Internal(format!(
            "a record named '{}' already exists",
            name
        )));
    }

    let Some(record) = controller.import(handle, scope).await?.present() else {
        warn!(name, handle, "Nothing to import, storage account not found");
        return Ok(None);
    };

    info!(name, handle = %record.handle, "Imported encryption settings");
    let mut state = ResourceState::new(name, record.declared);
    state.handle = Some(record.handle.clone());
    state.observed = Some(record.fragment);
    state.last_reconciled_at = Some(Utc::now());
    store.upsert_resource(&state).await?;

    store
        .append_event(&AuditEvent::SettingsImported {
            id: Uuid::new_v4(),
            at: Utc::now(),
            name: name.to_string(),
            handle: record.handle,
        })
        .await?;

    Ok(Some(state))
}

/// Revert `declared`'s account to platform-managed keys.
///
/// The outer result carries store failures; the inner one the controller's.
/// An account that no longer exists counts as reverted.
async fn revert(
    store: &dyn StateStore,
    controller: &EncryptionSettingsController,
    name: &str,
    declared: &DeclaredConfiguration,
    scope: &OperationScope,
) -> Result<Result<(), ReconcileError>, ReconcileError> {
    match controller.delete(declared, scope).await {
        Ok(()) => {}
        Err(e) if e.is_remote_not_found() => {
            warn!(name, account = %declared.storage_account_id, "Storage account already gone");
            return Ok(Ok(()));
        }
        Err(e) => return Ok(Err(e)),
    }

    store
        .append_event(&AuditEvent::SettingsReverted {
            id: Uuid::new_v4(),
            at: Utc::now(),
            name: name.to_string(),
            storage_account_id: declared.storage_account_id.clone(),
        })
        .await?;
    Ok(Ok(()))
}

async fn drop_record(store: &dyn StateStore, name: &str) -> Result<(), ReconcileError> {
    store.delete_resource(name).await?;
    store
        .append_event(&AuditEvent::RecordDropped {
            id: Uuid::new_v4(),
            at: Utc::now(),
            name: name.to_string(),
        })
        .await?;
    Ok(())
}

/// Describe how `observed` departs from `desired`, if it does.
fn drift(desired: &DeclaredConfiguration, observed: &DeclaredFragment) -> Option<String> {
    if observed.blob_encryption_enabled == Some(false) {
        return Some("blob encryption is disabled".into());
    }
    if observed.file_encryption_enabled == Some(false) {
        return Some("file encryption is disabled".into());
    }

    match (key_selection(desired), &observed.key_vault_ref) {
        (KeySelection::KeyVault(want), Some(have))
            if want.key_name == have.key_name && want.key_version == have.key_version =>
        {
            None
        }
        (KeySelection::KeyVault(want), Some(have)) => Some(format!(
            "declared key {}/{}, account uses {}/{}",
            want.key_name, want.key_version, have.key_name, have.key_version
        )),
        (KeySelection::KeyVault(want), None) => Some(format!(
            "declared key {}/{}, account uses platform-managed keys",
            want.key_name, want.key_version
        )),
        (_, Some(have)) => Some(format!(
            "declared platform-managed keys, account uses {}/{}",
            have.key_name, have.key_version
        )),
        (_, None) => None,
    }
}
