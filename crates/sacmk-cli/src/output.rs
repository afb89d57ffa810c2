use sacmk_reconciler::Change;
use sacmk_store::ResourceState;

/// Render a list of changes as human-readable text.
pub fn render_changes(changes: &[Change]) -> String {
    if changes.is_empty() {
        return "No changes.\n".to_string();
    }
    let mut out = String::new();
    for change in changes {
        let line = match change {
            Change::Created { name, storage_account_id } => {
                format!("+ {} ({})", name, storage_account_id)
            }
            Change::Updated { name, storage_account_id } => {
                format!("~ {} ({})", name, storage_account_id)
            }
            Change::Replaced { name, from, to } => format!("-/+ {} ({} -> {})", name, from, to),
            Change::Reverted { name, storage_account_id } => {
                format!("- {} ({}, reverted to platform-managed keys)", name, storage_account_id)
            }
            Change::Dropped { name } => format!("x {} (storage account gone)", name),
            Change::Drifted { name, detail } => format!("! {}: {}", name, detail),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub fn render_errors(errors: &[String]) -> String {
    let mut out = format!("\n{} error(s):\n", errors.len());
    for e in errors {
        out.push_str(&format!("  ! {}\n", e));
    }
    out
}

/// One block per record: account, key in use, last reconcile time.
pub fn render_status(states: &[ResourceState]) -> String {
    if states.is_empty() {
        return "No records.\n".to_string();
    }
    let mut out = String::new();
    for state in states {
        out.push_str(&format!("{}\n", state.name));
        out.push_str(&format!("  account: {}\n", state.desired.storage_account_id));

        let key = match state.observed.as_ref().and_then(|o| o.key_vault_ref.as_ref()) {
            Some(kv) => format!(
                "{}/{} ({})",
                kv.key_name,
                kv.key_version,
                kv.key_vault_uri.as_deref().unwrap_or("unknown vault")
            ),
            None if state.observed.is_some() => "platform-managed".to_string(),
            None => "unknown".to_string(),
        };
        out.push_str(&format!("  key: {}\n", key));

        match &state.last_reconciled_at {
            Some(at) => out.push_str(&format!("  reconciled: {}\n", at.to_rfc3339())),
            None => out.push_str("  reconciled: never\n"),
        }
    }
    out
}
