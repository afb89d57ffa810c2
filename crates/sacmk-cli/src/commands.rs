use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use sacmk_driver::{AzureDriver, AzureDriverConfig, LocalDriver};
use sacmk_reconciler::{
    EncryptionSettingsController, OperationScope, ReconcileReport, ReconcileRequest,
};
use sacmk_store::{InMemoryStore, RedbStore, StateStore};
use tracing::debug;

use crate::cli::{Cli, CloudArg};
use crate::output;

/// Store and controller wired up from the global flags, plus the scope every
/// remote call of this invocation runs under.
pub struct Context {
    store: Arc<dyn StateStore>,
    controller: EncryptionSettingsController,
    scope: OperationScope,
}

impl Context {
    pub fn from_cli(cli: &Cli, scope: OperationScope) -> Result<Self> {
        let store: Arc<dyn StateStore> = if cli.ephemeral {
            debug!("Using in-memory state store");
            Arc::new(InMemoryStore::new())
        } else {
            let path = match &cli.state_path {
                Some(p) => p.clone(),
                None => default_state_path()?,
            };
            debug!("Using redb state store at {}", path.display());
            Arc::new(
                RedbStore::open(&path)
                    .with_context(|| format!("Failed to open state store at {}", path.display()))?,
            )
        };

        let controller = match cli.cloud {
            CloudArg::Local => {
                let driver = LocalDriver::new();
                EncryptionSettingsController::new(Arc::new(driver.clone()), Arc::new(driver))
            }
            CloudArg::Azure => {
                let tenant_id = cli
                    .azure_tenant_id
                    .clone()
                    .context("--azure-tenant-id (or ARM_TENANT_ID) is required for --cloud azure")?;
                let subscription_id = cli.azure_subscription_id.clone().context(
                    "--azure-subscription-id (or ARM_SUBSCRIPTION_ID) is required for --cloud azure",
                )?;
                let driver = Arc::new(
                    AzureDriver::new(AzureDriverConfig {
                        tenant_id,
                        subscription_id,
                        client_id: cli.azure_client_id.clone(),
                        client_secret: cli.azure_client_secret.clone(),
                    })
                    .context("Failed to initialise Azure driver")?,
                );
                EncryptionSettingsController::new(driver.clone(), driver)
            }
        };

        debug!(cloud = ?cli.cloud, "Controller ready");
        Ok(Self {
            store,
            controller,
            scope,
        })
    }
}

// ── Apply ─────────────────────────────────────────────────────────────────────

pub async fn apply(ctx: &Context, declarations_dir: PathBuf) -> Result<()> {
    run_reconcile(ctx, declarations_dir, false).await
}

// ── Diff ──────────────────────────────────────────────────────────────────────

pub async fn diff(ctx: &Context, declarations_dir: PathBuf) -> Result<()> {
    run_reconcile(ctx, declarations_dir, true).await
}

// ── Refresh ───────────────────────────────────────────────────────────────────

pub async fn refresh(ctx: &Context) -> Result<()> {
    let report = sacmk_reconciler::refresh(ctx.store.clone(), &ctx.controller, &ctx.scope)
        .await
        .context("Refresh failed")?;
    print_report(&report, "found")
}

// ── Import ────────────────────────────────────────────────────────────────────

pub async fn import(ctx: &Context, name: &str, handle: &str) -> Result<()> {
    let imported =
        sacmk_reconciler::import_settings(name, handle, ctx.store.clone(), &ctx.controller, &ctx.scope)
            .await
            .with_context(|| format!("Failed to import {}", handle))?;

    let Some(state) = imported else {
        anyhow::bail!("storage account {} does not exist", handle);
    };

    println!(
        "Imported {} as '{}'.",
        state.handle.as_ref().map(|h| h.as_str()).unwrap_or(handle),
        name
    );
    if state.desired.key_vault_ref.is_some() {
        println!(
            "Key vault and access policy IDs cannot be read from the account; \
             declare them under '{}' and run apply.",
            name
        );
    }
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(ctx: &Context) -> Result<()> {
    let mut states = ctx.store.list_resources().await.context("Failed to list records")?;
    states.sort_by(|a, b| a.name.cmp(&b.name));
    print!("{}", output::render_status(&states));
    Ok(())
}

// ── Events ────────────────────────────────────────────────────────────────────

pub async fn events(ctx: &Context, name: Option<&str>, limit: u32) -> Result<()> {
    let events = ctx
        .store
        .list_events(name, limit)
        .await
        .context("Failed to list events")?;
    for event in &events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn default_state_path() -> Result<PathBuf> {
    let home = std::env::var_os("HOME")
        .context("HOME is not set; pass --state-path or --ephemeral")?;
    Ok(PathBuf::from(home).join(".sacmk").join("state.redb"))
}

async fn run_reconcile(ctx: &Context, declarations_dir: PathBuf, dry_run: bool) -> Result<()> {
    let req = ReconcileRequest {
        declarations_dir,
        dry_run,
    };
    let report = sacmk_reconciler::reconcile(req, ctx.store.clone(), &ctx.controller, &ctx.scope)
        .await
        .context("Reconcile failed")?;
    print_report(&report, if dry_run { "(dry run)" } else { "applied" })
}

fn print_report(report: &ReconcileReport, verb: &str) -> Result<()> {
    print!("{}", output::render_changes(&report.changes));
    println!("{} change(s) {}.", report.changes.len(), verb);

    if !report.errors.is_empty() {
        eprint!("{}", output::render_errors(&report.errors));
        anyhow::bail!("{} resource(s) failed", report.errors.len());
    }
    Ok(())
}
