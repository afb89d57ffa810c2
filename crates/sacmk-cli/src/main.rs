mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command, LogFormat};
use sacmk_reconciler::{CancelHandle, OperationScope};
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    let (cancel, scope) = OperationScope::new();
    tokio::spawn(cancel_on_interrupt(cancel));

    let ctx = commands::Context::from_cli(&cli, scope)?;

    match cli.command {
        Command::Apply { declarations_dir } => commands::apply(&ctx, declarations_dir).await,
        Command::Diff { declarations_dir } => commands::diff(&ctx, declarations_dir).await,
        Command::Refresh => commands::refresh(&ctx).await,
        Command::Import { name, handle } => commands::import(&ctx, &name, &handle).await,
        Command::Status => commands::status(&ctx).await,
        Command::Events { name, limit } => commands::events(&ctx, name.as_deref(), limit).await,
    }
}

/// Trip the run's scope on Ctrl-C so in-flight remote calls are dropped and
/// the report covers what finished.
async fn cancel_on_interrupt(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("Received SIGINT, cancelling in-flight operations");
        cancel.cancel();
    }
}
