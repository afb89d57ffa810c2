use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "sacmk",
    about = "Keep storage account encryption keys in line with YAML declarations",
    version
)]
pub struct Cli {
    /// Where storage accounts live.
    #[arg(long, env = "SACMK_CLOUD", default_value = "local", global = true)]
    pub cloud: CloudArg,

    /// Path of the redb state file. Defaults to ~/.sacmk/state.redb.
    #[arg(long, env = "SACMK_STATE_PATH", global = true)]
    pub state_path: Option<PathBuf>,

    /// Keep state in memory only; nothing survives the process.
    #[arg(long, global = true)]
    pub ephemeral: bool,

    /// Azure tenant ID.
    #[arg(long, env = "ARM_TENANT_ID", global = true)]
    pub azure_tenant_id: Option<String>,

    /// Subscription the storage accounts belong to.
    #[arg(long, env = "ARM_SUBSCRIPTION_ID", global = true)]
    pub azure_subscription_id: Option<String>,

    /// Service principal client ID. Without it and the secret, the Azure CLI
    /// login is used.
    #[arg(long, env = "ARM_CLIENT_ID", global = true)]
    pub azure_client_id: Option<String>,

    /// Service principal client secret.
    #[arg(long, env = "ARM_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub azure_client_secret: Option<String>,

    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile and apply all changes.
    Apply {
        /// Directory of declaration files.
        declarations_dir: PathBuf,
    },

    /// Show what would change without applying.
    Diff {
        /// Directory of declaration files.
        declarations_dir: PathBuf,
    },

    /// Read every recorded account back and report drift.
    Refresh,

    /// Adopt the encryption settings of an existing storage account.
    Import {
        /// Record name; use the same name in a declaration afterwards.
        name: String,
        /// Storage account ID, optionally ending in /encryptionSettings.
        handle: String,
    },

    /// List recorded resources.
    Status,

    /// Show the audit log.
    Events {
        /// Only events about this record.
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum CloudArg {
    Local,
    Azure,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}
