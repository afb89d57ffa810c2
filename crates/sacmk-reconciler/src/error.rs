use sacmk_domain::DomainError;
use sacmk_driver::DriverError;
use thiserror::Error;

use crate::scope::Operation;

/// Why an operation stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Requested,
    DeadlineExceeded,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::Requested => write!(f, "cancelled by caller"),
            CancelReason::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("malformed resource identifier {id:?}: {reason}")]
    MalformedIdentifier { id: String, reason: String },

    #[error("invalid declaration: `{field}` {reason}")]
    InvalidDeclaration { field: String, reason: String },

    #[error("resolving key vault URI for {key_vault_id}: {source}")]
    Lookup {
        key_vault_id: String,
        source: DriverError,
    },

    #[error("updating encryption settings of storage account {account}: {source}")]
    RemoteWrite { account: String, source: DriverError },

    #[error("reading storage account {account}: {source}")]
    RemoteRead { account: String, source: DriverError },

    #[error("{operation} of {account}: {reason}")]
    Cancelled {
        operation: Operation,
        account: String,
        reason: CancelReason,
    },

    #[error("config error: {0}")]
    Config(#[from] sacmk_config::ConfigError),

    #[error("store error: {0}")]
    Store(#[from] sacmk_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for ReconcileError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::MalformedIdentifier { id, reason } => {
                ReconcileError::MalformedIdentifier { id, reason }
            }
            DomainError::InvalidDeclaration { field, reason } => {
                ReconcileError::InvalidDeclaration { field, reason }
            }
        }
    }
}

impl ReconcileError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ReconcileError::Cancelled { .. })
    }

    /// A write that failed because the storage account no longer exists.
    pub fn is_remote_not_found(&self) -> bool {
        matches!(self, ReconcileError::RemoteWrite { source, .. } if source.is_not_found())
    }
}
