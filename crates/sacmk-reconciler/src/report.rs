use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileRequest {
    pub declarations_dir: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Change {
    Created { name: String, storage_account_id: String },
    Updated { name: String, storage_account_id: String },
    /// `storage_account_id` changed: the old account is reverted and the new
    /// one configured.
    Replaced { name: String, from: String, to: String },
    /// No longer declared: the account is reverted and the record dropped.
    Reverted { name: String, storage_account_id: String },
    /// The storage account is gone; the record was dropped.
    Dropped { name: String },
    Drifted { name: String, detail: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub changes: Vec<Change>,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            changes: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}
