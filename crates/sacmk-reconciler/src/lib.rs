pub mod controller;
pub mod error;
pub mod keyvault;
pub mod policy;
pub mod projector;
pub mod reconcile;
pub mod report;
pub mod scope;

pub use controller::{EncryptionSettingsController, EncryptionSettingsRecord, Observed};
pub use error::{CancelReason, ReconcileError};
pub use keyvault::resolve_key_vault_uri;
pub use projector::{from_wire_read, key_selection, to_wire_update, KeySelection};
pub use reconcile::{import_settings, reconcile, refresh};
pub use report::{Change, ReconcileReport, ReconcileRequest};
pub use scope::{CancelHandle, Operation, OperationScope, Timeouts};
