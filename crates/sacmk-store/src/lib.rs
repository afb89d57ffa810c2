pub mod error;
pub mod state;
pub mod store;
pub mod memory;
pub mod redb_store;

pub use error::StoreError;
pub use state::{compute_desired_hash, AuditEvent, ResourceState};
pub use store::StateStore;
pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
