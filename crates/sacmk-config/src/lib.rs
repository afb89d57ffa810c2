mod raw;
mod loader;
pub mod error;

pub use loader::{load_declarations, Declaration};
pub use error::ConfigError;
