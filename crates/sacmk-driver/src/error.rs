use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("update failed: {0}")]
    UpdateFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("internal driver error: {0}")]
    Internal(String),
}

impl DriverError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DriverError::NotFound(_))
    }
}
