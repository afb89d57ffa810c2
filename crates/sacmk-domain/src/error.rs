use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("malformed resource identifier {id:?}: {reason}")]
    MalformedIdentifier { id: String, reason: String },

    #[error("invalid declaration: `{field}` {reason}")]
    InvalidDeclaration { field: String, reason: String },
}

impl DomainError {
    pub(crate) fn malformed(id: &str, reason: impl Into<String>) -> Self {
        DomainError::MalformedIdentifier {
            id: id.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        DomainError::InvalidDeclaration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
