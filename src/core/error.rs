use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record '{0}' not found")]
    NotFound(String),

    #[error("Conflict: {field} '{value}' is already taken")]
    Conflict { field: &'static str, value: String },

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Store is closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn conflict(field: &'static str, value: impl Into<String>) -> Self {
        Self::Conflict {
            field,
            value: value.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::StoreError;

    #[test]
    fn conflict_message_names_field_and_value() {
        let err = StoreError::conflict("email", "ann@x.com");
        assert!(err.is_conflict());
        assert_eq!(
            err.to_string(),
            "Conflict: email 'ann@x.com' is already taken"
        );
    }

    #[test]
    fn classifiers_match_only_their_variant() {
        assert!(StoreError::NotFound("abc".into()).is_not_found());
        assert!(!StoreError::NotFound("abc".into()).is_persistence());
        assert!(StoreError::persistence("disk full").is_persistence());
        assert!(!StoreError::Closed.is_conflict());
    }
}
