//! Error types for the import engine

use thiserror::Error;

use crate::validation::FieldError;

/// Result type for persistence operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a persistence backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Stored payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("Store error: {0}")]
    Internal(String),
}

/// Errors that can occur while importing records
#[derive(Error, Debug)]
pub enum ImportError {
    /// More records were submitted than the configured ceiling allows
    #[error("Please limit upload file to {limit} line items.")]
    BatchLimitExceeded { count: usize, limit: usize },

    /// The caller used the engine incorrectly (missing lookup field, bad descriptor)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A raw association value did not match any related entity
    #[error("Association not found: {field} with {mapping_key} '{value}'")]
    AssociationNotFound {
        field: String,
        mapping_key: String,
        value: String,
    },

    /// The store rejected the entity
    #[error("Validation failed: {}", join_messages(.0))]
    ValidationFailure(Vec<FieldError>),

    /// A lifecycle hook returned an error
    #[error("Hook {hook} failed: {message}")]
    Hook { hook: String, message: String },

    /// Persistence failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Anything else raised while processing a record
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ImportError {
    /// Wrap a hook failure, keeping the full error chain in the message
    pub fn hook(hook: &str, error: anyhow::Error) -> Self {
        ImportError::Hook {
            hook: hook.to_string(),
            message: format!("{:#}", error),
        }
    }
}

fn join_messages(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::full_message)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_limit_message_names_limit() {
        let error = ImportError::BatchLimitExceeded { count: 5, limit: 3 };
        assert_eq!(error.to_string(), "Please limit upload file to 3 line items.");
    }

    #[test]
    fn test_association_not_found_message() {
        let error = ImportError::AssociationNotFound {
            field: "group".to_string(),
            mapping_key: "name".to_string(),
            value: "X".to_string(),
        };
        assert_eq!(error.to_string(), "Association not found: group with name 'X'");
    }

    #[test]
    fn test_validation_failure_joins_field_messages() {
        let error = ImportError::ValidationFailure(vec![
            FieldError::new("name", "can't be blank"),
            FieldError::new("email_address", "is invalid"),
        ]);
        assert_eq!(
            error.to_string(),
            "Validation failed: Name can't be blank, Email address is invalid"
        );
    }

    #[test]
    fn test_hook_error_keeps_context_chain() {
        let source = anyhow::anyhow!("disk full").context("writing audit row");
        let error = ImportError::hook("before_save", source);
        assert_eq!(
            error.to_string(),
            "Hook before_save failed: writing audit row: disk full"
        );
    }
}
