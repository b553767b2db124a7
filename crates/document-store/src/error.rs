use thiserror::Error;

use crate::DocumentPath;

/// Errors that can occur when interacting with the document store.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// A transaction kept conflicting with concurrent writers and gave up.
    #[error("Transaction on {path} did not commit after {attempts} attempts")]
    RetriesExhausted { path: DocumentPath, attempts: u32 },

    /// The path does not address what the operation needs.
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath {
        path: DocumentPath,
        reason: &'static str,
    },

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, DocumentStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_failures_convert_into_store_errors() {
        let err = DocumentStoreError::from(sqlx::migrate::MigrateError::VersionMissing(1));
        assert!(matches!(err, DocumentStoreError::Migration(_)));
        assert!(err.to_string().starts_with("Migration error:"));
    }
}
