//! Domain error types.

use document_store::DocumentStoreError;
use thiserror::Error;

use crate::id_generator::IdType;
use crate::order::OrderError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Order validation or status change was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// The counter transaction did not commit within the store's retry budget.
    #[error("Counter transaction for {id_type} did not commit")]
    CounterTransactionAborted { id_type: IdType },

    /// The backing store failed or returned data that could not be decoded.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DocumentStoreError),

    /// A record written by this operation disappeared before it was read back.
    #[error("Inconsistent read: {entity} {id} vanished after write")]
    InconsistentRead { entity: &'static str, id: String },

    /// Another record already holds this unique value.
    #[error("{entity} with {field} {value:?} already exists")]
    DuplicateEntity {
        entity: &'static str,
        field: &'static str,
        value: String,
    },
}

impl From<serde_json::Error> for DomainError {
    fn from(e: serde_json::Error) -> Self {
        DomainError::StoreUnavailable(DocumentStoreError::Serialization(e))
    }
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns true for failures that are the caller's fault rather than the store's.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            DomainError::StoreUnavailable(_)
                | DomainError::CounterTransactionAborted { .. }
                | DomainError::InconsistentRead { .. }
        )
    }
}
