//! Sequential, human-readable identifiers backed by store counters.
//!
//! Each [`IdType`] owns one counter document at `counters/<counter key>`.
//! The counter is only ever advanced through the store's optimistic
//! transaction, so concurrent callers (in this process or any other) never
//! receive the same value and the issued values have no gaps.

use std::str::FromStr;

use document_store::{
    Document, DocumentPath, DocumentStore, DocumentStoreError, DocumentStoreExt, Transaction,
    TransactionResult,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::error::DomainError;

/// Collection holding one counter document per [`IdType`].
pub const COUNTERS_COLLECTION: &str = "counters";

/// Minimum number of digits in a formatted identifier.
pub const MIN_DIGITS: usize = 4;

/// Logical category an identifier is issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdType {
    User,
    Product,
    Order,
}

impl IdType {
    pub const ALL: [IdType; 3] = [IdType::User, IdType::Product, IdType::Order];

    /// Prefix of the formatted identifier.
    pub fn prefix(&self) -> &'static str {
        match self {
            IdType::User => "USR",
            IdType::Product => "PRD",
            IdType::Order => "ORD",
        }
    }

    /// Key of the counter document, independent of the display prefix.
    pub fn counter_key(&self) -> &'static str {
        match self {
            IdType::User => "users",
            IdType::Product => "products",
            IdType::Order => "orders",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::User => "USER",
            IdType::Product => "PRODUCT",
            IdType::Order => "ORDER",
        }
    }

    /// Store path of this type's counter.
    pub fn counter_path(&self) -> DocumentPath {
        DocumentPath::collection(COUNTERS_COLLECTION).child(self.counter_key())
    }
}

impl std::fmt::Display for IdType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when text names no [`IdType`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown id type: {0:?}")]
pub struct UnknownIdType(pub String);

impl FromStr for IdType {
    type Err = UnknownIdType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        IdType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownIdType(s.to_string()))
    }
}

/// Formats a counter value as `<PREFIX>-<value>`, zero-padded to at least
/// [`MIN_DIGITS`] digits. Wider values are never truncated.
pub fn format_id(id_type: IdType, value: u64) -> String {
    format!("{}-{:0width$}", id_type.prefix(), value, width = MIN_DIGITS)
}

/// Current value of one counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounter {
    #[serde(rename = "type")]
    pub id_type: IdType,
    pub counter: u64,
}

/// Issues sequential identifiers.
///
/// Holds no counter state of its own; every call goes to the store.
#[derive(Clone)]
pub struct IdGenerator<S> {
    store: S,
}

impl<S: DocumentStore> IdGenerator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Issues the next formatted identifier for `id_type`, e.g. `ORD-0042`.
    pub async fn generate(&self, id_type: IdType) -> Result<String, DomainError> {
        let value = self.generate_value(id_type).await?;
        Ok(format_id(id_type, value))
    }

    /// Advances the counter for `id_type` by one and returns the new value.
    ///
    /// An absent counter starts at 1. Fails with `CounterTransactionAborted`
    /// when the store gives up on conflicts or the counter would overflow,
    /// and with `StoreUnavailable` when the store errors or holds a value
    /// that is not a non-negative integer.
    #[tracing::instrument(skip(self), fields(id_type = %id_type))]
    pub async fn generate_value(&self, id_type: IdType) -> Result<u64, DomainError> {
        let path = id_type.counter_path();
        let mut corrupt: Option<serde_json::Error> = None;

        let mut handler = |current: Option<Document>| -> Transaction {
            let value = match current.map(serde_json::from_value::<u64>) {
                None => 0,
                Some(Ok(value)) => value,
                Some(Err(e)) => {
                    corrupt = Some(e);
                    return Transaction::Abort;
                }
            };
            match value.checked_add(1) {
                Some(next) => Transaction::Commit(json!(next)),
                None => Transaction::Abort,
            }
        };

        let outcome = self.store.transact(&path, &mut handler).await;

        match outcome {
            Ok(TransactionResult::Committed(document)) => {
                let value: u64 = serde_json::from_value(document)?;
                metrics::counter!("ids_generated_total", "type" => id_type.as_str()).increment(1);
                tracing::debug!(value, "Issued id");
                Ok(value)
            }
            Ok(TransactionResult::Aborted) => match corrupt {
                Some(e) => {
                    tracing::error!(%path, error = %e, "Counter holds a non-integer value");
                    Err(e.into())
                }
                None => {
                    tracing::error!(%path, "Counter is at its maximum value");
                    Err(DomainError::CounterTransactionAborted { id_type })
                }
            },
            Err(DocumentStoreError::RetriesExhausted { attempts, .. }) => {
                tracing::warn!(attempts, "Counter transaction kept conflicting");
                Err(DomainError::CounterTransactionAborted { id_type })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current counter value, 0 if nothing was issued yet. Never writes.
    #[tracing::instrument(skip(self), fields(id_type = %id_type))]
    pub async fn peek(&self, id_type: IdType) -> Result<u64, DomainError> {
        let value = self.store.get_as::<u64>(&id_type.counter_path()).await?;
        Ok(value.unwrap_or(0))
    }

    /// Sets the counter back to 0.
    ///
    /// Not transactional: a `generate` running at the same time may commit
    /// on top of the reset or be overwritten by it.
    #[tracing::instrument(skip(self), fields(id_type = %id_type))]
    pub async fn reset(&self, id_type: IdType) -> Result<(), DomainError> {
        tracing::warn!("Resetting id counter; concurrent generation may issue duplicates");
        self.store.set(&id_type.counter_path(), json!(0)).await?;
        Ok(())
    }

    /// Current value of every counter.
    pub async fn counters(&self) -> Result<Vec<IdCounter>, DomainError> {
        let mut counters = Vec::with_capacity(IdType::ALL.len());
        for id_type in IdType::ALL {
            counters.push(IdCounter {
                id_type,
                counter: self.peek(id_type).await?,
            });
        }
        Ok(counters)
    }
}
