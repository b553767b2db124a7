use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{ChildQuery, DocumentKey, DocumentPath, DocumentStoreError, Result};

/// A JSON document as held by the store.
pub type Document = Value;

/// Number of times a transaction handler is re-run after a conflict before
/// the store gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 25;

const RETRY_BASE_DELAY: Duration = Duration::from_millis(1);
const RETRY_MAX_SHIFT: u32 = 5;

/// Random pause before re-running a conflicting transaction.
///
/// The window doubles with each attempt (1ms, 2ms, ... capped at 32ms) so
/// writers that collided spread out instead of colliding again.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let window = RETRY_BASE_DELAY * (1 << attempt.min(RETRY_MAX_SHIFT));
    let micros = u64::try_from(window.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(fastrand::u64(0..=micros))
}

/// Decision returned by a transaction handler.
#[derive(Debug, Clone, PartialEq)]
pub enum Transaction {
    /// Write this value if nobody changed the document since it was read.
    Commit(Document),
    /// Leave the document untouched and stop.
    Abort,
}

/// Outcome of [`DocumentStore::transact`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionResult {
    /// The handler's value was written; this is the committed value.
    Committed(Document),
    /// The handler aborted; nothing was written.
    Aborted,
}

impl TransactionResult {
    /// Returns the committed value, if any.
    pub fn committed(self) -> Option<Document> {
        match self {
            TransactionResult::Committed(value) => Some(value),
            TransactionResult::Aborted => None,
        }
    }
}

/// Read-modify-write callback for [`DocumentStore::transact`].
///
/// Receives the current document (`None` when absent). May run several times
/// when writers conflict, so it must depend only on its input and on values
/// captured before the transaction started.
pub type TransactionHandler<'a> = dyn FnMut(Option<Document>) -> Transaction + Send + 'a;

/// Core trait for document store implementations.
///
/// Documents live at `collection/key`; deeper paths address fields inside a
/// document. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads the value at a document or field path.
    ///
    /// Returns None if nothing is stored there.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// Replaces the value at a document or field path.
    ///
    /// Writing a field of a missing document creates the document.
    async fn set(&self, path: &DocumentPath, document: Document) -> Result<()>;

    /// Removes the value at a document or field path. Removing something
    /// absent is not an error.
    async fn remove(&self, path: &DocumentPath) -> Result<()>;

    /// Returns every child of a collection in key order.
    async fn list(&self, collection: &DocumentPath) -> Result<Vec<(DocumentKey, Document)>>;

    /// Returns the children of a collection matching an equality filter.
    async fn query(&self, query: ChildQuery) -> Result<Vec<(DocumentKey, Document)>>;

    /// Atomically replaces a document with the handler's output.
    ///
    /// The write only lands if the document is unchanged since the handler
    /// saw it; otherwise the handler is re-run against the fresh value. Fails
    /// with `RetriesExhausted` once the retry budget is spent.
    async fn transact(
        &self,
        path: &DocumentPath,
        handler: &mut TransactionHandler<'_>,
    ) -> Result<TransactionResult>;
}

#[async_trait]
impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        (**self).get(path).await
    }

    async fn set(&self, path: &DocumentPath, document: Document) -> Result<()> {
        (**self).set(path, document).await
    }

    async fn remove(&self, path: &DocumentPath) -> Result<()> {
        (**self).remove(path).await
    }

    async fn list(&self, collection: &DocumentPath) -> Result<Vec<(DocumentKey, Document)>> {
        (**self).list(collection).await
    }

    async fn query(&self, query: ChildQuery) -> Result<Vec<(DocumentKey, Document)>> {
        (**self).query(query).await
    }

    async fn transact(
        &self,
        path: &DocumentPath,
        handler: &mut TransactionHandler<'_>,
    ) -> Result<TransactionResult> {
        (**self).transact(path, handler).await
    }
}

/// Extension trait providing typed convenience methods for document stores.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Reads and deserializes the value at `path`.
    async fn get_as<T>(&self, path: &DocumentPath) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(path).await? {
            Some(document) => Ok(Some(serde_json::from_value(document)?)),
            None => Ok(None),
        }
    }

    /// Serializes `value` and writes it at `path`.
    async fn set_as<T>(&self, path: &DocumentPath, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let document = serde_json::to_value(value)?;
        self.set(path, document).await
    }

    /// Stores `value` under a freshly generated key and returns the key.
    async fn push<T>(&self, collection: &DocumentPath, value: &T) -> Result<DocumentKey>
    where
        T: Serialize + Sync,
    {
        validate_collection_path(collection)?;
        let key = DocumentKey::generate();
        self.set_as(&collection.child(key.as_str()), value).await?;
        Ok(key)
    }

    /// Children of `collection` whose `field` equals `value`.
    async fn query_equal(
        &self,
        collection: &DocumentPath,
        field: &str,
        value: Value,
    ) -> Result<Vec<(DocumentKey, Document)>> {
        self.query(ChildQuery::equal(collection.clone(), field, value))
            .await
    }

    /// Checks if anything is stored at `path`.
    async fn exists(&self, path: &DocumentPath) -> Result<bool> {
        Ok(self.get(path).await?.is_some())
    }
}

// Blanket implementation for all DocumentStore implementations
impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// Requires a single-segment collection path.
pub fn validate_collection_path(path: &DocumentPath) -> Result<()> {
    if path.is_collection() {
        Ok(())
    } else {
        Err(DocumentStoreError::InvalidPath {
            path: path.clone(),
            reason: "expected a collection path",
        })
    }
}

/// Requires a `collection/key` document path.
pub fn validate_document_path(path: &DocumentPath) -> Result<()> {
    if path.is_document() {
        Ok(())
    } else {
        Err(DocumentStoreError::InvalidPath {
            path: path.clone(),
            reason: "expected a document path",
        })
    }
}

/// Requires a document path or a field path below one.
pub fn validate_value_path(path: &DocumentPath) -> Result<()> {
    if path.depth() >= 2 {
        Ok(())
    } else {
        Err(DocumentStoreError::InvalidPath {
            path: path.clone(),
            reason: "expected a document or field path",
        })
    }
}

/// Follows `fields` down from `document`.
pub(crate) fn read_field<'a>(document: &'a Value, fields: &[String]) -> Option<&'a Value> {
    fields
        .iter()
        .try_fold(document, |node, field| node.get(field.as_str()))
}

/// Writes `value` at `fields` below `document`, creating intermediate objects
/// and replacing any non-object node in the way.
pub(crate) fn write_field(document: &mut Value, fields: &[String], value: Value) {
    let Some((last, parents)) = fields.split_last() else {
        *document = value;
        return;
    };

    let mut node = document;
    for field in parents {
        node = as_object(node)
            .entry(field.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    as_object(node).insert(last.clone(), value);
}

/// Removes the value at `fields` below `document`. Returns true if something was removed.
pub(crate) fn remove_field(document: &mut Value, fields: &[String]) -> bool {
    let Some((last, parents)) = fields.split_last() else {
        return false;
    };

    parents
        .iter()
        .try_fold(document, |node, field| node.get_mut(field.as_str()))
        .and_then(Value::as_object_mut)
        .and_then(|map| map.remove(last))
        .is_some()
}

fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was replaced by an object"),
    }
}
