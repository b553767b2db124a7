use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{
    ChildQuery, DocumentKey, DocumentPath, DocumentStoreError, Result,
    store::{
        DEFAULT_MAX_RETRIES, Document, DocumentStore, Transaction, TransactionHandler,
        TransactionResult, read_field, remove_field, retry_delay, validate_collection_path,
        validate_document_path, validate_value_path, write_field,
    },
};

#[derive(Debug, Clone)]
struct Entry {
    value: Document,
    revision: u64,
}

#[derive(Debug, Default)]
struct State {
    collections: HashMap<String, BTreeMap<String, Entry>>,
    /// Last revision handed out. Store-wide, so a re-created document never
    /// reuses a revision its predecessor had.
    revision: u64,
}

impl State {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn entry(&self, collection: &str, key: &str) -> Option<&Entry> {
        self.collections.get(collection)?.get(key)
    }
}

/// In-memory document store for tests and local runs.
///
/// Provides the same interface and transaction semantics as the PostgreSQL
/// implementation: every write bumps a revision and transactions only
/// commit against the revision they read.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    state: Arc<RwLock<State>>,
    available: Arc<AtomicBool>,
    max_retries: u32,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many times a conflicting transaction is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Simulates losing (`false`) or regaining (`true`) the connection.
    /// While unavailable every operation fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns the total number of documents stored.
    pub async fn document_count(&self) -> usize {
        self.state
            .read()
            .await
            .collections
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Clears all documents.
    pub async fn clear(&self) {
        self.state.write().await.collections.clear();
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DocumentStoreError::Unavailable(
                "in-memory store is offline".to_string(),
            ))
        }
    }

    fn children(
        state: &State,
        collection: &DocumentPath,
    ) -> impl Iterator<Item = (DocumentKey, Document)> {
        collection
            .collection_name()
            .and_then(|name| state.collections.get(name))
            .into_iter()
            .flat_map(|docs| docs.iter())
            .map(|(key, entry)| (DocumentKey::new(key.as_str()), entry.value.clone()))
    }
}

/// Splits a validated value path into (collection, key).
fn locate(path: &DocumentPath) -> (&str, &str) {
    let segments = path.segments();
    (&segments[0], &segments[1])
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        validate_value_path(path)?;
        self.ensure_available()?;

        let (collection, key) = locate(path);
        let state = self.state.read().await;
        Ok(state
            .entry(collection, key)
            .and_then(|entry| read_field(&entry.value, path.field_segments()))
            .cloned())
    }

    async fn set(&self, path: &DocumentPath, document: Document) -> Result<()> {
        validate_value_path(path)?;
        self.ensure_available()?;

        let (collection, key) = locate(path);
        let mut state = self.state.write().await;
        let revision = state.next_revision();
        let docs = state.collections.entry(collection.to_string()).or_default();

        let mut value = docs
            .remove(key)
            .map(|entry| entry.value)
            .unwrap_or(Value::Null);
        write_field(&mut value, path.field_segments(), document);
        docs.insert(key.to_string(), Entry { value, revision });
        Ok(())
    }

    async fn remove(&self, path: &DocumentPath) -> Result<()> {
        validate_value_path(path)?;
        self.ensure_available()?;

        let (collection, key) = locate(path);
        let mut state = self.state.write().await;
        let revision = state.next_revision();
        let Some(docs) = state.collections.get_mut(collection) else {
            return Ok(());
        };

        if path.is_document() {
            docs.remove(key);
        } else if let Some(entry) = docs.get_mut(key)
            && remove_field(&mut entry.value, path.field_segments())
        {
            entry.revision = revision;
        }
        Ok(())
    }

    async fn list(&self, collection: &DocumentPath) -> Result<Vec<(DocumentKey, Document)>> {
        validate_collection_path(collection)?;
        self.ensure_available()?;

        let state = self.state.read().await;
        Ok(Self::children(&state, collection).collect())
    }

    async fn query(&self, query: ChildQuery) -> Result<Vec<(DocumentKey, Document)>> {
        validate_collection_path(&query.collection)?;
        self.ensure_available()?;

        let state = self.state.read().await;
        let matching = Self::children(&state, &query.collection)
            .filter(|(_, document)| query.matches(document));

        Ok(match query.limit_to_first {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn transact(
        &self,
        path: &DocumentPath,
        handler: &mut TransactionHandler<'_>,
    ) -> Result<TransactionResult> {
        validate_document_path(path)?;
        let (collection, key) = locate(path);

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(retry_delay(attempt)).await;
            }
            self.ensure_available()?;

            let (current, read_revision) = {
                let state = self.state.read().await;
                match state.entry(collection, key) {
                    Some(entry) => (Some(entry.value.clone()), Some(entry.revision)),
                    None => (None, None),
                }
            };

            // Let other tasks run between read and commit, as a network
            // round-trip would.
            tokio::task::yield_now().await;

            let next = match handler(current) {
                Transaction::Commit(value) => value,
                Transaction::Abort => return Ok(TransactionResult::Aborted),
            };

            let mut state = self.state.write().await;
            let actual_revision = state.entry(collection, key).map(|entry| entry.revision);
            if actual_revision != read_revision {
                tracing::debug!(%path, attempt, "transaction conflict, retrying");
                metrics::counter!("document_store_transaction_conflicts_total").increment(1);
                continue;
            }

            let revision = state.next_revision();
            state
                .collections
                .entry(collection.to_string())
                .or_default()
                .insert(
                    key.to_string(),
                    Entry {
                        value: next.clone(),
                        revision,
                    },
                );
            metrics::counter!("document_store_transactions_committed_total").increment(1);
            return Ok(TransactionResult::Committed(next));
        }

        metrics::counter!("document_store_transactions_exhausted_total").increment(1);
        Err(DocumentStoreError::RetriesExhausted {
            path: path.clone(),
            attempts: self.max_retries + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::DocumentStoreExt;

    fn path(p: &str) -> DocumentPath {
        DocumentPath::parse(p)
    }

    #[tokio::test]
    async fn set_and_get_document() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&path("products/p1"), json!({"name": "Lamp", "quantity": 3}))
            .await
            .unwrap();

        let doc = store.get(&path("products/p1")).await.unwrap();
        assert_eq!(doc, Some(json!({"name": "Lamp", "quantity": 3})));
        assert_eq!(store.document_count().await, 1);
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get(&path("orders/nope")).await.unwrap().is_none());
        assert!(
            store
                .get(&path("orders/nope/status"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn field_write_only_touches_that_field() {
        let store = InMemoryDocumentStore::new();
        store
            .set(
                &path("users/u1"),
                json!({"email": "a@example.com", "role": "CUSTOMER"}),
            )
            .await
            .unwrap();

        store
            .set(&path("users/u1/role"), json!("ADMIN"))
            .await
            .unwrap();

        let doc = store.get(&path("users/u1")).await.unwrap().unwrap();
        assert_eq!(doc, json!({"email": "a@example.com", "role": "ADMIN"}));
        assert_eq!(
            store.get(&path("users/u1/role")).await.unwrap(),
            Some(json!("ADMIN"))
        );
    }

    #[tokio::test]
    async fn remove_document_and_field() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&path("products/p1"), json!({"name": "Lamp", "imageUrl": "x"}))
            .await
            .unwrap();

        store.remove(&path("products/p1/imageUrl")).await.unwrap();
        assert_eq!(
            store.get(&path("products/p1")).await.unwrap(),
            Some(json!({"name": "Lamp"}))
        );

        store.remove(&path("products/p1")).await.unwrap();
        assert!(store.get(&path("products/p1")).await.unwrap().is_none());

        // Removing again is fine
        store.remove(&path("products/p1")).await.unwrap();
    }

    #[tokio::test]
    async fn list_returns_children_in_key_order() {
        let store = InMemoryDocumentStore::new();
        for key in ["c", "a", "b"] {
            store
                .set(&path(&format!("items/{key}")), json!({"key": key}))
                .await
                .unwrap();
        }

        let keys: Vec<_> = store
            .list(&path("items"))
            .await
            .unwrap()
            .into_iter()
            .map(|(key, _)| key.to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        assert!(store.list(&path("empty")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_equal_filters_children() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&path("orders/o1"), json!({"userId": "u1"}))
            .await
            .unwrap();
        store
            .set(&path("orders/o2"), json!({"userId": "u2"}))
            .await
            .unwrap();
        store
            .set(&path("orders/o3"), json!({"userId": "u1"}))
            .await
            .unwrap();

        let results = store
            .query_equal(&path("orders"), "userId", json!("u1"))
            .await
            .unwrap();
        let keys: Vec<_> = results.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["o1", "o3"]);

        let limited = store
            .query(ChildQuery::equal(path("orders"), "userId", "u1").limit_to_first(1))
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn invalid_paths_are_rejected() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(
            store.get(&path("orders")).await,
            Err(DocumentStoreError::InvalidPath { .. })
        ));
        assert!(matches!(
            store.list(&path("orders/o1")).await,
            Err(DocumentStoreError::InvalidPath { .. })
        ));

        let mut handler = |_: Option<Document>| Transaction::Commit(json!(1));
        assert!(matches!(
            store.transact(&path("counters/users/x"), &mut handler).await,
            Err(DocumentStoreError::InvalidPath { .. })
        ));
    }

    #[tokio::test]
    async fn transact_initializes_absent_value() {
        let store = InMemoryDocumentStore::new();
        let mut handler = |current: Option<Document>| {
            let value = current.and_then(|v| v.as_u64()).unwrap_or(0);
            Transaction::Commit(json!(value + 1))
        };

        let result = store
            .transact(&path("counters/users"), &mut handler)
            .await
            .unwrap();
        assert_eq!(result, TransactionResult::Committed(json!(1)));

        let result = store
            .transact(&path("counters/users"), &mut handler)
            .await
            .unwrap();
        assert_eq!(result, TransactionResult::Committed(json!(2)));
    }

    #[tokio::test]
    async fn transact_abort_writes_nothing() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&path("orders/o1"), json!({"status": "DELIVERED"}))
            .await
            .unwrap();

        let mut handler = |_: Option<Document>| Transaction::Abort;
        let result = store
            .transact(&path("orders/o1"), &mut handler)
            .await
            .unwrap();

        assert_eq!(result, TransactionResult::Aborted);
        assert_eq!(
            store.get(&path("orders/o1")).await.unwrap(),
            Some(json!({"status": "DELIVERED"}))
        );
    }

    #[tokio::test]
    async fn concurrent_transactions_do_not_lose_updates() {
        const TASKS: u32 = 40;
        let store = InMemoryDocumentStore::new();

        let handles: Vec<_> = (0..TASKS)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    let mut handler = |current: Option<Document>| {
                        let value = current.and_then(|v| v.as_u64()).unwrap_or(0);
                        Transaction::Commit(json!(value + 1))
                    };
                    store
                        .transact(&DocumentPath::parse("counters/orders"), &mut handler)
                        .await
                })
            })
            .collect();

        let mut committed = Vec::new();
        for result in futures_util::future::join_all(handles).await {
            let value = result.unwrap().unwrap().committed().unwrap();
            committed.push(value.as_u64().unwrap());
        }
        committed.sort_unstable();

        assert_eq!(committed, (1..=u64::from(TASKS)).collect::<Vec<_>>());
        assert_eq!(
            store.get(&path("counters/orders")).await.unwrap(),
            Some(json!(TASKS))
        );
    }

    #[tokio::test]
    async fn conflicting_transaction_reruns_handler() {
        let store = InMemoryDocumentStore::new();
        store.set(&path("counters/users"), json!(5)).await.unwrap();

        let writer = store.clone();
        let mut calls = Vec::new();
        let mut handler = |current: Option<Document>| {
            let value = current.and_then(|v| v.as_u64()).unwrap_or(0);
            calls.push(value);
            Transaction::Commit(json!(value + 1))
        };

        // Another writer lands while the first attempt is between read and commit.
        let txn_path = path("counters/users");
        let write_path = path("counters/users");
        let (result, _) = tokio::join!(
            store.transact(&txn_path, &mut handler),
            writer.set(&write_path, json!(10)),
        );

        let committed = result.unwrap().committed().unwrap();
        assert_eq!(committed, json!(11));
        assert_eq!(calls.last(), Some(&10));
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempts() {
        let store = InMemoryDocumentStore::new().with_max_retries(0);
        store.set(&path("counters/users"), json!(1)).await.unwrap();

        let writer = store.clone();
        let mut handler = |current: Option<Document>| {
            let value = current.and_then(|v| v.as_u64()).unwrap_or(0);
            Transaction::Commit(json!(value + 1))
        };

        let txn_path = path("counters/users");
        let write_path = path("counters/users");
        let (result, _) = tokio::join!(
            store.transact(&txn_path, &mut handler),
            writer.set(&write_path, json!(100)),
        );

        assert!(matches!(
            result,
            Err(DocumentStoreError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(
            store.get(&path("counters/users")).await.unwrap(),
            Some(json!(100))
        );
    }

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let store = InMemoryDocumentStore::new();
        store.set_available(false);

        assert!(matches!(
            store.get(&path("users/u1")).await,
            Err(DocumentStoreError::Unavailable(_))
        ));

        store.set_available(true);
        assert!(store.get(&path("users/u1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn typed_helpers_round_trip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Product {
            name: String,
        }

        let store = InMemoryDocumentStore::new();
        let key = store
            .push(
                &path("products"),
                &Product {
                    name: "Lamp".to_string(),
                },
            )
            .await
            .unwrap();

        let doc_path = path("products").child(key.as_str());
        let product: Option<Product> = store.get_as(&doc_path).await.unwrap();
        assert_eq!(product.unwrap().name, "Lamp");
        assert!(store.exists(&doc_path).await.unwrap());
    }
}
