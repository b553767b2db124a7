pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{DocumentKey, DocumentPath};
pub use error::{DocumentStoreError, Result};
pub use memory::InMemoryDocumentStore;
pub use postgres::PostgresDocumentStore;
pub use query::ChildQuery;
pub use store::{
    DEFAULT_MAX_RETRIES, Document, DocumentStore, DocumentStoreExt, Transaction,
    TransactionHandler, TransactionResult,
};
