//! Composition root for the order backend.
//!
//! Builds the configured document store and hands the routing layer a
//! [`Backend`] exposing the repository and id generator.

pub mod cli;
pub mod config;
pub mod telemetry;

use std::sync::Arc;

use document_store::{DocumentStore, DocumentStoreError, InMemoryDocumentStore, PostgresDocumentStore};
use domain::{DomainError, IdGenerator, KeyStrategy, Repository};
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use config::{Config, ConfigError, StoreBackend};

/// Store shared by every component of the backend.
pub type SharedStore = Arc<dyn DocumentStore>;

/// Errors raised while starting or driving the backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(#[from] DocumentStoreError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Entry point the routing layer calls into.
#[derive(Clone)]
pub struct Backend {
    repository: Repository<SharedStore>,
}

impl Backend {
    /// Connects the store named by `config`, running migrations for PostgreSQL.
    #[tracing::instrument(skip(config), fields(store = ?config.store))]
    pub async fn connect(config: &Config) -> Result<Self, BackendError> {
        let store: SharedStore = match config.store {
            StoreBackend::Memory => Arc::new(
                InMemoryDocumentStore::new().with_max_retries(config.transaction_max_retries),
            ),
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or(ConfigError::MissingDatabaseUrl)?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.database_max_connections)
                    .connect(url)
                    .await?;
                let store = PostgresDocumentStore::new(pool)
                    .with_max_retries(config.transaction_max_retries);
                store.run_migrations().await?;
                tracing::info!("Migrations applied");
                Arc::new(store)
            }
        };

        tracing::info!(key_strategy = ?config.key_strategy, "Backend ready");
        Ok(Self::from_store(store, config.key_strategy))
    }

    /// Wraps an existing store.
    pub fn from_store(store: SharedStore, key_strategy: KeyStrategy) -> Self {
        Self {
            repository: Repository::new(store).with_key_strategy(key_strategy),
        }
    }

    /// A backend over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryDocumentStore::new()), KeyStrategy::default())
    }

    pub fn repository(&self) -> &Repository<SharedStore> {
        &self.repository
    }

    pub fn ids(&self) -> &IdGenerator<SharedStore> {
        self.repository.ids()
    }

    pub fn store(&self) -> &SharedStore {
        self.repository.store()
    }
}
