use async_trait::async_trait;
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    ChildQuery, DocumentKey, DocumentPath, DocumentStoreError, Result,
    store::{
        DEFAULT_MAX_RETRIES, Document, DocumentStore, Transaction, TransactionHandler,
        TransactionResult, read_field, remove_field, retry_delay, validate_collection_path,
        validate_document_path, validate_value_path, write_field,
    },
};

/// PostgreSQL-backed document store.
///
/// Each document is one JSONB row keyed by (collection, key) with a revision
/// column used for optimistic transactions.
#[derive(Clone)]
pub struct PostgresDocumentStore {
    pool: PgPool,
    max_retries: u32,
}

impl PostgresDocumentStore {
    /// Creates a new PostgreSQL document store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Sets how many times a conflicting transaction is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_child(row: PgRow) -> Result<(DocumentKey, Document)> {
        let key: String = row.try_get("key")?;
        let value: Value = row.try_get("value")?;
        Ok((DocumentKey::new(key), value))
    }

    /// Rewrites part of a document under a row lock.
    ///
    /// `edit` returns false when it left the document untouched.
    async fn edit_document<F>(&self, path: &DocumentPath, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Value) -> bool + Send,
    {
        let (collection, key) = locate(path);
        let mut tx = self.pool.begin().await?;

        let current: Option<Value> = sqlx::query_scalar(
            "SELECT value FROM documents WHERE collection = $1 AND key = $2 FOR UPDATE",
        )
        .bind(collection)
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?;

        let existed = current.is_some();
        let mut value = current.unwrap_or(Value::Null);
        if !edit(&mut value) {
            return Ok(());
        }

        if existed {
            sqlx::query(
                r#"
                UPDATE documents
                SET value = $3, revision = nextval('document_revisions'), updated_at = NOW()
                WHERE collection = $1 AND key = $2
                "#,
            )
            .bind(collection)
            .bind(key)
            .bind(&value)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO documents (collection, key, value)
                VALUES ($1, $2, $3)
                ON CONFLICT (collection, key) DO UPDATE SET
                    value = EXCLUDED.value,
                    revision = nextval('document_revisions'),
                    updated_at = NOW()
                "#,
            )
            .bind(collection)
            .bind(key)
            .bind(&value)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Splits a validated value path into (collection, key).
fn locate(path: &DocumentPath) -> (&str, &str) {
    let segments = path.segments();
    (&segments[0], &segments[1])
}

#[async_trait]
impl DocumentStore for PostgresDocumentStore {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        validate_value_path(path)?;
        let (collection, key) = locate(path);

        let value: Option<Value> =
            sqlx::query_scalar("SELECT value FROM documents WHERE collection = $1 AND key = $2")
                .bind(collection)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.and_then(|doc| read_field(&doc, path.field_segments()).cloned()))
    }

    async fn set(&self, path: &DocumentPath, document: Document) -> Result<()> {
        validate_value_path(path)?;

        if !path.is_document() {
            let fields = path.field_segments().to_vec();
            return self
                .edit_document(path, move |value| {
                    write_field(value, &fields, document);
                    true
                })
                .await;
        }

        let (collection, key) = locate(path);
        sqlx::query(
            r#"
            INSERT INTO documents (collection, key, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, key) DO UPDATE SET
                value = EXCLUDED.value,
                revision = nextval('document_revisions'),
                updated_at = NOW()
            "#,
        )
        .bind(collection)
        .bind(key)
        .bind(&document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, path: &DocumentPath) -> Result<()> {
        validate_value_path(path)?;

        if !path.is_document() {
            let fields = path.field_segments().to_vec();
            return self
                .edit_document(path, move |value| remove_field(value, &fields))
                .await;
        }

        let (collection, key) = locate(path);
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list(&self, collection: &DocumentPath) -> Result<Vec<(DocumentKey, Document)>> {
        validate_collection_path(collection)?;

        let rows = sqlx::query(
            r#"
            SELECT key, value
            FROM documents
            WHERE collection = $1
            ORDER BY key ASC
            "#,
        )
        .bind(collection.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_child).collect()
    }

    async fn query(&self, query: ChildQuery) -> Result<Vec<(DocumentKey, Document)>> {
        validate_collection_path(&query.collection)?;

        let mut sql = String::from("SELECT key, value FROM documents WHERE collection = $1");
        let mut param_count = 1;

        let filter = match (query.order_by_child, query.equal_to) {
            (Some(field), Some(value)) => Some((field, value)),
            _ => None,
        };

        // Build dynamic query
        if filter.is_some() {
            // Containment lets the GIN index narrow rows; equality keeps the match exact
            let (field_param, value_param) = (param_count + 1, param_count + 2);
            sql.push_str(&format!(
                " AND value @> jsonb_build_object(${field_param}::text, ${value_param}::jsonb)"
            ));
            sql.push_str(&format!(" AND value -> ${field_param} = ${value_param}"));
            param_count += 2;
        }

        sql.push_str(" ORDER BY key ASC");

        if query.limit_to_first.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql).bind(query.collection.to_string());
        if let Some((field, value)) = filter {
            sqlx_query = sqlx_query.bind(field).bind(value);
        }
        if let Some(limit) = query.limit_to_first {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_child).collect()
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
            let row: Option<PgRow> = sqlx::query(
                "SELECT value, revision FROM documents WHERE collection = $1 AND key = $2",
            )
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

            let (current, read_revision) = match row {
                Some(row) => (
                    Some(row.try_get::<Value, _>("value")?),
                    Some(row.try_get::<i64, _>("revision")?),
                ),
                None => (None, None),
            };

            let next = match handler(current) {
                Transaction::Commit(value) => value,
                Transaction::Abort => return Ok(TransactionResult::Aborted),
            };

            // Conditional write: only lands if the revision we read is still current
            let written = match read_revision {
                Some(revision) => sqlx::query(
                    r#"
                    UPDATE documents
                    SET value = $3, revision = nextval('document_revisions'), updated_at = NOW()
                    WHERE collection = $1 AND key = $2 AND revision = $4
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(&next)
                .bind(revision)
                .execute(&self.pool)
                .await?
                .rows_affected(),
                None => sqlx::query(
                    r#"
                    INSERT INTO documents (collection, key, value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (collection, key) DO NOTHING
                    "#,
                )
                .bind(collection)
                .bind(key)
                .bind(&next)
                .execute(&self.pool)
                .await?
                .rows_affected(),
            };

            if written == 1 {
                metrics::counter!("document_store_transactions_committed_total").increment(1);
                return Ok(TransactionResult::Committed(next));
            }

            tracing::debug!(%path, attempt, "transaction conflict, retrying");
            metrics::counter!("document_store_transaction_conflicts_total").increment(1);
        }

        metrics::counter!("document_store_transactions_exhausted_total").increment(1);
        Err(DocumentStoreError::RetriesExhausted {
            path: path.clone(),
            attempts: self.max_retries + 1,
        })
    }
}
