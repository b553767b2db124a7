//! Order and catalog persistence over a [`DocumentStore`].
//!
//! Records live under `users/<id>`, `products/<id>` and `orders/<id>`. The
//! key a record is stored under is authoritative for its `id`. An id that is
//! empty or contains `/` never names a record: reads return nothing and
//! writes fail with `NotFound`.

use std::cmp::Reverse;

use common::DocumentKey;
use document_store::{
    Document, DocumentPath, DocumentStore, DocumentStoreExt, Transaction, TransactionResult,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::catalog::{NewProduct, NewUser, Product, Role, User};
use crate::error::DomainError;
use crate::id_generator::{IdGenerator, IdType};
use crate::order::{NewOrder, Order, OrderError, OrderStatus};

pub const USERS: &str = "users";
pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";

/// How new records get their key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrategy {
    /// Random store-style push keys.
    #[default]
    PushKey,
    /// Sequential identifiers such as `ORD-0001` from the [`IdGenerator`].
    Sequential,
}

/// CRUD over users, products and orders.
///
/// Plain reads and writes are single store calls. Order status changes run
/// entirely inside one store transaction on the order's path, so two
/// concurrent updates cannot both apply against the same prior status.
#[derive(Clone)]
pub struct Repository<S> {
    ids: IdGenerator<S>,
    key_strategy: KeyStrategy,
}

impl<S: DocumentStore> Repository<S> {
    /// Creates a repository that assigns push keys.
    pub fn new(store: S) -> Self {
        Self {
            ids: IdGenerator::new(store),
            key_strategy: KeyStrategy::default(),
        }
    }

    pub fn with_key_strategy(mut self, key_strategy: KeyStrategy) -> Self {
        self.key_strategy = key_strategy;
        self
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        self.ids.store()
    }

    /// The generator used for sequential keys.
    pub fn ids(&self) -> &IdGenerator<S> {
        &self.ids
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    async fn next_key(&self, id_type: IdType) -> Result<DocumentKey, DomainError> {
        match self.key_strategy {
            KeyStrategy::PushKey => Ok(DocumentKey::generate()),
            KeyStrategy::Sequential => Ok(DocumentKey::new(self.ids.generate(id_type).await?)),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<T>, DomainError> {
        let Some(path) = DocumentPath::document(collection, id) else {
            return Ok(None);
        };
        match self.store().get(&path).await? {
            Some(document) => Ok(Some(decode(&DocumentKey::new(id), document)?)),
            None => Ok(None),
        }
    }

    async fn fetch_all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, DomainError> {
        let children = self
            .store()
            .list(&DocumentPath::collection(collection))
            .await?;
        decode_all(children)
    }

    // Users

    /// Stores a new user under a fresh key.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn save_user(&self, input: NewUser) -> Result<User, DomainError> {
        let key = self.next_key(IdType::User).await?;
        let user = User::from_new(key, input);
        self.store()
            .set_as(&user_path(user.id.as_str())?, &user)
            .await?;
        tracing::info!(user_id = %user.id, "User saved");
        Ok(user)
    }

    /// Stores a new user unless the email is already taken.
    ///
    /// The check and the write are separate store calls; two registrations
    /// racing on the same email can both succeed.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register_user(&self, input: NewUser) -> Result<User, DomainError> {
        if self.get_user_by_email(&input.email).await?.is_some() {
            tracing::debug!("Email already registered");
            return Err(DomainError::DuplicateEntity {
                entity: "User",
                field: "email",
                value: input.email,
            });
        }
        self.save_user(input).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>, DomainError> {
        self.fetch(USERS, user_id).await
    }

    /// Looks a user up by email. When several records share the email the
    /// first one in key order wins.
    #[tracing::instrument(skip(self))]
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DomainError> {
        let matches = self
            .store()
            .query_equal(&DocumentPath::collection(USERS), "email", json!(email))
            .await?;

        if matches.len() > 1 {
            tracing::warn!(count = matches.len(), "Several users share an email");
        }

        match matches.into_iter().next() {
            Some((key, document)) => Ok(Some(decode(&key, document)?)),
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all_users(&self) -> Result<Vec<User>, DomainError> {
        self.fetch_all(USERS).await
    }

    /// Writes only the role field, then reads the whole record back.
    ///
    /// Fails with `NotFound` if the user does not exist, and with
    /// `InconsistentRead` if the record vanished between the write and the
    /// read-back.
    #[tracing::instrument(skip(self))]
    pub async fn update_user_role(&self, user_id: &str, role: Role) -> Result<User, DomainError> {
        let path = user_path(user_id)?;
        let key = DocumentKey::new(user_id);

        if !self.store().exists(&path).await? {
            return Err(DomainError::not_found("User", user_id));
        }

        self.store().set(&path.child("role"), json!(role)).await?;

        let inconsistent = || DomainError::InconsistentRead {
            entity: "User",
            id: user_id.to_string(),
        };
        let document = self.store().get(&path).await?.ok_or_else(inconsistent)?;
        // A delete racing the role write leaves a role-only stub behind
        let user: User = decode(&key, document).map_err(|e| {
            tracing::warn!(error = %e, "User record incomplete after role update");
            inconsistent()
        })?;

        tracing::info!(role = %user.role, "User role updated");
        Ok(user)
    }

    /// Removes a user. Removing an unknown but well-formed id is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(&self, user_id: &str) -> Result<(), DomainError> {
        self.store()
            .remove(&user_path(user_id)?)
            .await?;
        tracing::info!("User deleted");
        Ok(())
    }

    // Products

    /// Stores a new product under a fresh key.
    #[tracing::instrument(skip(self, input), fields(name = %input.name))]
    pub async fn save_product(&self, input: NewProduct) -> Result<Product, DomainError> {
        let key = self.next_key(IdType::Product).await?;
        let product = Product::from_new(key, input);
        self.store()
            .set_as(&product_path(product.id.as_str())?, &product)
            .await?;
        tracing::info!(product_id = %product.id, "Product saved");
        Ok(product)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product_by_id(&self, product_id: &str) -> Result<Option<Product>, DomainError> {
        self.fetch(PRODUCTS, product_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all_products(&self) -> Result<Vec<Product>, DomainError> {
        self.fetch_all(PRODUCTS).await
    }

    /// Replaces an existing product's fields, keeping its id.
    ///
    /// Runs as a transaction so a product deleted concurrently is not
    /// brought back.
    #[tracing::instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        product_id: &str,
        input: NewProduct,
    ) -> Result<Product, DomainError> {
        let path = product_path(product_id)?;
        let product = Product::from_new(DocumentKey::new(product_id), input);
        let document = serde_json::to_value(&product)?;

        let mut handler = |current: Option<Document>| match current {
            Some(_) => Transaction::Commit(document.clone()),
            None => Transaction::Abort,
        };

        match self
            .store()
            .transact(&path, &mut handler)
            .await?
        {
            TransactionResult::Committed(_) => {
                tracing::info!("Product updated");
                Ok(product)
            }
            TransactionResult::Aborted => Err(DomainError::not_found("Product", product_id)),
        }
    }

    /// Removes a product. Removing an unknown but well-formed id is not an error.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, product_id: &str) -> Result<(), DomainError> {
        self.store()
            .remove(&product_path(product_id)?)
            .await?;
        tracing::info!("Product deleted");
        Ok(())
    }

    // Orders

    /// Validates and stores a new `PENDING` order.
    ///
    /// Validation runs before a key is drawn, so rejected orders never use
    /// up a sequential id.
    #[tracing::instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn save_order(&self, input: NewOrder) -> Result<Order, DomainError> {
        input.validate()?;

        let key = self.next_key(IdType::Order).await?;
        let order = Order::place(key, input)?;
        self.store()
            .set_as(&order_path(order.id().as_str())?, &order)
            .await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.id(), total = %order.total_amount(), "Order placed");
        Ok(order)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order_by_id(&self, order_id: &str) -> Result<Option<Order>, DomainError> {
        self.fetch(ORDERS, order_id).await
    }

    /// Every order, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn get_all_orders(&self) -> Result<Vec<Order>, DomainError> {
        let mut orders = self.fetch_all(ORDERS).await?;
        newest_first(&mut orders);
        Ok(orders)
    }

    /// Orders placed by `user_id`, most recent first.
    #[tracing::instrument(skip(self))]
    pub async fn get_orders_by_user_id(&self, user_id: &str) -> Result<Vec<Order>, DomainError> {
        let matches = self
            .store()
            .query_equal(&DocumentPath::collection(ORDERS), "userId", json!(user_id))
            .await?;
        let mut orders = decode_all(matches)?;
        newest_first(&mut orders);
        Ok(orders)
    }

    /// Moves an order to the status named by `status_text`.
    ///
    /// The text is parsed before the store is touched. Reading the order,
    /// checking the transition and writing the result happen in a single
    /// transaction on the order's path; a concurrent change makes the store
    /// re-run the check against the fresh record.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: &str,
        status_text: &str,
    ) -> Result<Order, DomainError> {
        let target: OrderStatus = status_text.parse()?;
        let path = order_path(order_id)?;
        let key = DocumentKey::new(order_id);
        let mut rejection: Option<DomainError> = None;

        let mut handler = |current: Option<Document>| -> Transaction {
            match advance(&key, current, target) {
                Ok(document) => {
                    rejection = None;
                    Transaction::Commit(document)
                }
                Err(e) => {
                    rejection = Some(e);
                    Transaction::Abort
                }
            }
        };

        let outcome = self
            .store()
            .transact(&path, &mut handler)
            .await?;

        match outcome {
            TransactionResult::Committed(document) => {
                let order: Order = decode(&key, document)?;
                metrics::counter!("order_status_transitions_total", "to" => target.as_str())
                    .increment(1);
                tracing::info!(status = %order.status(), "Order status updated");
                Ok(order)
            }
            TransactionResult::Aborted => {
                let err = rejection.unwrap_or_else(|| DomainError::not_found("Order", order_id));
                if let DomainError::Order(OrderError::IllegalTransition { from, to }) = &err {
                    metrics::counter!("order_status_rejections_total").increment(1);
                    tracing::info!(%from, %to, "Status change rejected");
                }
                Err(err)
            }
        }
    }
}

/// One attempt of a status change against the order as currently stored.
fn advance(
    key: &DocumentKey,
    current: Option<Document>,
    target: OrderStatus,
) -> Result<Document, DomainError> {
    let document = current.ok_or_else(|| DomainError::not_found("Order", key.as_str()))?;
    let mut order: Order = decode(key, document)?;
    order.transition_to(target)?;
    Ok(serde_json::to_value(&order)?)
}

/// Deserializes a stored record, taking its id from the key it lives under.
fn decode<T: DeserializeOwned>(key: &DocumentKey, mut document: Document) -> Result<T, DomainError> {
    if let Value::Object(fields) = &mut document {
        fields.insert("id".to_string(), json!(key));
    }
    Ok(serde_json::from_value(document)?)
}

fn decode_all<T: DeserializeOwned>(
    children: Vec<(DocumentKey, Document)>,
) -> Result<Vec<T>, DomainError> {
    children
        .into_iter()
        .map(|(key, document)| decode(&key, document))
        .collect()
}

/// Stable, so orders sharing a timestamp keep store order.
fn newest_first(orders: &mut [Order]) {
    orders.sort_by_key(|order| Reverse(order.timestamp()));
}

/// Path of record `id`. Ids that are empty or contain `/` name no record.
fn record_path(
    entity: &'static str,
    collection: &str,
    id: &str,
) -> Result<DocumentPath, DomainError> {
    DocumentPath::document(collection, id).ok_or_else(|| DomainError::not_found(entity, id))
}

fn user_path(id: &str) -> Result<DocumentPath, DomainError> {
    record_path("User", USERS, id)
}

fn product_path(id: &str) -> Result<DocumentPath, DomainError> {
    record_path("Product", PRODUCTS, id)
}

fn order_path(id: &str) -> Result<DocumentPath, DomainError> {
    record_path("Order", ORDERS, id)
}
