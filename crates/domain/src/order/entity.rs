//! Order entity.

use common::DocumentKey;
use serde::{Deserialize, Serialize};

use super::lifecycle::{epoch_millis, now_timestamp, refreshed_timestamp};
use super::{Money, OrderError, OrderItem, OrderStatus, UserId, can_transition};

/// Input for placing an order, as handed over by the routing layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
}

impl NewOrder {
    /// Creates the input with the total computed from the items.
    pub fn new(user_id: impl Into<UserId>, items: Vec<OrderItem>) -> Self {
        let total_amount = items.iter().map(OrderItem::line_total).sum();
        Self {
            user_id: user_id.into(),
            items,
            total_amount,
        }
    }

    /// Checks the fields every new order needs: an owner, at least one item,
    /// positive quantities and a positive total.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.user_id.is_blank() {
            return Err(OrderError::UserIdRequired);
        }
        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(item) = self.items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: item.product_id.to_string(),
                quantity: item.quantity,
            });
        }
        if !self.total_amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                amount: self.total_amount,
            });
        }
        Ok(())
    }

    /// Overrides the total amount.
    pub fn with_total_amount(mut self, total_amount: Money) -> Self {
        self.total_amount = total_amount;
        self
    }
}

/// An order as stored under `orders/<id>`.
///
/// `id`, `timestamp` and `created_at` are fixed at creation. `status` only
/// moves forward through [`Order::transition_to`], which also refreshes
/// `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: DocumentKey,
    user_id: UserId,
    items: Vec<OrderItem>,
    total_amount: Money,

    /// Missing in stored records means the order was never moved on.
    #[serde(default)]
    status: OrderStatus,

    /// Creation instant, epoch milliseconds.
    timestamp: i64,
    created_at: String,
    updated_at: String,
}

impl Order {
    /// Validates `input` and builds a `PENDING` order stamped with the current time.
    pub fn place(id: DocumentKey, input: NewOrder) -> Result<Self, OrderError> {
        input.validate()?;

        let now = now_timestamp();
        Ok(Self {
            id,
            user_id: input.user_id,
            items: input.items,
            total_amount: input.total_amount,
            status: OrderStatus::Pending,
            timestamp: epoch_millis(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Moves the order to `target` and refreshes `updated_at`.
    ///
    /// The order is left untouched when the step is not legal.
    pub fn transition_to(&mut self, target: OrderStatus) -> Result<(), OrderError> {
        if !can_transition(self.status, target) {
            return Err(OrderError::IllegalTransition {
                from: self.status,
                to: target,
            });
        }

        self.status = target;
        self.updated_at = refreshed_timestamp(&self.updated_at);
        Ok(())
    }

    /// Replaces the id with the key the record is stored under.
    pub fn with_id(mut self, id: DocumentKey) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &DocumentKey {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn updated_at(&self) -> &str {
        &self.updated_at
    }

    /// Returns the number of order lines.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Sum of the line totals, which may differ from the charged `total_amount`.
    pub fn items_total(&self) -> Money {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Returns true if the order is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
