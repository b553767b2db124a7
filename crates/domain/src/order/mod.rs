//! Order entity, status state machine and related types.

mod entity;
pub mod lifecycle;
mod status;
mod value_objects;

pub use entity::{NewOrder, Order};
pub use lifecycle::apply_transition;
pub use status::{OrderStatus, can_transition};
pub use value_objects::{Money, OrderItem, ProductId, UserId};

use thiserror::Error;

/// Errors raised by order validation and status changes.
///
/// All of these are detected before anything is written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// User ID is required.
    #[error("User ID is required")]
    UserIdRequired,

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Invalid total amount.
    #[error("Invalid total amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: Money },

    /// Status text matches none of the known statuses.
    #[error("Invalid status: {input:?}")]
    InvalidStatus { input: String },

    /// The status change is not a legal lifecycle step.
    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
}
