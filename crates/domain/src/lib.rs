//! Domain layer for the order backend.
//!
//! This crate provides:
//! - The order entity and its status state machine
//! - Sequential, human-readable id generation over store counters
//! - Product and user records
//! - A repository persisting all of the above in a document store

pub mod catalog;
pub mod error;
pub mod id_generator;
pub mod order;
pub mod repository;

pub use catalog::{NewProduct, NewUser, Product, Role, User};
pub use error::DomainError;
pub use id_generator::{IdCounter, IdGenerator, IdType, UnknownIdType, format_id};
pub use order::{
    Money, NewOrder, Order, OrderError, OrderItem, OrderStatus, ProductId, UserId,
    apply_transition, can_transition,
};
pub use repository::{KeyStrategy, Repository};
