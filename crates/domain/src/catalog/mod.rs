//! Catalog records: products and users.
//!
//! Plain records with a store-assigned id and no state machine.

mod product;
mod user;

pub use product::{NewProduct, Product};
pub use user::{NewUser, Role, User};
