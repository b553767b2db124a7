mod types;

pub use types::{DocumentKey, DocumentPath};
