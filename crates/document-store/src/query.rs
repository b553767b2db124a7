use serde_json::Value;

use crate::DocumentPath;

/// Builder for equality-filtered queries over the children of a collection.
///
/// Mirrors the `orderByChild(field).equalTo(value)` shape of realtime
/// document databases. Matching children are returned in key order.
#[derive(Debug, Clone)]
pub struct ChildQuery {
    /// Collection whose children are filtered.
    pub collection: DocumentPath,

    /// Top-level field compared against `equal_to`.
    pub order_by_child: Option<String>,

    /// Value the field must equal.
    pub equal_to: Option<Value>,

    /// Maximum number of children to return.
    pub limit_to_first: Option<usize>,
}

impl ChildQuery {
    /// Creates a query returning every child of a collection.
    pub fn new(collection: DocumentPath) -> Self {
        Self {
            collection,
            order_by_child: None,
            equal_to: None,
            limit_to_first: None,
        }
    }

    /// Shorthand for `new(collection).order_by_child(field).equal_to(value)`.
    pub fn equal(
        collection: DocumentPath,
        field: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self::new(collection).order_by_child(field).equal_to(value)
    }

    /// Selects the field the filter applies to.
    pub fn order_by_child(mut self, field: impl Into<String>) -> Self {
        self.order_by_child = Some(field.into());
        self
    }

    /// Keeps only children whose field equals `value`.
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    /// Limits the number of results.
    pub fn limit_to_first(mut self, limit: usize) -> Self {
        self.limit_to_first = Some(limit);
        self
    }

    /// Returns true if `document` passes the equality filter.
    ///
    /// A query without both a field and a value matches every child.
    pub fn matches(&self, document: &Value) -> bool {
        match (&self.order_by_child, &self.equal_to) {
            (Some(field), Some(expected)) => document.get(field) == Some(expected),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn builder_sets_all_fields() {
        let query = ChildQuery::new(DocumentPath::collection("users"))
            .order_by_child("email")
            .equal_to("a@example.com")
            .limit_to_first(1);

        assert_eq!(query.collection.to_string(), "users");
        assert_eq!(query.order_by_child.as_deref(), Some("email"));
        assert_eq!(query.equal_to, Some(json!("a@example.com")));
        assert_eq!(query.limit_to_first, Some(1));
    }

    #[test]
    fn matches_on_field_equality() {
        let query = ChildQuery::equal(DocumentPath::collection("orders"), "userId", "u1");

        assert!(query.matches(&json!({"userId": "u1", "status": "PENDING"})));
        assert!(!query.matches(&json!({"userId": "u2"})));
        assert!(!query.matches(&json!({"status": "PENDING"})));
    }

    #[test]
    fn unfiltered_query_matches_everything() {
        let query = ChildQuery::new(DocumentPath::collection("products"));
        assert!(query.matches(&json!({})));
        assert!(query.matches(&json!(42)));
    }
}
