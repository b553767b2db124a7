use common::DocumentKey;
use serde::{Deserialize, Serialize};

/// Access level of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    #[default]
    Customer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "CUSTOMER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// User fields supplied at registration.
///
/// `password_hash` is produced by the routing layer and stored as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
}

impl NewUser {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password_hash: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            role: Role::default(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// A user as stored under `users/<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: DocumentKey,
    pub username: String,
    pub email: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    /// Records written without a role are customers.
    #[serde(default)]
    pub role: Role,
}

impl User {
    pub fn from_new(id: DocumentKey, input: NewUser) -> Self {
        Self {
            id,
            username: input.username,
            email: input.email,
            password_hash: input.password_hash,
            role: input.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_new_users_are_customers() {
        let user = User::from_new(
            DocumentKey::new("u1"),
            NewUser::new("ada", "ada@example.com", "$argon2id$..."),
        );
        assert_eq!(user.role, Role::Customer);
        assert!(!user.role.is_admin());
    }

    #[test]
    fn test_stored_shape() {
        let user = User::from_new(
            DocumentKey::new("u1"),
            NewUser::new("ada", "ada@example.com", "hash").with_role(Role::Admin),
        );

        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(
            json,
            json!({
                "id": "u1",
                "username": "ada",
                "email": "ada@example.com",
                "password": "hash",
                "role": "ADMIN"
            })
        );
    }

    #[test]
    fn test_missing_role_defaults_to_customer() {
        let user: User = serde_json::from_value(json!({
            "id": "u2",
            "username": "bob",
            "email": "bob@example.com",
            "password": "hash"
        }))
        .unwrap();
        assert_eq!(user.role, Role::Customer);
    }
}
