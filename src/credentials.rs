//! Caller identity attached to authenticated requests.

use std::collections::BTreeSet;

use serde::Serialize;

/// Username of the built-in system identity.
pub const SYSTEM_USERNAME: &str = "SYSTEM";

/// User id of the built-in system identity.
pub const SYSTEM_USER_ID: i64 = 0;

/// An immutable identity record produced by an
/// [`Authenticator`](crate::Authenticator).
///
/// Only the role set is serialized; username and id stay out of any payload
/// that happens to embed the credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Credentials {
    #[serde(skip)]
    username: String,
    #[serde(skip)]
    user_id: i64,
    #[serde(rename = "Roles")]
    roles: BTreeSet<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, user_id: i64) -> Self {
        Self { username: username.into(), user_id, roles: BTreeSet::new() }
    }

    /// The well-known identity used when no caller identity is resolved.
    pub fn system() -> Self {
        Self::new(SYSTEM_USERNAME, SYSTEM_USER_ID)
    }

    /// Replaces the role set. Duplicates collapse.
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn username(&self) -> &str { &self.username }
    pub fn user_id(&self) -> i64 { self.user_id }
    pub fn roles(&self) -> &BTreeSet<String> { &self.roles }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True iff both the username and the id match the system identity exactly.
    pub fn is_system_user(&self) -> bool {
        self.username == SYSTEM_USERNAME && self.user_id == SYSTEM_USER_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_identity_is_recognised() {
        let creds = Credentials::system();
        assert_eq!(creds.username(), SYSTEM_USERNAME);
        assert_eq!(creds.user_id(), SYSTEM_USER_ID);
        assert!(creds.is_system_user());
    }

    #[test]
    fn partial_match_is_not_system() {
        assert!(!Credentials::new(SYSTEM_USERNAME, 7).is_system_user());
        assert!(!Credentials::new("alice", SYSTEM_USER_ID).is_system_user());
        assert!(!Credentials::new("system", SYSTEM_USER_ID).is_system_user());
    }

    #[test]
    fn roles_are_a_set() {
        let creds = Credentials::new("alice", 12).with_roles(["admin", "user", "admin"]);
        assert_eq!(creds.roles().len(), 2);
        assert!(creds.has_role("admin"));
        assert!(!creds.has_role("auditor"));
    }

    #[test]
    fn serializes_roles_only() {
        let creds = Credentials::new("alice", 12).with_roles(["user"]);
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json, serde_json::json!({ "Roles": ["user"] }));
    }
}
