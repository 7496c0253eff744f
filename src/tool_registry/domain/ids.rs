//! Identifier and validated-name types for MCP servers.

use super::ToolRegistryDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum length for an MCP server name, matching `VARCHAR(100)`.
const MAX_SERVER_NAME_LENGTH: usize = 100;

/// Unique identifier for a database-backed user server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct McpServerId(Uuid);

impl McpServerId {
    /// Creates a new random MCP server identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an MCP server identifier from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for McpServerId {
    fn default() -> Self {
        Self::new()
    }
}

impl AsRef<Uuid> for McpServerId {
    fn as_ref(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for McpServerId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated MCP server name.
///
/// Names are trimmed but keep their case, so `GitHub` and `github` are
/// distinct servers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerName(String);

impl ServerName {
    /// Creates a validated MCP server name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the name is empty, too long,
    /// or contains characters outside `[A-Za-z0-9_.-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();

        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyServerName);
        }

        let is_valid = normalized.chars().all(|character| {
            character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.')
        });
        if !is_valid {
            return Err(ToolRegistryDomainError::InvalidServerName(normalized));
        }

        if normalized.len() > MAX_SERVER_NAME_LENGTH {
            return Err(ToolRegistryDomainError::ServerNameTooLong(normalized));
        }

        Ok(Self(normalized))
    }

    /// Returns the server name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ServerName {
    type Error = ToolRegistryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ServerName> for String {
    fn from(value: ServerName) -> Self {
        value.0
    }
}

impl AsRef<str> for ServerName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifier of the user owning a database-backed server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyUserId`] for blank input.
    pub fn new(value: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized = value.into().trim().to_owned();
        if normalized.is_empty() {
            return Err(ToolRegistryDomainError::EmptyUserId);
        }
        Ok(Self(normalized))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserId {
    type Error = ToolRegistryDomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Visibility scope of a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "user_id")]
pub enum ServerScope {
    /// File-defined server shared by every user.
    Global,
    /// Database-defined server private to one user.
    User(UserId),
}

impl ServerScope {
    /// Returns the owning user for user-scoped servers.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::Global => None,
            Self::User(user_id) => Some(user_id),
        }
    }
}

/// Registry key: a server name qualified by its scope.
///
/// Two users may each own a server called `notes` without colliding, and
/// neither collides with a global `notes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerKey {
    scope: ServerScope,
    name: ServerName,
}

impl ServerKey {
    /// Key of a file-defined server.
    #[must_use]
    pub const fn global(name: ServerName) -> Self {
        Self {
            scope: ServerScope::Global,
            name,
        }
    }

    /// Key of a user-defined server.
    #[must_use]
    pub const fn user(user_id: UserId, name: ServerName) -> Self {
        Self {
            scope: ServerScope::User(user_id),
            name,
        }
    }

    /// Returns the scope.
    #[must_use]
    pub const fn scope(&self) -> &ServerScope {
        &self.scope
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the owning user for user-scoped keys.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        self.scope.user_id()
    }

    /// Returns whether the key belongs to a file-defined server.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self.scope, ServerScope::Global)
    }
}

impl fmt::Display for ServerKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            ServerScope::Global => write!(formatter, "{}", self.name),
            ServerScope::User(user_id) => write!(formatter, "{}@{user_id}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("GitHub", "GitHub")]
    #[case("  file-system.v2 ", "file-system.v2")]
    #[case("weather_api", "weather_api")]
    fn server_name_accepts_and_preserves_case(#[case] input: &str, #[case] expected: &str) {
        let name = ServerName::new(input).expect("name should be valid");
        assert_eq!(name.as_str(), expected);
    }

    #[rstest]
    #[case("", ToolRegistryDomainError::EmptyServerName)]
    #[case("has space", ToolRegistryDomainError::InvalidServerName(String::from("has space")))]
    #[case("slash/name", ToolRegistryDomainError::InvalidServerName(String::from("slash/name")))]
    fn server_name_rejects_invalid_input(
        #[case] input: &str,
        #[case] expected: ToolRegistryDomainError,
    ) {
        assert_eq!(ServerName::new(input), Err(expected));
    }

    #[test]
    fn server_name_rejects_overlong_input() {
        let result = ServerName::new("a".repeat(101));
        assert!(matches!(
            result,
            Err(ToolRegistryDomainError::ServerNameTooLong(_))
        ));
    }

    #[test]
    fn keys_for_same_name_differ_by_scope() {
        let name = ServerName::new("notes").expect("valid name");
        let alice = UserId::new("alice").expect("valid user");
        let bob = UserId::new("bob").expect("valid user");

        let global = ServerKey::global(name.clone());
        let alice_key = ServerKey::user(alice, name.clone());
        let bob_key = ServerKey::user(bob, name);

        assert_ne!(global, alice_key);
        assert_ne!(alice_key, bob_key);
        assert_eq!(global.to_string(), "notes");
        assert_eq!(alice_key.to_string(), "notes@alice");
    }

    #[test]
    fn server_name_deserialization_validates() {
        let result: Result<ServerName, _> = serde_json::from_str("\"bad name\"");
        assert!(result.is_err());
    }
}
