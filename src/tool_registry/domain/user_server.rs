//! Database-backed MCP server owned by one user.

use super::{McpServerId, ServerConfig, ServerKey, ServerStatus, ToolDescriptor, UserId};
use chrono::{DateTime, Utc};
use mockable::Clock;

/// User-server aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserServerRecord {
    id: McpServerId,
    user_id: UserId,
    config: ServerConfig,
    status: ServerStatus,
    error_message: Option<String>,
    tools: Vec<ToolDescriptor>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing persisted server state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedUserServerData {
    /// Persisted record identifier.
    pub id: McpServerId,
    /// Persisted owner.
    pub user_id: UserId,
    /// Persisted configuration.
    pub config: ServerConfig,
    /// Persisted status.
    pub status: ServerStatus,
    /// Persisted error message.
    pub error_message: Option<String>,
    /// Persisted tool descriptors.
    pub tools: Vec<ToolDescriptor>,
    /// Persisted creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Persisted update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl UserServerRecord {
    /// Creates a new record in `unknown` status.
    #[must_use]
    pub fn new(user_id: UserId, config: ServerConfig, clock: &impl Clock) -> Self {
        let timestamp = clock.utc();
        Self {
            id: McpServerId::new(),
            user_id,
            config,
            status: ServerStatus::Unknown,
            error_message: None,
            tools: Vec::new(),
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a record from persistence.
    #[must_use]
    pub fn from_persisted(data: PersistedUserServerData) -> Self {
        Self {
            id: data.id,
            user_id: data.user_id,
            config: data.config,
            status: data.status,
            error_message: data.error_message,
            tools: data.tools,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the record identifier.
    #[must_use]
    pub const fn id(&self) -> McpServerId {
        self.id
    }

    /// Returns the owning user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the registry key of this server.
    #[must_use]
    pub fn key(&self) -> ServerKey {
        ServerKey::user(self.user_id.clone(), self.config.name().clone())
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns whether the server is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Returns the last recorded status.
    #[must_use]
    pub const fn status(&self) -> ServerStatus {
        self.status
    }

    /// Returns the last recorded error.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns the last discovered tools with their overrides.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Replaces the configuration.
    pub fn replace_config(&mut self, config: ServerConfig, at: DateTime<Utc>) {
        self.config = config;
        self.updated_at = at;
    }

    /// Enables or disables the server.
    pub fn set_enabled(&mut self, enabled: bool, at: DateTime<Utc>) {
        self.config = self.config.clone().with_enabled(enabled);
        self.updated_at = at;
    }

    /// Records the latest status.
    pub fn record_status(
        &mut self,
        status: ServerStatus,
        error_message: Option<String>,
        at: DateTime<Utc>,
    ) {
        self.status = status;
        self.error_message = error_message;
        self.updated_at = at;
    }

    /// Replaces the discovered tools.
    pub fn replace_tools(&mut self, tools: Vec<ToolDescriptor>, at: DateTime<Utc>) {
        self.tools = tools;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::{McpTransport, ServerName};
    use mockable::DefaultClock;

    fn build_record(clock: &DefaultClock) -> UserServerRecord {
        let name = ServerName::new("notes").expect("valid server name");
        let transport = McpTransport::stdio("notes-mcp").expect("valid transport");
        let user = UserId::new("alice").expect("valid user");
        UserServerRecord::new(user, ServerConfig::new(name, transport), clock)
    }

    #[test]
    fn new_record_is_enabled_and_unknown() {
        let record = build_record(&DefaultClock);

        assert!(record.is_enabled());
        assert_eq!(record.status(), ServerStatus::Unknown);
        assert_eq!(record.key().to_string(), "notes@alice");
    }

    #[test]
    fn disabling_updates_config() {
        let clock = DefaultClock;
        let mut record = build_record(&clock);

        record.set_enabled(false, clock.utc());

        assert!(!record.is_enabled());
        assert!(!record.config().is_enabled());
    }
}
