//! Repository port for user-defined MCP servers.

use crate::tool_registry::domain::{
    McpServerId, ServerName, ServerStatus, ToolDescriptor, TransportKind, UserId,
    UserServerRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Result type for user-server repository operations.
pub type UserServerRepositoryResult<T> = Result<T, UserServerRepositoryError>;

/// Query filter for [`UserServerRepository::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserServerFilter {
    /// Restrict to one owner.
    pub user_id: Option<UserId>,
    /// Restrict by enabled flag.
    pub enabled: Option<bool>,
    /// Restrict by transport kind.
    pub transport: Option<TransportKind>,
    /// Restrict by last recorded status.
    pub status: Option<ServerStatus>,
}

impl UserServerFilter {
    /// Matches every record.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Matches every enabled record of every user.
    #[must_use]
    pub fn enabled() -> Self {
        Self {
            enabled: Some(true),
            ..Self::default()
        }
    }

    /// Matches the records of one user.
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    /// Returns whether `record` passes the filter.
    #[must_use]
    pub fn matches(&self, record: &UserServerRecord) -> bool {
        self.user_id
            .as_ref()
            .is_none_or(|user_id| record.user_id() == user_id)
            && self
                .enabled
                .is_none_or(|enabled| record.is_enabled() == enabled)
            && self
                .transport
                .is_none_or(|kind| record.config().transport().kind() == kind)
            && self.status.is_none_or(|status| record.status() == status)
    }
}

/// Persistence contract for user-defined servers.
#[async_trait]
pub trait UserServerRepository: Send + Sync {
    /// Lists records matching `filter`, ordered by owner then name.
    async fn list(
        &self,
        filter: &UserServerFilter,
    ) -> UserServerRepositoryResult<Vec<UserServerRecord>>;

    /// Finds a record owned by `user_id`.
    async fn get(
        &self,
        id: McpServerId,
        user_id: &UserId,
    ) -> UserServerRepositoryResult<Option<UserServerRecord>>;

    /// Stores a new record.
    ///
    /// # Errors
    ///
    /// Returns [`UserServerRepositoryError::DuplicateServerName`] when the
    /// owner already has a server with that name.
    async fn create(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()>;

    /// Persists changes to an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`UserServerRepositoryError::NotFound`] for unknown records and
    /// [`UserServerRepositoryError::DuplicateServerName`] when a rename
    /// collides.
    async fn update(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()>;

    /// Deletes a record owned by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`UserServerRepositoryError::NotFound`] for unknown records.
    async fn delete(&self, id: McpServerId, user_id: &UserId) -> UserServerRepositoryResult<()>;

    /// Replaces the stored tool descriptors.
    async fn set_tools(
        &self,
        id: McpServerId,
        tools: &[ToolDescriptor],
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()>;

    /// Records the latest status and error message.
    async fn set_status(
        &self,
        id: McpServerId,
        status: ServerStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()>;

    /// Sets the enabled flag and returns the updated record.
    async fn toggle_enabled(
        &self,
        id: McpServerId,
        user_id: &UserId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<UserServerRecord>;
}

/// Errors returned by user-server repository implementations.
#[derive(Debug, Clone, Error)]
pub enum UserServerRepositoryError {
    /// The owner already has a server with this name.
    #[error("user {user_id} already has an MCP server named {name}")]
    DuplicateServerName {
        /// Owner.
        user_id: UserId,
        /// Colliding name.
        name: ServerName,
    },

    /// The record was not found for this owner.
    #[error("MCP server not found: {0}")]
    NotFound(McpServerId),

    /// Persisted data could not be reconstructed into domain types.
    #[error("invalid persisted MCP server data: {0}")]
    InvalidPersistedData(Arc<dyn std::error::Error + Send + Sync>),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl UserServerRepositoryError {
    /// Wraps persisted-data decoding or validation failures.
    pub fn invalid_persisted_data(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::InvalidPersistedData(Arc::new(err))
    }

    /// Wraps a persistence-layer failure.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
