//! Service-level error taxonomy.

use crate::oauth::services::OAuthError;
use crate::tool_registry::{
    domain::{PendingOAuth, ServerKey, ServerName, ToolRegistryDomainError},
    ports::{ToolCacheError, TransportError, UserServerRepositoryError},
};
use std::sync::Arc;
use thiserror::Error;

/// Stable classification a REST layer maps to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input; 400.
    Validation,
    /// Name collision in the owner's scope; 409.
    DuplicateName,
    /// Unknown server, record or tool; 404.
    NotFound,
    /// Transport failure during connect.
    Connect,
    /// Connected but listing tools failed.
    ToolDiscovery,
    /// The server needs user authorization first.
    OAuthRequired,
    /// A disconnect failed.
    Teardown,
    /// The request is valid but the tool refused it.
    ToolCall,
    /// Anything else; 500.
    Internal,
}

/// Result type for tool registry services.
pub type ToolRegistryResult<T> = Result<T, ToolRegistryError>;

/// Errors returned by tool registry services.
#[derive(Debug, Error)]
pub enum ToolRegistryError {
    /// Configuration failed validation.
    #[error(transparent)]
    Validation(#[from] ToolRegistryDomainError),

    /// The owner already has a server with this name.
    #[error("an MCP server named {0} already exists")]
    DuplicateName(ServerName),

    /// No server is known under this key or id.
    #[error("MCP server {0} not found")]
    ServerNotFound(String),

    /// Opening the connection failed.
    #[error("failed to connect to MCP server {server}: {source}")]
    Connect {
        /// Server being connected.
        server: ServerKey,
        /// Transport failure.
        source: TransportError,
    },

    /// Listing tools failed on an open connection.
    #[error("tool discovery failed for MCP server {server}: {source}")]
    ToolDiscovery {
        /// Server being queried.
        server: ServerKey,
        /// Transport failure.
        source: TransportError,
    },

    /// The server requires authorization before it can connect.
    #[error("MCP server {server} requires OAuth authorization")]
    OAuthRequired {
        /// Server being connected.
        server: ServerKey,
        /// Flow the user must complete, when one was started.
        pending: Option<Box<PendingOAuth>>,
    },

    /// Disconnecting failed.
    #[error("failed to disconnect MCP server {server}: {source}")]
    Teardown {
        /// Server being disconnected.
        server: ServerKey,
        /// Transport failure.
        source: TransportError,
    },

    /// A tool call failed.
    #[error("call to tool {tool} failed: {source}")]
    ToolCall {
        /// Qualified tool name.
        tool: String,
        /// Transport failure.
        source: TransportError,
    },

    /// No enabled tool has this qualified name.
    #[error("tool {0} not found")]
    ToolNotFound(String),

    /// The tool exists but is switched off.
    #[error("tool {0} is disabled")]
    ToolDisabled(String),

    /// User-server persistence failed.
    #[error(transparent)]
    Repository(UserServerRepositoryError),

    /// Tool cache failure.
    #[error(transparent)]
    Cache(#[from] ToolCacheError),

    /// OAuth flow handling failed.
    #[error(transparent)]
    Authorization(Box<OAuthError>),

    /// Internal runtime failure such as a poisoned lock.
    #[error("tool registry runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl ToolRegistryError {
    /// Wraps a runtime error.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }

    /// Maps a poisoned lock into a runtime error.
    pub(crate) fn lock(err: &impl ToString) -> Self {
        Self::runtime(std::io::Error::other(err.to_string()))
    }

    /// Returns the stable error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::ServerNotFound(_) | Self::ToolNotFound(_) => ErrorKind::NotFound,
            Self::Connect { .. } => ErrorKind::Connect,
            Self::ToolDiscovery { .. } => ErrorKind::ToolDiscovery,
            Self::OAuthRequired { .. } => ErrorKind::OAuthRequired,
            Self::Teardown { .. } => ErrorKind::Teardown,
            Self::ToolCall { .. } | Self::ToolDisabled(_) => ErrorKind::ToolCall,
            Self::Repository(_) | Self::Cache(_) | Self::Authorization(_) | Self::Runtime(_) => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<UserServerRepositoryError> for ToolRegistryError {
    fn from(err: UserServerRepositoryError) -> Self {
        match err {
            UserServerRepositoryError::DuplicateServerName { name, .. } => {
                Self::DuplicateName(name)
            }
            UserServerRepositoryError::NotFound(id) => Self::ServerNotFound(id.to_string()),
            other => Self::Repository(other),
        }
    }
}

impl From<OAuthError> for ToolRegistryError {
    fn from(err: OAuthError) -> Self {
        Self::Authorization(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_registry::domain::{McpServerId, UserId};
    use rstest::rstest;

    #[rstest]
    fn repository_duplicates_become_duplicate_names() {
        let name = ServerName::new("notes").expect("valid name");
        let err = ToolRegistryError::from(UserServerRepositoryError::DuplicateServerName {
            user_id: UserId::new("alice").expect("valid user"),
            name: name.clone(),
        });

        assert!(matches!(err, ToolRegistryError::DuplicateName(ref found) if *found == name));
        assert_eq!(err.kind(), ErrorKind::DuplicateName);
    }

    #[rstest]
    fn missing_records_are_not_found() {
        let err = ToolRegistryError::from(UserServerRepositoryError::NotFound(McpServerId::new()));

        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[rstest]
    #[case(
        ToolRegistryError::Validation(ToolRegistryDomainError::EmptyServerName),
        ErrorKind::Validation
    )]
    #[case(ToolRegistryError::ToolDisabled(String::from("echo_mcp_echo")), ErrorKind::ToolCall)]
    #[case(ToolRegistryError::ToolNotFound(String::from("echo_mcp_echo")), ErrorKind::NotFound)]
    fn kinds_are_stable(#[case] err: ToolRegistryError, #[case] expected: ErrorKind) {
        assert_eq!(err.kind(), expected);
    }
}
