//! Error types for MCP server domain validation and parsing.

use crate::oauth::domain::OAuthDomainError;
use thiserror::Error;

/// Errors returned while constructing tool registry domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolRegistryDomainError {
    /// The server name is empty after trimming.
    #[error("MCP server name must not be empty")]
    EmptyServerName,

    /// The server name contains characters outside `[A-Za-z0-9_.-]`.
    #[error("MCP server name '{0}' may only contain alphanumerics, '_', '-' and '.'")]
    InvalidServerName(String),

    /// The server name exceeds the 100-character storage limit.
    #[error("MCP server name exceeds 100 character limit: {0}")]
    ServerNameTooLong(String),

    /// The owning user identifier is empty after trimming.
    #[error("user id must not be empty")]
    EmptyUserId,

    /// The STDIO command is empty.
    #[error("STDIO command must not be empty")]
    EmptyStdioCommand,

    /// A remote transport was configured without a URL.
    #[error("{transport} transport requires a url")]
    MissingUrl {
        /// Canonical transport name.
        transport: &'static str,
    },

    /// The URL cannot be parsed.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The URL scheme does not match the transport type.
    #[error("{transport} transport does not accept '{scheme}:' urls")]
    UrlProtocolMismatch {
        /// Canonical transport name.
        transport: &'static str,
        /// Offending scheme.
        scheme: String,
    },

    /// A remote transport also carries a `command`.
    #[error("{transport} transport must not define a command")]
    CommandNotAllowed {
        /// Canonical transport name.
        transport: &'static str,
    },

    /// A STDIO transport also carries a `url`.
    #[error("stdio transport must not define a url")]
    UrlNotAllowedForStdio,

    /// The `type` field is not a known transport.
    #[error("unknown MCP transport type: {0}")]
    UnknownTransportType(String),

    /// Neither `type`, `command` nor `url` was provided.
    #[error("server config needs a type, a command or a url")]
    MissingTransportDetails,

    /// A timeout was configured as zero milliseconds.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Field name as written in configuration.
        field: &'static str,
    },

    /// OAuth settings are invalid.
    #[error(transparent)]
    OAuth(#[from] OAuthDomainError),

    /// A tool name is empty after trimming.
    #[error("tool name must not be empty")]
    EmptyToolName,

    /// Transitioning between two runtime statuses is invalid.
    #[error("invalid MCP server status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },
}

/// Error returned while parsing a runtime status from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown MCP server status: {0}")]
pub struct ParseServerStatusError(pub String);
