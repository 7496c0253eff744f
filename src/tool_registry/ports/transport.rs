//! Transport port: one uniform contract over every MCP transport.

use crate::tool_registry::domain::{ServerConfig, ServerKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything a connector needs to open one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Registry key, used for logging.
    pub key: ServerKey,
    /// Configuration with placeholders already resolved.
    pub config: ServerConfig,
    /// Bearer credential for OAuth-protected servers.
    pub access_token: Option<String>,
    /// Bound on every request round-trip.
    pub request_timeout: Duration,
    /// Bound on opening the channel plus the `initialize` handshake.
    pub init_timeout: Duration,
    /// Grace period for a STDIO child to exit before it is killed.
    pub shutdown_grace: Duration,
    /// Upper bound on `tools/list` pages.
    pub max_tool_pages: usize,
}

/// A tool as announced by `tools/list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTool {
    /// Server-local tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input JSON schema.
    #[serde(default)]
    pub input_schema: Value,
}

/// Result of `tools/call`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content blocks.
    #[serde(default)]
    pub content: Vec<Value>,
    /// Structured output, when the tool declares an output schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Whether the tool reported a failure.
    #[serde(default)]
    pub is_error: bool,
}

/// Opens connections to MCP servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Opens a channel and completes the `initialize` handshake.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Timeout`] when `init_timeout` elapses,
    /// [`TransportError::OAuthRequired`] when the server demands
    /// authorization and [`TransportError::Handshake`] for other failures.
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<Arc<dyn McpConnection>>;
}

/// A live, initialized connection.
#[async_trait]
pub trait McpConnection: Send + Sync + fmt::Debug {
    /// Returns whether the channel is still usable.
    fn is_connected(&self) -> bool;

    /// Returns instructions announced during the handshake.
    fn server_instructions(&self) -> Option<String>;

    /// Lists every tool, following pagination.
    async fn list_tools(&self) -> TransportResult<Vec<RemoteTool>>;

    /// Invokes a tool.
    async fn call_tool(&self, name: &str, arguments: Value) -> TransportResult<ToolCallResult>;

    /// Closes the channel and releases its resources.
    ///
    /// Calling this more than once is harmless.
    async fn disconnect(&self) -> TransportResult<()>;
}

/// Errors returned by connectors and connections.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Opening the channel or the `initialize` exchange failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// An operation exceeded its time bound.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A request on an established connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The peer sent something that is not valid MCP.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer answered with a JSON-RPC error.
    #[error("server returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// The server requires OAuth authorization.
    #[error("server requires OAuth authorization")]
    OAuthRequired,

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// The STDIO child could not be started.
    #[error("failed to spawn '{command}': {reason}")]
    Spawn {
        /// Command that failed.
        command: String,
        /// OS error text.
        reason: String,
    },

    /// Generic runtime failure.
    #[error("transport runtime error: {0}")]
    Runtime(Arc<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Wraps a runtime error.
    pub fn runtime(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Runtime(Arc::new(err))
    }
}
