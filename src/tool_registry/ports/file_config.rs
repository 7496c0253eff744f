//! Port for the operator-owned static configuration file.

use crate::tool_registry::domain::{McpSettings, ServerConfig, ServerName, ToolRegistryDomainError};
use std::collections::BTreeMap;
use thiserror::Error;

/// File-defined servers keyed by name.
pub type FileServerMap = BTreeMap<ServerName, ServerConfig>;

/// Everything read from the static configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Process-wide settings.
    pub settings: McpSettings,
    /// File-defined servers.
    pub servers: FileServerMap,
}

/// Loads the static configuration once at startup.
pub trait FileConfigSource {
    /// Reads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FileConfigError`] when the file cannot be read or parsed, or
    /// when any server definition is invalid.
    fn load(&self) -> Result<FileConfig, FileConfigError>;
}

/// Errors returned while loading the static configuration.
#[derive(Debug, Error)]
pub enum FileConfigError {
    /// The file could not be read.
    #[error("failed to read MCP config '{path}': {source}")]
    Io {
        /// Path as given.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for the expected shape.
    #[error("failed to parse MCP config '{path}': {message}")]
    Parse {
        /// Path as given.
        path: String,
        /// Parser message.
        message: String,
    },

    /// A server key is not a valid server name.
    #[error("invalid MCP server name in config: {source}")]
    InvalidName {
        /// Validation failure.
        #[source]
        source: ToolRegistryDomainError,
    },

    /// A server definition failed validation.
    #[error("invalid MCP server '{name}': {source}")]
    InvalidServer {
        /// Server name.
        name: ServerName,
        /// Validation failure.
        #[source]
        source: ToolRegistryDomainError,
    },
}
