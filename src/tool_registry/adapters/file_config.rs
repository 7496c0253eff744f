//! YAML loader for the operator-owned MCP configuration file.
//!
//! The file has two top-level keys, both optional:
//!
//! ```yaml
//! mcpSettings:
//!   toolDelimiter: _mcp_
//!   startupConcurrency: 4
//! mcpServers:
//!   echo:
//!     command: node
//!     args: [echo.js]
//! ```

use crate::tool_registry::{
    domain::{McpSettings, ServerConfig, ServerConfigDocument, ServerName},
    ports::{FileConfig, FileConfigError, FileConfigSource, FileServerMap},
};
use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDocument {
    #[serde(default)]
    mcp_settings: McpSettings,
    #[serde(default)]
    mcp_servers: BTreeMap<String, ServerConfigDocument>,
}

/// Reads [`FileConfig`] from a YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YamlFileConfigSource {
    path: Utf8PathBuf,
}

impl YamlFileConfigSource {
    /// Creates a source for the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the configured path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read(&self) -> Result<String, FileConfigError> {
        let io_error = |source| FileConfigError::Io {
            path: self.path.to_string(),
            source,
        };
        let file_name = self.path.file_name().ok_or_else(|| {
            io_error(std::io::Error::other("path must include a file name"))
        })?;
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(io_error)?;
        dir.read_to_string(file_name).map_err(io_error)
    }
}

/// Parses a configuration document and validates every server.
///
/// # Errors
///
/// Returns [`FileConfigError::Parse`] for malformed YAML and
/// [`FileConfigError::InvalidName`] or [`FileConfigError::InvalidServer`] for
/// invalid server entries.
pub fn parse_file_config(path: &str, contents: &str) -> Result<FileConfig, FileConfigError> {
    let document: FileDocument = if contents.trim().is_empty() {
        FileDocument::default()
    } else {
        serde_yaml::from_str(contents).map_err(|err| FileConfigError::Parse {
            path: path.to_owned(),
            message: err.to_string(),
        })?
    };

    let mut servers = FileServerMap::new();
    for (raw_name, server_document) in document.mcp_servers {
        let name =
            ServerName::new(raw_name).map_err(|source| FileConfigError::InvalidName { source })?;
        let config = ServerConfig::from_document(name.clone(), server_document)
            .map_err(|source| FileConfigError::InvalidServer {
                name: name.clone(),
                source,
            })?;
        servers.insert(name, config);
    }

    Ok(FileConfig {
        settings: document.mcp_settings,
        servers,
    })
}

impl FileConfigSource for YamlFileConfigSource {
    fn load(&self) -> Result<FileConfig, FileConfigError> {
        let contents = self.read()?;
        let config = parse_file_config(self.path.as_str(), &contents)?;
        info!(
            path = %self.path,
            servers = config.servers.len(),
            "loaded MCP configuration"
        );
        Ok(config)
    }
}
