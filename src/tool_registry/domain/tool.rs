//! Tool descriptors and their catalog form.

use super::{ServerKey, ServerName, ToolRegistryDomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Separator between tool and server in qualified tool names.
pub const DEFAULT_TOOL_DELIMITER: &str = "_mcp_";

/// Builds the catalog key `<tool><delimiter><server>`.
#[must_use]
pub fn qualified_tool_name(tool: &str, delimiter: &str, server: &ServerName) -> String {
    format!("{tool}{delimiter}{server}")
}

/// A tool exposed by an MCP server together with its per-user override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    enabled: bool,
    schema: Value,
    last_updated: DateTime<Utc>,
}

impl ToolDescriptor {
    /// Creates an enabled tool descriptor.
    ///
    /// A `null` schema is replaced by an empty object schema.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyToolName`] for blank names.
    pub fn new(
        name: impl Into<String>,
        schema: Value,
        last_updated: DateTime<Utc>,
    ) -> Result<Self, ToolRegistryDomainError> {
        let normalized_name = name.into().trim().to_owned();
        if normalized_name.is_empty() {
            return Err(ToolRegistryDomainError::EmptyToolName);
        }

        Ok(Self {
            name: normalized_name,
            description: None,
            enabled: true,
            schema: if schema.is_null() {
                json!({ "type": "object" })
            } else {
                schema
            },
            last_updated,
        })
    }

    /// Sets the description; blank descriptions are dropped.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description.filter(|text| !text.trim().is_empty());
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Updates the enabled flag in place.
    pub const fn set_enabled(&mut self, enabled: bool, at: DateTime<Utc>) {
        self.enabled = enabled;
        self.last_updated = at;
    }

    /// Returns the server-local tool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns whether the tool may be offered to a model.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the input JSON schema.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Returns when the descriptor last changed.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }
}

/// One catalog entry: a tool plus the server that provides it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogTool {
    qualified_name: String,
    server: ServerKey,
    tool: ToolDescriptor,
}

impl CatalogTool {
    /// Creates a catalog entry for `tool` on `server`.
    #[must_use]
    pub fn new(server: ServerKey, tool: ToolDescriptor, delimiter: &str) -> Self {
        Self {
            qualified_name: qualified_tool_name(tool.name(), delimiter, server.name()),
            server,
            tool,
        }
    }

    /// Returns the catalog key.
    #[must_use]
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    /// Returns the providing server.
    #[must_use]
    pub const fn server(&self) -> &ServerKey {
        &self.server
    }

    /// Returns the tool descriptor.
    #[must_use]
    pub const fn tool(&self) -> &ToolDescriptor {
        &self.tool
    }
}
