//! Declarative MCP server configuration and its wire document.

use super::{
    McpTransport, PlaceholderContext, RemoteTransportConfig, ServerName, StderrMode,
    StdioTransportConfig, ToolRegistryDomainError, TransportKind,
};
use crate::oauth::domain::OAuthConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// How server-provided instructions are surfaced to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ServerInstructions {
    /// Instructions are not included.
    #[default]
    Disabled,
    /// The instructions announced in the server's `initialize` reply are used.
    FromServer,
    /// Operator-supplied text replaces anything the server announces.
    Custom(String),
}

/// Wire form of `serverInstructions`: a flag or custom text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerInstructionsValue {
    /// `true` uses server-provided instructions, `false` disables them.
    Flag(bool),
    /// Custom instructions.
    Text(String),
}

impl From<ServerInstructionsValue> for ServerInstructions {
    fn from(value: ServerInstructionsValue) -> Self {
        match value {
            ServerInstructionsValue::Flag(true) => Self::FromServer,
            ServerInstructionsValue::Flag(false) => Self::Disabled,
            ServerInstructionsValue::Text(text) if text.trim().is_empty() => Self::Disabled,
            ServerInstructionsValue::Text(text) => Self::Custom(text),
        }
    }
}

/// A user-supplied variable a server configuration may reference as
/// `{{NAME}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomUserVar {
    /// Label shown when asking the user for a value.
    pub title: String,
    /// Longer help text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Serialized server definition as it appears in the YAML file and in the
/// user-server store.
///
/// Every field is optional; [`ServerConfig::from_document`] applies defaults,
/// infers a missing `type` and validates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfigDocument {
    /// Transport type.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub transport_type: Option<String>,
    /// STDIO executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// STDIO arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// STDIO environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// STDIO stderr handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<StderrMode>,
    /// Remote endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Remote request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// OAuth client settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,
    /// Request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Connect and handshake timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_timeout: Option<u64>,
    /// Whether the server is listed in the chat menu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_menu: Option<bool>,
    /// Instruction handling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_instructions: Option<ServerInstructionsValue>,
    /// Declared custom user variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_user_vars: BTreeMap<String, CustomUserVar>,
    /// Icon shown next to the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_path: Option<String>,
    /// Whether the server participates in merging and the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Validated description of one MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    name: ServerName,
    transport: McpTransport,
    oauth: Option<OAuthConfig>,
    timeout: Option<Duration>,
    init_timeout: Option<Duration>,
    chat_menu: bool,
    server_instructions: ServerInstructions,
    custom_user_vars: BTreeMap<String, CustomUserVar>,
    icon_path: Option<String>,
    enabled: bool,
}

impl ServerConfig {
    /// Creates an enabled configuration with defaults for optional fields.
    #[must_use]
    pub const fn new(name: ServerName, transport: McpTransport) -> Self {
        Self {
            name,
            transport,
            oauth: None,
            timeout: None,
            init_timeout: None,
            chat_menu: true,
            server_instructions: ServerInstructions::Disabled,
            custom_user_vars: BTreeMap::new(),
            icon_path: None,
            enabled: true,
        }
    }

    /// Builds and validates a configuration from its wire document.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when the document cannot describe
    /// a valid server.
    pub fn from_document(
        name: ServerName,
        document: ServerConfigDocument,
    ) -> Result<Self, ToolRegistryDomainError> {
        let kind = match document.transport_type.as_deref() {
            Some(raw) => TransportKind::try_from(raw)?,
            None => infer_transport_kind(&document)?,
        };

        let transport = if kind == TransportKind::Stdio {
            if document.url.is_some() {
                return Err(ToolRegistryDomainError::UrlNotAllowedForStdio);
            }
            let command = document.command.unwrap_or_default();
            McpTransport::Stdio(
                StdioTransportConfig::new(command)?
                    .with_args(document.args)
                    .with_env(document.env)
                    .with_stderr(document.stderr.unwrap_or_default()),
            )
        } else {
            if document.command.is_some() {
                return Err(ToolRegistryDomainError::CommandNotAllowed {
                    transport: kind.as_str(),
                });
            }
            let url = document.url.unwrap_or_default();
            McpTransport::remote(
                kind,
                RemoteTransportConfig::new(url).with_headers(document.headers),
            )?
        };

        let config = Self {
            name,
            transport,
            oauth: document.oauth,
            timeout: document.timeout.map(Duration::from_millis),
            init_timeout: document.init_timeout.map(Duration::from_millis),
            chat_menu: document.chat_menu.unwrap_or(true),
            server_instructions: document
                .server_instructions
                .map(ServerInstructions::from)
                .unwrap_or_default(),
            custom_user_vars: document.custom_user_vars,
            icon_path: document.icon_path,
            enabled: document.enabled.unwrap_or(true),
        };
        config.validate()?;
        Ok(config)
    }

    /// Converts back to the wire document, always writing `type`.
    #[must_use]
    pub fn to_document(&self) -> ServerConfigDocument {
        let mut document = ServerConfigDocument {
            transport_type: Some(self.transport.kind().as_str().to_owned()),
            oauth: self.oauth.clone(),
            timeout: self.timeout.map(duration_millis),
            init_timeout: self.init_timeout.map(duration_millis),
            chat_menu: Some(self.chat_menu),
            server_instructions: instructions_value(&self.server_instructions),
            custom_user_vars: self.custom_user_vars.clone(),
            icon_path: self.icon_path.clone(),
            enabled: Some(self.enabled),
            ..ServerConfigDocument::default()
        };
        match &self.transport {
            McpTransport::Stdio(stdio) => {
                document.command = Some(stdio.command().to_owned());
                document.args = stdio.args().to_vec();
                document.env = stdio.env().clone();
                document.stderr = Some(stdio.stderr());
            }
            McpTransport::WebSocket(remote)
            | McpTransport::Sse(remote)
            | McpTransport::StreamableHttp(remote) => {
                document.url = Some(remote.url().to_owned());
                document.headers = remote.headers().clone();
            }
        }
        document
    }

    /// Checks every configuration invariant without side effects.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ToolRegistryDomainError> {
        self.transport.validate()?;
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ToolRegistryDomainError::ZeroTimeout { field: "timeout" });
        }
        if self.init_timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ToolRegistryDomainError::ZeroTimeout {
                field: "initTimeout",
            });
        }
        if let Some(oauth) = &self.oauth {
            oauth.validate()?;
        }
        Ok(())
    }

    /// Returns a copy with placeholders in the transport substituted.
    #[must_use]
    pub fn resolve_placeholders(&self, context: &PlaceholderContext) -> Self {
        Self {
            transport: self.transport.map_values(|value| context.resolve(value)),
            ..self.clone()
        }
    }

    /// Sets OAuth settings.
    #[must_use]
    pub fn with_oauth(mut self, oauth: OAuthConfig) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect and handshake timeout.
    #[must_use]
    pub const fn with_init_timeout(mut self, init_timeout: Duration) -> Self {
        self.init_timeout = Some(init_timeout);
        self
    }

    /// Sets the instruction handling.
    #[must_use]
    pub fn with_server_instructions(mut self, server_instructions: ServerInstructions) -> Self {
        self.server_instructions = server_instructions;
        self
    }

    /// Declares a custom user variable.
    #[must_use]
    pub fn with_custom_user_var(
        mut self,
        name: impl Into<String>,
        variable: CustomUserVar,
    ) -> Self {
        self.custom_user_vars.insert(name.into(), variable);
        self
    }

    /// Sets whether the server is enabled.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the server name.
    #[must_use]
    pub const fn name(&self) -> &ServerName {
        &self.name
    }

    /// Returns the transport settings.
    #[must_use]
    pub const fn transport(&self) -> &McpTransport {
        &self.transport
    }

    /// Returns OAuth settings.
    #[must_use]
    pub const fn oauth(&self) -> Option<&OAuthConfig> {
        self.oauth.as_ref()
    }

    /// Returns the configured request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the configured connect and handshake timeout.
    #[must_use]
    pub const fn init_timeout(&self) -> Option<Duration> {
        self.init_timeout
    }

    /// Returns whether the server is listed in the chat menu.
    #[must_use]
    pub const fn chat_menu(&self) -> bool {
        self.chat_menu
    }

    /// Returns instruction handling.
    #[must_use]
    pub const fn server_instructions(&self) -> &ServerInstructions {
        &self.server_instructions
    }

    /// Returns declared custom user variables.
    #[must_use]
    pub const fn custom_user_vars(&self) -> &BTreeMap<String, CustomUserVar> {
        &self.custom_user_vars
    }

    /// Returns the icon path.
    #[must_use]
    pub fn icon_path(&self) -> Option<&str> {
        self.icon_path.as_deref()
    }

    /// Returns whether the server is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }
}

fn infer_transport_kind(
    document: &ServerConfigDocument,
) -> Result<TransportKind, ToolRegistryDomainError> {
    if document.command.is_some() {
        return Ok(TransportKind::Stdio);
    }
    let Some(url) = document.url.as_deref() else {
        return Err(ToolRegistryDomainError::MissingTransportDetails);
    };
    let lowered = url.trim().to_ascii_lowercase();
    if lowered.starts_with("ws:") || lowered.starts_with("wss:") {
        Ok(TransportKind::WebSocket)
    } else {
        Ok(TransportKind::Sse)
    }
}

fn instructions_value(instructions: &ServerInstructions) -> Option<ServerInstructionsValue> {
    match instructions {
        ServerInstructions::Disabled => None,
        ServerInstructions::FromServer => Some(ServerInstructionsValue::Flag(true)),
        ServerInstructions::Custom(text) => Some(ServerInstructionsValue::Text(text.clone())),
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
