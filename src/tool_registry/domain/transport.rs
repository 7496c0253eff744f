//! MCP server transport configuration value objects.

use super::{ToolRegistryDomainError, contains_placeholder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// The four supported transport kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TransportKind {
    /// Child process speaking over stdin/stdout.
    #[serde(rename = "stdio")]
    Stdio,
    /// WebSocket connection.
    #[serde(rename = "websocket")]
    WebSocket,
    /// Legacy HTTP+SSE transport.
    #[serde(rename = "sse")]
    Sse,
    /// Streamable HTTP transport.
    #[serde(rename = "streamable-http", alias = "http")]
    StreamableHttp,
}

impl TransportKind {
    /// Returns the canonical configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::WebSocket => "websocket",
            Self::Sse => "sse",
            Self::StreamableHttp => "streamable-http",
        }
    }

    const fn allowed_schemes(self) -> &'static [&'static str] {
        match self {
            Self::Stdio => &[],
            Self::WebSocket => &["ws", "wss"],
            Self::Sse | Self::StreamableHttp => &["http", "https"],
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TransportKind {
    type Error = ToolRegistryDomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "websocket" => Ok(Self::WebSocket),
            "sse" => Ok(Self::Sse),
            "streamable-http" | "http" => Ok(Self::StreamableHttp),
            _ => Err(ToolRegistryDomainError::UnknownTransportType(
                value.to_owned(),
            )),
        }
    }
}

/// Where a STDIO child's stderr goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrMode {
    /// Share the host process's stderr.
    Inherit,
    /// Capture and forward line by line to `tracing`.
    #[default]
    Pipe,
    /// Discard.
    Ignore,
}

/// Transport settings for an MCP server hosted over STDIO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioTransportConfig {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    stderr: StderrMode,
}

impl StdioTransportConfig {
    /// Creates a new STDIO transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::EmptyStdioCommand`] when `command`
    /// is empty after trimming.
    pub fn new(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        let normalized_command = command.into().trim().to_owned();
        if normalized_command.is_empty() {
            return Err(ToolRegistryDomainError::EmptyStdioCommand);
        }

        Ok(Self {
            command: normalized_command,
            args: Vec::new(),
            env: BTreeMap::new(),
            stderr: StderrMode::default(),
        })
    }

    /// Replaces command-line arguments.
    #[must_use]
    pub fn with_args(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.args = values.into_iter().collect();
        self
    }

    /// Replaces process environment variables.
    #[must_use]
    pub fn with_env(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.env = values.into_iter().collect();
        self
    }

    /// Sets stderr handling.
    #[must_use]
    pub const fn with_stderr(mut self, stderr: StderrMode) -> Self {
        self.stderr = stderr;
        self
    }

    /// Returns the executable command.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns command-line arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns environment variables.
    #[must_use]
    pub const fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns stderr handling.
    #[must_use]
    pub const fn stderr(&self) -> StderrMode {
        self.stderr
    }
}

/// Transport settings for a network-hosted MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTransportConfig {
    url: String,
    headers: BTreeMap<String, String>,
}

impl RemoteTransportConfig {
    /// Creates a remote transport configuration.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_owned(),
            headers: BTreeMap::new(),
        }
    }

    /// Replaces request headers.
    #[must_use]
    pub fn with_headers(mut self, values: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers = values.into_iter().collect();
        self
    }

    /// Returns the endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns request headers.
    #[must_use]
    pub const fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }
}

/// Supported MCP transport configuration variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum McpTransport {
    /// MCP over local process STDIO.
    Stdio(StdioTransportConfig),
    /// MCP over WebSocket.
    WebSocket(RemoteTransportConfig),
    /// MCP over legacy HTTP+SSE.
    Sse(RemoteTransportConfig),
    /// MCP over streamable HTTP.
    StreamableHttp(RemoteTransportConfig),
}

impl McpTransport {
    /// Creates a `stdio` transport.
    ///
    /// # Errors
    ///
    /// Returns validation errors from [`StdioTransportConfig::new`].
    pub fn stdio(command: impl Into<String>) -> Result<Self, ToolRegistryDomainError> {
        Ok(Self::Stdio(StdioTransportConfig::new(command)?))
    }

    /// Creates a network transport of `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] when `kind` is `stdio` or the URL
    /// does not suit the transport.
    pub fn remote(
        kind: TransportKind,
        config: RemoteTransportConfig,
    ) -> Result<Self, ToolRegistryDomainError> {
        let transport = match kind {
            TransportKind::Stdio => return Err(ToolRegistryDomainError::UrlNotAllowedForStdio),
            TransportKind::WebSocket => Self::WebSocket(config),
            TransportKind::Sse => Self::Sse(config),
            TransportKind::StreamableHttp => Self::StreamableHttp(config),
        };
        transport.validate()?;
        Ok(transport)
    }

    /// Returns the transport kind.
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::Stdio(_) => TransportKind::Stdio,
            Self::WebSocket(_) => TransportKind::WebSocket,
            Self::Sse(_) => TransportKind::Sse,
            Self::StreamableHttp(_) => TransportKind::StreamableHttp,
        }
    }

    /// Returns the remote settings for network transports.
    #[must_use]
    pub const fn remote_config(&self) -> Option<&RemoteTransportConfig> {
        match self {
            Self::Stdio(_) => None,
            Self::WebSocket(remote) | Self::Sse(remote) | Self::StreamableHttp(remote) => {
                Some(remote)
            }
        }
    }

    /// Returns the endpoint URL for network transports.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.remote_config().map(RemoteTransportConfig::url)
    }

    /// Checks the transport invariants.
    ///
    /// URLs still containing placeholders are checked for scheme only, since
    /// they are completed per user at connect time.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError`] for an empty command, a missing or
    /// unparsable URL, or a URL scheme that does not match the transport.
    pub fn validate(&self) -> Result<(), ToolRegistryDomainError> {
        match self {
            Self::Stdio(stdio) if stdio.command.trim().is_empty() => {
                Err(ToolRegistryDomainError::EmptyStdioCommand)
            }
            Self::Stdio(_) => Ok(()),
            Self::WebSocket(remote) | Self::Sse(remote) | Self::StreamableHttp(remote) => {
                validate_remote_url(self.kind(), remote.url())
            }
        }
    }

    /// Returns a copy with `map` applied to every substitutable value.
    #[must_use]
    pub fn map_values(&self, map: impl Fn(&str) -> String) -> Self {
        let map_remote = |remote: &RemoteTransportConfig| RemoteTransportConfig {
            url: map(&remote.url),
            headers: map_entries(&remote.headers, &map),
        };
        match self {
            Self::Stdio(stdio) => Self::Stdio(StdioTransportConfig {
                command: stdio.command.clone(),
                args: stdio.args.iter().map(|arg| map(arg)).collect(),
                env: map_entries(&stdio.env, &map),
                stderr: stdio.stderr,
            }),
            Self::WebSocket(remote) => Self::WebSocket(map_remote(remote)),
            Self::Sse(remote) => Self::Sse(map_remote(remote)),
            Self::StreamableHttp(remote) => Self::StreamableHttp(map_remote(remote)),
        }
    }
}

fn map_entries(
    entries: &BTreeMap<String, String>,
    map: &impl Fn(&str) -> String,
) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| (key.clone(), map(value)))
        .collect()
}

fn validate_remote_url(kind: TransportKind, url: &str) -> Result<(), ToolRegistryDomainError> {
    if url.trim().is_empty() {
        return Err(ToolRegistryDomainError::MissingUrl {
            transport: kind.as_str(),
        });
    }

    let Some((raw_scheme, _)) = url.split_once(':') else {
        return Err(ToolRegistryDomainError::InvalidUrl {
            url: url.to_owned(),
            reason: String::from("missing scheme"),
        });
    };
    let scheme = raw_scheme.to_ascii_lowercase();
    if !kind.allowed_schemes().contains(&scheme.as_str()) {
        return Err(ToolRegistryDomainError::UrlProtocolMismatch {
            transport: kind.as_str(),
            scheme,
        });
    }

    if contains_placeholder(url) {
        return Ok(());
    }
    Url::parse(url)
        .map(|_| ())
        .map_err(|err| ToolRegistryDomainError::InvalidUrl {
            url: url.to_owned(),
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TransportKind::WebSocket, "wss://tools.example.com/mcp")]
    #[case(TransportKind::Sse, "http://localhost:3001/sse")]
    #[case(TransportKind::StreamableHttp, "https://api.example.com/mcp")]
    #[case(TransportKind::StreamableHttp, "https://{{USER_ID}}.example.com/mcp")]
    fn accepts_matching_schemes(#[case] kind: TransportKind, #[case] url: &str) {
        let result = McpTransport::remote(kind, RemoteTransportConfig::new(url));
        assert!(result.is_ok(), "{kind} should accept {url}: {result:?}");
    }

    #[rstest]
    #[case(TransportKind::Sse, "ws://x", "ws")]
    #[case(TransportKind::StreamableHttp, "wss://x", "wss")]
    #[case(TransportKind::WebSocket, "https://x", "https")]
    fn rejects_mismatched_schemes(
        #[case] kind: TransportKind,
        #[case] url: &str,
        #[case] scheme: &str,
    ) {
        let result = McpTransport::remote(kind, RemoteTransportConfig::new(url));
        assert_eq!(
            result,
            Err(ToolRegistryDomainError::UrlProtocolMismatch {
                transport: kind.as_str(),
                scheme: scheme.to_owned(),
            })
        );
    }

    #[test]
    fn rejects_missing_url() {
        let result = McpTransport::remote(TransportKind::Sse, RemoteTransportConfig::new("  "));
        assert!(matches!(
            result,
            Err(ToolRegistryDomainError::MissingUrl { .. })
        ));
    }

    #[rstest]
    #[case("http", TransportKind::StreamableHttp)]
    #[case("Streamable-HTTP", TransportKind::StreamableHttp)]
    #[case("websocket", TransportKind::WebSocket)]
    fn parses_transport_aliases(#[case] raw: &str, #[case] expected: TransportKind) {
        assert_eq!(TransportKind::try_from(raw), Ok(expected));
    }

    #[test]
    fn map_values_rewrites_args_env_and_headers() {
        let stdio = McpTransport::Stdio(
            StdioTransportConfig::new("npx")
                .expect("valid command")
                .with_args([String::from("--user"), String::from("X")])
                .with_env([(String::from("TOKEN"), String::from("X"))]),
        );

        let mapped = stdio.map_values(|value| value.replace('X', "alice"));

        let McpTransport::Stdio(config) = mapped else {
            panic!("transport kind should be preserved");
        };
        assert_eq!(config.args(), ["--user", "alice"]);
        assert_eq!(config.env().get("TOKEN").map(String::as_str), Some("alice"));
        assert_eq!(config.command(), "npx");
    }
}
