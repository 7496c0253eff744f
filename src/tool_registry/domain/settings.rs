//! Process-wide MCP settings read from the `mcpSettings` block.

use super::DEFAULT_TOOL_DELIMITER;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for connection management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct McpSettings {
    /// Separator in qualified tool names.
    pub tool_delimiter: String,
    /// Start with user-defined servers excluded from merging.
    pub override_mode: bool,
    /// Request timeout when a server sets none.
    pub default_timeout_ms: u64,
    /// Connect and handshake timeout when a server sets none.
    pub default_init_timeout_ms: u64,
    /// How long a STDIO child may take to exit before it is killed.
    pub shutdown_grace_ms: u64,
    /// Servers connected in parallel during startup.
    pub startup_concurrency: usize,
    /// How long a connection attempt waits for OAuth completion. Zero records
    /// the pending flow without waiting.
    pub oauth_wait_ms: u64,
    /// Upper bound on `tools/list` pages followed per discovery.
    pub max_tool_pages: usize,
    /// Lifetime of OAuth flow records.
    pub flow_ttl_secs: u64,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            tool_delimiter: DEFAULT_TOOL_DELIMITER.to_owned(),
            override_mode: false,
            default_timeout_ms: 60_000,
            default_init_timeout_ms: 120_000,
            shutdown_grace_ms: 2_000,
            startup_concurrency: 4,
            oauth_wait_ms: 0,
            max_tool_pages: 20,
            flow_ttl_secs: 600,
        }
    }
}

impl McpSettings {
    /// Returns the default request timeout.
    #[must_use]
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Returns the default connect and handshake timeout.
    #[must_use]
    pub const fn default_init_timeout(&self) -> Duration {
        Duration::from_millis(self.default_init_timeout_ms)
    }

    /// Returns the STDIO shutdown grace period.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Returns the OAuth wait bound.
    #[must_use]
    pub const fn oauth_wait(&self) -> Duration {
        Duration::from_millis(self.oauth_wait_ms)
    }

    /// Returns the OAuth flow record lifetime.
    #[must_use]
    pub const fn flow_ttl(&self) -> Duration {
        Duration::from_secs(self.flow_ttl_secs)
    }

    /// Returns the startup concurrency, at least one.
    #[must_use]
    pub fn startup_concurrency(&self) -> usize {
        self.startup_concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_block_keeps_defaults() {
        let settings: McpSettings =
            serde_yaml::from_str("overrideMode: true\nstartupConcurrency: 0\n")
                .expect("settings should parse");

        assert!(settings.override_mode);
        assert_eq!(settings.tool_delimiter, "_mcp_");
        assert_eq!(settings.default_timeout(), Duration::from_secs(60));
        assert_eq!(settings.startup_concurrency(), 1);
    }
}
