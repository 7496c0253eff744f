//! Live status of a configured server.

use super::{ParseServerStatusError, ToolDescriptor, ToolRegistryDomainError};
use crate::oauth::domain::FlowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Connection status of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    /// Never attempted.
    Unknown,
    /// Connect or handshake in progress.
    Connecting,
    /// Connected with tools discovered.
    Online,
    /// Deliberately disconnected or disabled.
    Offline,
    /// The last attempt failed.
    Error,
}

impl ServerStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Connecting => "connecting",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }

    /// Returns whether transition to `target` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (_, Self::Offline)
                | (
                    Self::Unknown | Self::Online | Self::Offline | Self::Error,
                    Self::Connecting
                )
                | (Self::Connecting | Self::Online, Self::Error)
                | (Self::Connecting, Self::Online)
        )
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServerStatus {
    type Error = ParseServerStatusError;

    fn try_from(value: &str) -> Result<Self, ParseServerStatusError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(Self::Unknown),
            "connecting" => Ok(Self::Connecting),
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "error" => Ok(Self::Error),
            _ => Err(ParseServerStatusError(value.to_owned())),
        }
    }
}

/// Authorization a parked connection attempt is waiting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOAuth {
    /// Flow the connection attempt waits on.
    pub flow_id: FlowId,
    /// URL the user must visit.
    pub authorization_url: String,
}

/// Mutable runtime record owned by the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRuntimeState {
    status: ServerStatus,
    error_message: Option<String>,
    last_connected: Option<DateTime<Utc>>,
    tools: Vec<ToolDescriptor>,
    instructions: Option<String>,
    pending_oauth: Option<PendingOAuth>,
    updated_at: DateTime<Utc>,
}

impl ServerRuntimeState {
    /// Creates a state in `unknown`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ServerStatus::Unknown,
            error_message: None,
            last_connected: None,
            tools: Vec::new(),
            instructions: None,
            pending_oauth: None,
            updated_at: now,
        }
    }

    /// Enters `connecting`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] when
    /// already connecting.
    pub fn mark_connecting(&mut self, now: DateTime<Utc>) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Connecting)?;
        self.updated_at = now;
        Ok(())
    }

    /// Enters `online` with the discovered tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] unless
    /// connecting.
    pub fn mark_online(
        &mut self,
        tools: Vec<ToolDescriptor>,
        instructions: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Online)?;
        self.tools = tools;
        self.instructions = instructions;
        self.error_message = None;
        self.pending_oauth = None;
        self.last_connected = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Enters `error`, dropping discovered tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] unless
    /// connecting or online.
    pub fn mark_error(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ToolRegistryDomainError> {
        self.transition_to(ServerStatus::Error)?;
        self.error_message = Some(message.into());
        self.tools.clear();
        self.instructions = None;
        self.pending_oauth = None;
        self.updated_at = now;
        Ok(())
    }

    /// Enters `offline`. Always allowed; tool overrides are kept for the next
    /// connection.
    pub fn mark_offline(&mut self, now: DateTime<Utc>) {
        self.status = ServerStatus::Offline;
        self.pending_oauth = None;
        self.updated_at = now;
    }

    /// Records that the connection attempt is parked on an OAuth flow.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] unless
    /// connecting.
    pub fn mark_awaiting_oauth(
        &mut self,
        pending: PendingOAuth,
        now: DateTime<Utc>,
    ) -> Result<(), ToolRegistryDomainError> {
        if self.status != ServerStatus::Connecting {
            return Err(ToolRegistryDomainError::InvalidStatusTransition {
                from: self.status.as_str().to_owned(),
                to: String::from("awaiting_oauth"),
            });
        }
        self.pending_oauth = Some(pending);
        self.updated_at = now;
        Ok(())
    }

    /// Replaces the tool set of an online server after rediscovery.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryDomainError::InvalidStatusTransition`] unless
    /// online.
    pub fn replace_tools(
        &mut self,
        tools: Vec<ToolDescriptor>,
        now: DateTime<Utc>,
    ) -> Result<(), ToolRegistryDomainError> {
        if self.status != ServerStatus::Online {
            return Err(ToolRegistryDomainError::InvalidStatusTransition {
                from: self.status.as_str().to_owned(),
                to: String::from("online"),
            });
        }
        self.tools = tools;
        self.updated_at = now;
        Ok(())
    }

    /// Sets a tool's enabled flag. Returns `false` when the tool is unknown.
    pub fn set_tool_enabled(&mut self, tool_name: &str, enabled: bool, now: DateTime<Utc>) -> bool {
        let Some(tool) = self.tools.iter_mut().find(|tool| tool.name() == tool_name) else {
            return false;
        };
        tool.set_enabled(enabled, now);
        self.updated_at = now;
        true
    }

    /// Returns the status.
    #[must_use]
    pub const fn status(&self) -> ServerStatus {
        self.status
    }

    /// Returns the last error message.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Returns when the server last came online.
    #[must_use]
    pub const fn last_connected(&self) -> Option<DateTime<Utc>> {
        self.last_connected
    }

    /// Returns discovered tools, enabled or not.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Returns the number of discovered tools.
    #[must_use]
    pub const fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Returns instructions to surface to the model.
    #[must_use]
    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    /// Returns the OAuth flow the server is waiting on.
    #[must_use]
    pub const fn pending_oauth(&self) -> Option<&PendingOAuth> {
        self.pending_oauth.as_ref()
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn transition_to(&mut self, target: ServerStatus) -> Result<(), ToolRegistryDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(ToolRegistryDomainError::InvalidStatusTransition {
                from: self.status.as_str().to_owned(),
                to: target.as_str().to_owned(),
            });
        }
        self.status = target;
        Ok(())
    }
}
