//! OAuth flow records and their state machine.

use super::{OAuthConfig, OAuthDomainError, OAuthTokens, ParseFlowStatusError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque flow identifier.
///
/// Flows created by this crate follow `<scope>:<serverName>:<nonce>`, but
/// callers may hand in any string and it is only used as a lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Wraps an existing flow identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a fresh identifier for `scope` and `server_name`.
    #[must_use]
    pub fn generate(scope: &str, server_name: &str) -> Self {
        Self(format!("{scope}:{server_name}:{}", Uuid::new_v4().simple()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for FlowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Status of an OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowStatus {
    /// Waiting for the user or for a linked flow.
    Pending,
    /// Tokens are available.
    Completed,
    /// The flow ended without tokens.
    Failed,
}

impl FlowStatus {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FlowStatus {
    type Error = ParseFlowStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ParseFlowStatusError(value.to_owned())),
        }
    }
}

/// Context carried by a flow record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMetadata {
    /// Server the flow authorizes.
    pub server_name: String,
    /// Server endpoint, absent for stdio servers.
    pub server_url: Option<String>,
    /// Owning user or scope.
    pub user_id: String,
    /// OAuth client settings; absent on tool flows.
    pub oauth: Option<OAuthConfig>,
    /// PKCE verifier paired with the authorization request.
    pub code_verifier: Option<String>,
    /// Flow completed together with this one.
    pub tool_flow_id: Option<FlowId>,
}

impl FlowMetadata {
    /// Creates metadata for `server_name` owned by `user_id`.
    #[must_use]
    pub fn new(server_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            server_url: None,
            user_id: user_id.into(),
            oauth: None,
            code_verifier: None,
            tool_flow_id: None,
        }
    }
}

/// Persisted state of one OAuth flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthFlowState {
    flow_id: FlowId,
    status: FlowStatus,
    metadata: FlowMetadata,
    result: Option<OAuthTokens>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OAuthFlowState {
    /// Creates a pending flow.
    #[must_use]
    pub const fn pending(flow_id: FlowId, metadata: FlowMetadata, now: DateTime<Utc>) -> Self {
        Self {
            flow_id,
            status: FlowStatus::Pending,
            metadata,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the flow identifier.
    #[must_use]
    pub const fn flow_id(&self) -> &FlowId {
        &self.flow_id
    }

    /// Returns the current status.
    #[must_use]
    pub const fn status(&self) -> FlowStatus {
        self.status
    }

    /// Returns the flow metadata.
    #[must_use]
    pub const fn metadata(&self) -> &FlowMetadata {
        &self.metadata
    }

    /// Returns the tokens of a completed flow.
    #[must_use]
    pub const fn result(&self) -> Option<&OAuthTokens> {
        self.result.as_ref()
    }

    /// Returns the failure reason of a failed flow.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last transition timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks the flow completed with `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthDomainError::FlowNotPending`] for terminal flows.
    pub fn complete(
        &mut self,
        tokens: OAuthTokens,
        now: DateTime<Utc>,
    ) -> Result<(), OAuthDomainError> {
        self.ensure_pending()?;
        self.status = FlowStatus::Completed;
        self.result = Some(tokens);
        self.updated_at = now;
        Ok(())
    }

    /// Marks the flow failed with `reason`.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthDomainError::FlowNotPending`] for terminal flows.
    pub fn fail(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), OAuthDomainError> {
        self.ensure_pending()?;
        self.status = FlowStatus::Failed;
        self.error = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), OAuthDomainError> {
        if self.status.is_terminal() {
            return Err(OAuthDomainError::FlowNotPending {
                flow_id: self.flow_id.clone(),
                status: self.status,
            });
        }
        Ok(())
    }
}
