//! Authorization port: bearer credentials, custom user variables and parked
//! OAuth flows.

use crate::oauth::{
    domain::{FlowId, OAuthConfig},
    services::OAuthResult,
};
use crate::tool_registry::domain::{PendingOAuth, ServerConfig};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Supplies credentials for OAuth-protected servers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationBroker: Send + Sync {
    /// Returns a stored, unexpired access token for `user_id` on `server`.
    async fn access_token(&self, user_id: &str, server: &str) -> OAuthResult<Option<String>>;

    /// Returns the custom variable values `user_id` saved for `server`.
    async fn user_variables(
        &self,
        user_id: &str,
        server: &str,
    ) -> OAuthResult<BTreeMap<String, String>>;

    /// Starts an authorization flow that a connection attempt can wait on.
    async fn request_authorization(
        &self,
        user_id: &str,
        config: &ServerConfig,
        oauth: &OAuthConfig,
    ) -> OAuthResult<PendingOAuth>;

    /// Waits for a parked flow to complete and returns its access token.
    ///
    /// # Errors
    ///
    /// Returns [`crate::oauth::services::OAuthError::Timeout`] when `timeout`
    /// elapses first.
    async fn await_authorization(&self, flow_id: &FlowId, timeout: Duration)
    -> OAuthResult<String>;
}
