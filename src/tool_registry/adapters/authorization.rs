//! [`AuthorizationBroker`] backed by the OAuth flow manager.

use crate::oauth::{
    domain::{FlowId, OAuthConfig, TokenKey},
    ports::{FlowStateStore, TokenExchanger, TokenStore},
    services::{OAuthFlowManager, OAuthResult},
};
use crate::tool_registry::{
    domain::{PendingOAuth, ServerConfig},
    ports::AuthorizationBroker,
};
use async_trait::async_trait;
use mockable::Clock;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

#[async_trait]
impl<F, T, X, C> AuthorizationBroker for OAuthFlowManager<F, T, X, C>
where
    F: FlowStateStore,
    T: TokenStore,
    X: TokenExchanger,
    C: Clock + Send + Sync,
{
    async fn access_token(&self, user_id: &str, server: &str) -> OAuthResult<Option<String>> {
        let stored = self.stored_tokens(&TokenKey::new(user_id, server)).await?;
        Ok(stored.map(|tokens| tokens.access_token().to_owned()))
    }

    async fn user_variables(
        &self,
        user_id: &str,
        server: &str,
    ) -> OAuthResult<BTreeMap<String, String>> {
        OAuthFlowManager::user_variables(self, &TokenKey::new(user_id, server)).await
    }

    async fn request_authorization(
        &self,
        user_id: &str,
        config: &ServerConfig,
        oauth: &OAuthConfig,
    ) -> OAuthResult<PendingOAuth> {
        let server = config.name().as_str();
        let tool_flow_id = self.begin_tool_flow(server, user_id).await?;
        let initiated = self
            .initiate_chained(
                server,
                config.transport().url(),
                user_id,
                oauth,
                tool_flow_id.clone(),
            )
            .await?;
        info!(
            server,
            flow_id = %initiated.flow_id,
            "MCP server connection parked on OAuth authorization"
        );
        Ok(PendingOAuth {
            flow_id: tool_flow_id,
            authorization_url: initiated.authorization_url.to_string(),
        })
    }

    async fn await_authorization(
        &self,
        flow_id: &FlowId,
        timeout: Duration,
    ) -> OAuthResult<String> {
        let tokens = self.wait_for_completion(flow_id, timeout).await?;
        Ok(tokens.access_token().to_owned())
    }
}
