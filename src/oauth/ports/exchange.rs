//! Authorization-code exchange against a token endpoint.

use crate::oauth::domain::{OAuthConfig, TokenEndpointResponse, TokenExchangeMethod};
use async_trait::async_trait;
use thiserror::Error;

/// Parameters of one authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeExchangeRequest {
    /// Token endpoint.
    pub token_url: String,
    /// Client identifier.
    pub client_id: Option<String>,
    /// Client secret.
    pub client_secret: Option<String>,
    /// Redirect URI used in the authorization request.
    pub redirect_uri: Option<String>,
    /// Authorization code from the callback.
    pub code: String,
    /// PKCE verifier.
    pub code_verifier: Option<String>,
    /// Credential placement.
    pub method: TokenExchangeMethod,
}

impl CodeExchangeRequest {
    /// Builds a request from server OAuth settings.
    #[must_use]
    pub fn from_config(
        config: &OAuthConfig,
        code: impl Into<String>,
        code_verifier: Option<String>,
    ) -> Self {
        Self {
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            code: code.into(),
            code_verifier,
            method: config.token_exchange_method,
        }
    }
}

/// Performs the authorization-code grant.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        request: &CodeExchangeRequest,
    ) -> Result<TokenEndpointResponse, TokenExchangeError>;
}

/// Errors returned by token exchangers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenExchangeError {
    /// The request could not be sent.
    #[error("token endpoint request failed: {0}")]
    Transport(String),

    /// The endpoint answered with a non-success status.
    #[error("token endpoint rejected the exchange ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response body was not a token response.
    #[error("token endpoint returned an unreadable response: {0}")]
    Decode(String),
}
