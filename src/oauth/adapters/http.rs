//! Token endpoint client built on `reqwest`.

use crate::oauth::{
    domain::{TokenEndpointResponse, TokenExchangeMethod},
    ports::{CodeExchangeRequest, TokenExchangeError, TokenExchanger},
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Exchanges authorization codes over HTTP.
#[derive(Debug, Clone)]
pub struct ReqwestTokenExchanger {
    client: reqwest::Client,
}

impl ReqwestTokenExchanger {
    /// Creates an exchanger with its own HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Creates an exchanger sharing an existing HTTP client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTokenExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenExchanger for ReqwestTokenExchanger {
    async fn exchange_code(
        &self,
        request: &CodeExchangeRequest,
    ) -> Result<TokenEndpointResponse, TokenExchangeError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "authorization_code"),
            ("code", request.code.as_str()),
        ];
        if let Some(redirect_uri) = request.redirect_uri.as_deref() {
            form.push(("redirect_uri", redirect_uri));
        }
        if let Some(verifier) = request.code_verifier.as_deref() {
            form.push(("code_verifier", verifier));
        }

        let mut builder = self
            .client
            .post(&request.token_url)
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .header(reqwest::header::ACCEPT, "application/json");
        match request.method {
            TokenExchangeMethod::DefaultPost => {
                if let Some(client_id) = request.client_id.as_deref() {
                    form.push(("client_id", client_id));
                }
                if let Some(client_secret) = request.client_secret.as_deref() {
                    form.push(("client_secret", client_secret));
                }
            }
            TokenExchangeMethod::BasicAuthHeader => {
                let client_id = request.client_id.as_deref().unwrap_or_default();
                builder = builder.basic_auth(client_id, request.client_secret.as_deref());
            }
        }

        debug!(
            token_url = %request.token_url,
            method = ?request.method,
            "exchanging OAuth authorization code"
        );
        let response = builder
            .form(&form)
            .send()
            .await
            .map_err(|err| TokenExchangeError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenExchangeError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<TokenEndpointResponse>()
            .await
            .map_err(|err| TokenExchangeError::Decode(err.to_string()))
    }
}
