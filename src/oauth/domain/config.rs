//! Per-server OAuth client configuration.

use super::OAuthDomainError;
use serde::{Deserialize, Serialize};
use url::Url;

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenExchangeMethod {
    /// Credentials travel in the form body.
    #[default]
    #[serde(alias = "DefaultPost")]
    DefaultPost,
    /// Credentials travel in an HTTP Basic `Authorization` header.
    #[serde(alias = "BasicAuthHeader")]
    BasicAuthHeader,
}

/// OAuth client settings attached to an MCP server definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Authorization endpoint the user is redirected to.
    pub authorization_url: String,
    /// Token endpoint used for the code exchange.
    pub token_url: String,
    /// Registered client identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Confidential client secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Space-delimited scopes requested during authorization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Callback URL registered with the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// Credential placement for the token exchange.
    #[serde(default)]
    pub token_exchange_method: TokenExchangeMethod,
}

impl OAuthConfig {
    /// Creates a configuration with the two required endpoints.
    #[must_use]
    pub fn new(authorization_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            client_id: None,
            client_secret: None,
            scope: None,
            redirect_uri: None,
            token_exchange_method: TokenExchangeMethod::DefaultPost,
        }
    }

    /// Sets the client identifier.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Sets the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(redirect_uri.into());
        self
    }

    /// Sets the token exchange method.
    #[must_use]
    pub const fn with_token_exchange_method(mut self, method: TokenExchangeMethod) -> Self {
        self.token_exchange_method = method;
        self
    }

    /// Checks that both endpoints are absolute `http(s)` URLs.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthDomainError::InvalidEndpointUrl`] naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), OAuthDomainError> {
        ensure_http_url("authorization_url", &self.authorization_url)?;
        ensure_http_url("token_url", &self.token_url)?;
        if let Some(redirect_uri) = self.redirect_uri.as_deref() {
            ensure_http_url("redirect_uri", redirect_uri)?;
        }
        Ok(())
    }
}

fn ensure_http_url(field: &'static str, value: &str) -> Result<(), OAuthDomainError> {
    let invalid = || OAuthDomainError::InvalidEndpointUrl {
        field,
        url: value.to_owned(),
    };
    let parsed = Url::parse(value.trim()).map_err(|_| invalid())?;
    if matches!(parsed.scheme(), "http" | "https") {
        Ok(())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://auth.example.com/authorize", "https://auth.example.com/token", true)]
    #[case("ftp://auth.example.com/authorize", "https://auth.example.com/token", false)]
    #[case("https://auth.example.com/authorize", "not a url", false)]
    fn validate_requires_http_endpoints(
        #[case] authorization_url: &str,
        #[case] token_url: &str,
        #[case] expected_ok: bool,
    ) {
        let config = OAuthConfig::new(authorization_url, token_url);
        assert_eq!(config.validate().is_ok(), expected_ok);
    }

    #[test]
    fn exchange_method_accepts_both_spellings() {
        let snake: TokenExchangeMethod =
            serde_json::from_str("\"basic_auth_header\"").expect("snake case should parse");
        let pascal: TokenExchangeMethod =
            serde_json::from_str("\"BasicAuthHeader\"").expect("pascal case should parse");
        assert_eq!(snake, TokenExchangeMethod::BasicAuthHeader);
        assert_eq!(pascal, TokenExchangeMethod::BasicAuthHeader);
    }
}
