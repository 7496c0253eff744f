//! Authorization request URL construction.

use super::{FlowId, OAuthConfig, OAuthDomainError};
use url::Url;

/// Builds the authorization URL for `config`, carrying `flow_id` as the
/// `state` parameter and `code_challenge` as an S256 PKCE challenge.
///
/// # Errors
///
/// Returns [`OAuthDomainError::InvalidEndpointUrl`] when the configured
/// authorization endpoint cannot be parsed.
pub fn build_authorization_url(
    config: &OAuthConfig,
    flow_id: &FlowId,
    code_challenge: &str,
) -> Result<Url, OAuthDomainError> {
    let mut url = Url::parse(config.authorization_url.trim()).map_err(|_| {
        OAuthDomainError::InvalidEndpointUrl {
            field: "authorization_url",
            url: config.authorization_url.clone(),
        }
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        if let Some(client_id) = non_blank(config.client_id.as_deref()) {
            query.append_pair("client_id", client_id);
        }
        if let Some(redirect_uri) = non_blank(config.redirect_uri.as_deref()) {
            query.append_pair("redirect_uri", redirect_uri);
        }
        query.append_pair("state", flow_id.as_str());
        query.append_pair("code_challenge", code_challenge);
        query.append_pair("code_challenge_method", "S256");
        if let Some(scope) = non_blank(config.scope.as_deref()) {
            query.append_pair("scope", scope);
        }
    }
    Ok(url)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|candidate| !candidate.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn url_carries_state_and_pkce_parameters() {
        let config = OAuthConfig::new(
            "https://auth.example.com/authorize?audience=mcp",
            "https://auth.example.com/token",
        )
        .with_client_id("client-1")
        .with_scope("read write")
        .with_redirect_uri("https://app.example.com/oauth/callback");
        let flow_id = FlowId::new("alice:github:n1");

        let url = build_authorization_url(&config, &flow_id, "challenge")
            .expect("authorization url should build");
        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        assert_eq!(params.get("audience").map(String::as_str), Some("mcp"));
        assert_eq!(params.get("state").map(String::as_str), Some("alice:github:n1"));
        assert_eq!(params.get("client_id").map(String::as_str), Some("client-1"));
        assert_eq!(params.get("scope").map(String::as_str), Some("read write"));
        assert_eq!(
            params.get("code_challenge_method").map(String::as_str),
            Some("S256")
        );
    }

    #[test]
    fn blank_client_id_is_omitted() {
        let config = OAuthConfig::new("https://a.example/authorize", "https://a.example/token")
            .with_client_id("  ");
        let url = build_authorization_url(&config, &FlowId::new("f"), "c")
            .expect("authorization url should build");
        assert!(url.query_pairs().all(|(key, _)| key != "client_id"));
    }
}
