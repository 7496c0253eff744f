//! Connection attempts that stop on an authorization prompt.

use super::support::{harness_with, name, tools};
use crate::oauth::{
    domain::{FlowId, OAuthConfig},
    services::OAuthError,
};
use crate::tool_registry::{
    domain::{
        ConfigOrigin, McpSettings, McpTransport, PendingOAuth, RemoteTransportConfig,
        ServerConfig, ServerKey, ServerStatus, TransportKind,
    },
    ports::MockAuthorizationBroker,
};
use rstest::rstest;

fn protected() -> ServerConfig {
    let transport = McpTransport::remote(
        TransportKind::StreamableHttp,
        RemoteTransportConfig::new("https://files.example.com/mcp"),
    )
    .expect("valid transport");
    ServerConfig::new(name("files"), transport).with_oauth(OAuthConfig::new(
        "https://auth.example.com/authorize",
        "https://auth.example.com/token",
    ))
}

fn pending() -> PendingOAuth {
    PendingOAuth {
        flow_id: FlowId::new("system:files:tool"),
        authorization_url: String::from("https://auth.example.com/authorize?state=x"),
    }
}

fn settings(oauth_wait_ms: u64) -> McpSettings {
    McpSettings {
        oauth_wait_ms,
        ..McpSettings::default()
    }
}

fn broker_without_tokens() -> MockAuthorizationBroker {
    let mut broker = MockAuthorizationBroker::new();
    broker.expect_access_token().returning(|_, _| Ok(None));
    broker
        .expect_request_authorization()
        .times(1)
        .returning(|_, _, _| Ok(pending()));
    broker
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn without_a_wait_the_server_stays_connecting_with_the_pending_flow() {
    let harness = harness_with(&[], settings(0), broker_without_tokens());
    harness.script("files", tools(&["read"]).requiring_oauth());
    let key = ServerKey::global(name("files"));

    let outcome = harness
        .controller
        .connect_server(key.clone(), protected(), ConfigOrigin::File)
        .await
        .expect("attempt reported");

    assert_eq!(outcome.status, ServerStatus::Connecting);
    assert_eq!(outcome.pending_oauth, Some(pending()));
    assert!(harness.controller.registry().get(&key).expect("registry").is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn completed_authorization_resumes_the_connection() {
    let mut broker = broker_without_tokens();
    broker
        .expect_await_authorization()
        .times(1)
        .returning(|_, _| Ok(String::from("fresh-token")));
    let harness = harness_with(&[], settings(500), broker);
    harness.script("files", tools(&["read"]).requiring_oauth());

    let outcome = harness
        .controller
        .connect_server(ServerKey::global(name("files")), protected(), ConfigOrigin::File)
        .await
        .expect("attempt reported");

    assert!(outcome.is_online());
    assert_eq!(
        harness
            .connector
            .last_access_token(&name("files"))
            .expect("token readable")
            .as_deref(),
        Some("fresh-token")
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn an_expired_wait_leaves_the_flow_pending() {
    let mut broker = broker_without_tokens();
    broker
        .expect_await_authorization()
        .returning(|flow_id, _| Err(OAuthError::Timeout(flow_id.clone())));
    let harness = harness_with(&[], settings(50), broker);
    harness.script("files", tools(&["read"]).requiring_oauth());

    let outcome = harness
        .controller
        .connect_server(ServerKey::global(name("files")), protected(), ConfigOrigin::File)
        .await
        .expect("attempt reported");

    assert_eq!(outcome.status, ServerStatus::Connecting);
    assert!(outcome.pending_oauth.is_some());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stored_tokens_are_sent_as_bearer_credentials() {
    let mut broker = MockAuthorizationBroker::new();
    broker
        .expect_access_token()
        .withf(|user, server| user == "system" && server == "files")
        .returning(|_, _| Ok(Some(String::from("stored"))));
    let harness = harness_with(&[], settings(0), broker);
    harness.script("files", tools(&["read"]).requiring_oauth());

    let outcome = harness
        .controller
        .connect_server(ServerKey::global(name("files")), protected(), ConfigOrigin::File)
        .await
        .expect("attempt reported");

    assert!(outcome.is_online());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn servers_without_oauth_settings_fail_on_an_authorization_prompt() {
    let harness = harness_with(&[], settings(0), MockAuthorizationBroker::new());
    harness.script("plain", tools(&["read"]).requiring_oauth());
    let config = ServerConfig::new(
        name("plain"),
        McpTransport::remote(
            TransportKind::StreamableHttp,
            RemoteTransportConfig::new("https://plain.example.com/mcp"),
        )
        .expect("valid transport"),
    );

    let outcome = harness
        .controller
        .connect_server(ServerKey::global(name("plain")), config, ConfigOrigin::File)
        .await
        .expect("attempt reported");

    assert_eq!(outcome.status, ServerStatus::Error);
    assert!(outcome.pending_oauth.is_none());
}
