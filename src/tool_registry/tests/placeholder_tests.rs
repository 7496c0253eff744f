//! Placeholder resolution for file and user-owned servers.

use super::support::{Harness, harness, harness_with, name, tools};
use crate::tool_registry::{
    domain::{
        CustomUserVar, McpSettings, McpTransport, RemoteTransportConfig, ServerConfig,
        TransportKind, UserId, UserServerRecord,
    },
    ports::{MockAuthorizationBroker, UserServerRepository},
};
use mockable::DefaultClock;
use rstest::rstest;
use std::collections::BTreeMap;

fn streamable(server: &str, headers: &[(&str, &str)]) -> ServerConfig {
    let remote = RemoteTransportConfig::new("https://mcp.example.com/mcp").with_headers(
        headers
            .iter()
            .map(|(header, value)| ((*header).to_owned(), (*value).to_owned())),
    );
    let transport =
        McpTransport::remote(TransportKind::StreamableHttp, remote).expect("valid transport");
    ServerConfig::new(name(server), transport)
}

async fn store_for_alice(harness: &Harness, config: ServerConfig) {
    let alice = UserId::new("alice").expect("valid user");
    let record = UserServerRecord::new(alice, config, &DefaultClock);
    harness.repository.create(&record).await.expect("stored");
}

fn sent_header(harness: &Harness, server: &str, header: &str) -> Option<String> {
    harness
        .connector
        .last_config(&name(server))
        .expect("connector readable")
        .expect("connection attempted")
        .transport()
        .remote_config()
        .expect("remote transport")
        .headers()
        .get(header)
        .cloned()
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn user_servers_cannot_read_the_process_environment() {
    let harness = harness(&[]);
    harness.script("files", tools(&["read"]));
    store_for_alice(
        &harness,
        streamable("files", &[("X-Forwarded", "${PATH}|{{USER_ID}}")]),
    )
    .await;

    let report = harness.controller.initialize().await.expect("initialize");

    assert_eq!(report.online(), 1);
    assert_eq!(
        sent_header(&harness, "files", "X-Forwarded").as_deref(),
        Some("${PATH}|alice")
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn declared_custom_variables_come_from_the_user_store() {
    let mut broker = MockAuthorizationBroker::new();
    broker
        .expect_user_variables()
        .withf(|user, server| user == "alice" && server == "files")
        .returning(|_, _| {
            Ok(BTreeMap::from([
                (String::from("API_KEY"), String::from("k-1")),
                (String::from("OTHER"), String::from("leaked")),
            ]))
        });
    let harness = harness_with(&[], McpSettings::default(), broker);
    harness.script("files", tools(&["read"]));
    let config = streamable(
        "files",
        &[
            ("Authorization", "Bearer {{API_KEY}}"),
            ("X-Other", "{{OTHER}}"),
        ],
    )
    .with_custom_user_var(
        "API_KEY",
        CustomUserVar {
            title: String::from("API key"),
            description: None,
        },
    );
    store_for_alice(&harness, config).await;

    harness.controller.initialize().await.expect("initialize");

    assert_eq!(
        sent_header(&harness, "files", "Authorization").as_deref(),
        Some("Bearer k-1")
    );
    assert_eq!(
        sent_header(&harness, "files", "X-Other").as_deref(),
        Some("{{OTHER}}")
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn servers_without_custom_variables_never_ask_the_store() {
    let mut broker = MockAuthorizationBroker::new();
    broker.expect_user_variables().never();
    let harness = harness_with(&[], McpSettings::default(), broker);
    harness.script("files", tools(&["read"]));
    store_for_alice(
        &harness,
        streamable("files", &[("Authorization", "Bearer {{API_KEY}}")]),
    )
    .await;

    harness.controller.initialize().await.expect("initialize");

    assert_eq!(
        sent_header(&harness, "files", "Authorization").as_deref(),
        Some("Bearer {{API_KEY}}")
    );
}
