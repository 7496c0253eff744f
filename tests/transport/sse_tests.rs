//! Legacy HTTP+SSE stream negotiation.

use crate::transport::helpers::{connect_request, remote};
use gropius::tool_registry::{
    adapters::JsonRpcConnector,
    domain::TransportKind,
    ports::{McpConnector, TransportError},
};
use rstest::rstest;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn streams_without_an_endpoint_fail_the_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/sse"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(": keep-alive\n\n", "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let request = connect_request(
        "legacy",
        remote(TransportKind::Sse, &format!("{}/sse", server.uri())),
    );

    let result = JsonRpcConnector::new().connect(&request).await;

    assert!(matches!(
        result,
        Err(TransportError::Handshake(ref message)) if message.contains("endpoint")
    ));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_streams_ask_for_oauth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let request = connect_request(
        "legacy",
        remote(TransportKind::Sse, &format!("{}/sse", server.uri())),
    );

    let result = JsonRpcConnector::new().connect(&request).await;

    assert!(matches!(result, Err(TransportError::OAuthRequired)));
}
