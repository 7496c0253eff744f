//! Child-process transport against the bundled `mcp_stub` server.

use crate::transport::helpers::connect_request;
use gropius::tool_registry::{
    adapters::JsonRpcConnector,
    domain::McpTransport,
    ports::{McpConnector, TransportError},
};
use rstest::rstest;
use serde_json::json;

const STUB: &str = env!("CARGO_BIN_EXE_mcp_stub");

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stub_server_lists_and_echoes_tools() {
    let connector = JsonRpcConnector::new();
    let request = connect_request("stub", McpTransport::stdio(STUB).expect("valid transport"));

    let connection = connector.connect(&request).await.expect("handshake");
    let tools = connection.list_tools().await.expect("tools/list");
    let called = connection
        .call_tool("echo", json!({ "text": "hello" }))
        .await
        .expect("tools/call");

    assert!(connection.is_connected());
    assert_eq!(
        connection.server_instructions().as_deref(),
        Some("Echo server for tests.")
    );
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["echo"]);
    assert_eq!(called.structured_content, Some(json!({ "text": "hello" })));
    assert!(!called.is_error);

    connection.disconnect().await.expect("disconnect");
    assert!(!connection.is_connected());
    connection.disconnect().await.expect("second disconnect");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn closed_connections_refuse_requests() {
    let connector = JsonRpcConnector::new();
    let request = connect_request("stub", McpTransport::stdio(STUB).expect("valid transport"));
    let connection = connector.connect(&request).await.expect("handshake");

    connection.disconnect().await.expect("disconnect");
    let after_close = connection.list_tools().await;

    assert!(matches!(after_close, Err(TransportError::Closed)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_commands_fail_to_spawn() {
    let connector = JsonRpcConnector::new();
    let request = connect_request(
        "ghost",
        McpTransport::stdio("gropius-no-such-binary").expect("valid transport"),
    );

    let result = connector.connect(&request).await;

    assert!(matches!(
        result,
        Err(TransportError::Spawn { ref command, .. }) if command == "gropius-no-such-binary"
    ));
}
