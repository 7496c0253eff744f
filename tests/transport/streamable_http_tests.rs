//! Streamable HTTP transport against a mock MCP endpoint.

use crate::transport::helpers::{connect_request, initialize_result, remote, rpc_result};
use gropius::tool_registry::{
    adapters::JsonRpcConnector,
    domain::TransportKind,
    ports::{McpConnector, TransportError},
};
use rstest::rstest;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_handshake(server: &MockServer, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("mcp-session-id", session_id)
                .set_body_json(rpc_result(
                    0,
                    json!({
                        "protocolVersion": "2025-06-18",
                        "capabilities": {},
                        "instructions": "Use search first.",
                    }),
                )),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", session_id))
        .and(body_partial_json(
            json!({ "method": "notifications/initialized" }),
        ))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(server)
        .await;
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn session_is_echoed_and_event_stream_answers_are_read() {
    let server = MockServer::start().await;
    mount_handshake(&server, "session-1").await;
    let tools_event = rpc_result(
        1,
        json!({ "tools": [{ "name": "search", "inputSchema": { "type": "object" } }] }),
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "session-1"))
        .and(header("MCP-Protocol-Version", "2025-06-18"))
        .and(body_partial_json(json!({ "method": "tools/list" })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("event: message\ndata: {tools_event}\n\n"),
            "text/event-stream",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/mcp"))
        .and(header("mcp-session-id", "session-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    let request = connect_request(
        "search",
        remote(
            TransportKind::StreamableHttp,
            &format!("{}/mcp", server.uri()),
        ),
    );

    let connection = JsonRpcConnector::new()
        .connect(&request)
        .await
        .expect("handshake");
    let tools = connection.list_tools().await.expect("tools/list");
    connection.disconnect().await.expect("disconnect");

    assert_eq!(
        connection.server_instructions().as_deref(),
        Some("Use search first.")
    );
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["search"]);
    assert!(!connection.is_connected());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn paginated_tool_lists_are_followed() {
    let server = MockServer::start().await;
    mount_handshake(&server, "session-2").await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "tools/list", "params": {} })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
            1,
            json!({ "tools": [{ "name": "first" }], "nextCursor": "page-2" }),
        )))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(
            json!({ "method": "tools/list", "params": { "cursor": "page-2" } }),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(
            2,
            json!({ "tools": [{ "name": "second" }] }),
        )))
        .with_priority(1)
        .mount(&server)
        .await;
    let request = connect_request(
        "paged",
        remote(
            TransportKind::StreamableHttp,
            &format!("{}/mcp", server.uri()),
        ),
    );

    let connection = JsonRpcConnector::new()
        .connect(&request)
        .await
        .expect("handshake");
    let tools = connection.list_tools().await.expect("tools/list");

    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn bearer_tokens_are_sent_with_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(json!({ "method": "initialize" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(rpc_result(0, initialize_result())))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_partial_json(
            json!({ "method": "notifications/initialized" }),
        ))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;
    let mut request = connect_request(
        "files",
        remote(TransportKind::StreamableHttp, &server.uri()),
    );
    request.access_token = Some(String::from("secret-token"));

    let connection = JsonRpcConnector::new().connect(&request).await;

    assert!(connection.is_ok());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_endpoints_ask_for_oauth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    let request = connect_request(
        "files",
        remote(TransportKind::StreamableHttp, &server.uri()),
    );

    let result = JsonRpcConnector::new().connect(&request).await;

    assert!(matches!(result, Err(TransportError::OAuthRequired)));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rpc_errors_during_initialize_fail_the_handshake() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": 0,
            "error": { "code": -32_602, "message": "unsupported protocol version" },
        })))
        .mount(&server)
        .await;
    let request = connect_request(
        "legacy",
        remote(TransportKind::StreamableHttp, &server.uri()),
    );

    let result = JsonRpcConnector::new().connect(&request).await;

    assert!(matches!(
        result,
        Err(TransportError::Handshake(ref message))
            if message.contains("unsupported protocol version")
    ));
}
