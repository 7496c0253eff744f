//! Handshake deadlines against a peer that accepts but never answers.

use crate::transport::helpers::{connect_request, remote};
use gropius::tool_registry::{
    adapters::JsonRpcConnector,
    domain::TransportKind,
    ports::{McpConnector, TransportError},
};
use rstest::rstest;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

const INIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Binds a listener that holds every accepted socket open in silence.
async fn silent_peer() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
    let address = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    address
}

#[rstest]
#[case(TransportKind::StreamableHttp, "http")]
#[case(TransportKind::Sse, "http")]
#[case(TransportKind::WebSocket, "ws")]
#[tokio::test]
async fn silent_servers_fail_with_a_timeout_at_the_init_deadline(
    #[case] kind: TransportKind,
    #[case] scheme: &str,
) {
    let address = silent_peer().await;
    let url = format!("{scheme}://{address}/mcp");
    let mut request = connect_request("silent", remote(kind, &url));
    request.init_timeout = INIT_TIMEOUT;
    let connector = JsonRpcConnector::new();

    let started = Instant::now();
    let result = connector.connect(&request).await;
    let elapsed = started.elapsed();

    assert!(
        matches!(result, Err(TransportError::Timeout(limit)) if limit == INIT_TIMEOUT),
        "expected an init timeout for {kind}"
    );
    assert!(elapsed >= Duration::from_millis(450), "gave up after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "overran the deadline: {elapsed:?}");
}
