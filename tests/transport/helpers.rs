//! Shared builders for transport integration tests.

use gropius::tool_registry::{
    domain::{
        McpTransport, RemoteTransportConfig, ServerConfig, ServerKey, ServerName, TransportKind,
    },
    ports::ConnectRequest,
};
use serde_json::{Value, json};
use std::time::Duration;

/// Builds a connect request with short test timeouts.
pub fn connect_request(name: &str, transport: McpTransport) -> ConnectRequest {
    let server = ServerName::new(name).expect("valid server name");
    ConnectRequest {
        key: ServerKey::global(server.clone()),
        config: ServerConfig::new(server, transport),
        access_token: None,
        request_timeout: Duration::from_secs(5),
        init_timeout: Duration::from_secs(10),
        shutdown_grace: Duration::from_millis(500),
        max_tool_pages: 5,
    }
}

/// Builds a network transport of `kind` pointing at `url`.
pub fn remote(kind: TransportKind, url: &str) -> McpTransport {
    McpTransport::remote(kind, RemoteTransportConfig::new(url)).expect("valid remote transport")
}

/// Wraps `result` in a JSON-RPC response for request `id`.
pub fn rpc_result(id: u64, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// A minimal `initialize` result.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": { "tools": {} },
        "serverInfo": { "name": "mock", "version": "1.0.0" },
    })
}
