//! Network and process transports speaking MCP over JSON-RPC.
//!
//! [`JsonRpcConnector`] opens one of four channels according to the server's
//! transport configuration, performs the `initialize` handshake and wraps the
//! result in a connection that lists and calls tools. Opening plus the
//! handshake is bounded by the request's `init_timeout`; every later request
//! is bounded by its `request_timeout`.

mod jsonrpc;
mod sse;
mod sse_parser;
mod stdio;
mod streamable_http;
mod websocket;

use crate::tool_registry::{
    domain::{McpTransport, ServerKey},
    ports::{
        ConnectRequest, McpConnection, McpConnector, RemoteTool, ToolCallResult, TransportError,
        TransportResult,
    },
};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use sse::SseChannel;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use stdio::StdioChannel;
use streamable_http::StreamableHttpChannel;
use tracing::{debug, info, warn};
use websocket::WebSocketChannel;

/// Connector for every supported MCP transport.
#[derive(Debug, Clone, Default)]
pub struct JsonRpcConnector {
    http: reqwest::Client,
}

impl JsonRpcConnector {
    /// Creates a connector with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a connector sharing an existing HTTP client.
    #[must_use]
    pub const fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn open(&self, request: &ConnectRequest) -> TransportResult<ClientConnection> {
        let channel = self
            .open_channel(request)
            .await
            .map_err(jsonrpc::handshake_error)?;
        match handshake(&channel, request.init_timeout).await {
            Ok(instructions) => Ok(ClientConnection {
                key: request.key.clone(),
                channel,
                instructions,
                request_timeout: request.request_timeout,
                max_tool_pages: request.max_tool_pages,
            }),
            Err(err) => {
                if let Err(close_err) = channel.close().await {
                    debug!(
                        server = %request.key,
                        error = %close_err,
                        "failed to close channel after handshake failure"
                    );
                }
                Err(jsonrpc::handshake_error(err))
            }
        }
    }

    async fn open_channel(&self, request: &ConnectRequest) -> TransportResult<Channel> {
        let key = &request.key;
        match request.config.transport() {
            McpTransport::Stdio(stdio) => {
                StdioChannel::spawn(key, stdio, request.shutdown_grace).map(Channel::Stdio)
            }
            McpTransport::WebSocket(remote) => {
                let headers = header_pairs(remote.headers(), request.access_token.as_deref());
                WebSocketChannel::connect(key, remote.url(), &headers)
                    .await
                    .map(Channel::WebSocket)
            }
            McpTransport::Sse(remote) => {
                let headers = header_pairs(remote.headers(), request.access_token.as_deref());
                SseChannel::connect(self.http.clone(), key, remote.url(), &headers)
                    .await
                    .map(Channel::Sse)
            }
            McpTransport::StreamableHttp(remote) => {
                let headers = header_pairs(remote.headers(), request.access_token.as_deref());
                StreamableHttpChannel::new(self.http.clone(), key, remote.url(), &headers)
                    .map(Channel::StreamableHttp)
            }
        }
    }
}

#[async_trait]
impl McpConnector for JsonRpcConnector {
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<Arc<dyn McpConnection>> {
        debug!(
            server = %request.key,
            transport = %request.config.transport().kind(),
            "connecting to MCP server"
        );
        let connection = tokio::time::timeout(request.init_timeout, self.open(request))
            .await
            .map_err(|_| TransportError::Timeout(request.init_timeout))??;
        info!(server = %request.key, "MCP server connected");
        Ok(Arc::new(connection))
    }
}

async fn handshake(channel: &Channel, timeout: Duration) -> TransportResult<Option<String>> {
    let result = channel
        .request("initialize", jsonrpc::initialize_params(), timeout)
        .await?;
    if result.get("protocolVersion").is_none() {
        return Err(TransportError::Protocol(String::from(
            "initialize result has no protocolVersion",
        )));
    }
    channel
        .notify("notifications/initialized", json!({}))
        .await?;
    Ok(result
        .get("instructions")
        .and_then(Value::as_str)
        .map(str::to_owned))
}

fn header_pairs(
    configured: &BTreeMap<String, String>,
    access_token: Option<&str>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = configured
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    if let Some(token) = access_token {
        headers.push((AUTHORIZATION.as_str().to_owned(), format!("Bearer {token}")));
    }
    headers
}

fn http_headers(pairs: &[(String, String)]) -> TransportResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|err| TransportError::Handshake(format!("invalid header {name}: {err}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|err| TransportError::Handshake(format!("invalid header {name}: {err}")))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

/// The four wire channels.
#[derive(Debug)]
enum Channel {
    Stdio(StdioChannel),
    WebSocket(WebSocketChannel),
    Sse(SseChannel),
    StreamableHttp(StreamableHttpChannel),
}

impl Channel {
    fn is_open(&self) -> bool {
        match self {
            Self::Stdio(channel) => channel.is_open(),
            Self::WebSocket(channel) => channel.is_open(),
            Self::Sse(channel) => channel.is_open(),
            Self::StreamableHttp(channel) => channel.is_open(),
        }
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> TransportResult<Value> {
        match self {
            Self::Stdio(channel) => channel.request(method, params, timeout).await,
            Self::WebSocket(channel) => channel.request(method, params, timeout).await,
            Self::Sse(channel) => channel.request(method, params, timeout).await,
            Self::StreamableHttp(channel) => channel.request(method, params, timeout).await,
        }
    }

    async fn notify(&self, method: &str, params: Value) -> TransportResult<()> {
        match self {
            Self::Stdio(channel) => channel.notify(method, params).await,
            Self::WebSocket(channel) => channel.notify(method, params).await,
            Self::Sse(channel) => channel.notify(method, params).await,
            Self::StreamableHttp(channel) => channel.notify(method, params).await,
        }
    }

    async fn close(&self) -> TransportResult<()> {
        match self {
            Self::Stdio(channel) => channel.close().await,
            Self::WebSocket(channel) => channel.close().await,
            Self::Sse(channel) => channel.close().await,
            Self::StreamableHttp(channel) => channel.close().await,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolsPage {
    #[serde(default)]
    tools: Vec<RemoteTool>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// An initialized connection over one channel.
#[derive(Debug)]
struct ClientConnection {
    key: ServerKey,
    channel: Channel,
    instructions: Option<String>,
    request_timeout: Duration,
    max_tool_pages: usize,
}

#[async_trait]
impl McpConnection for ClientConnection {
    fn is_connected(&self) -> bool {
        self.channel.is_open()
    }

    fn server_instructions(&self) -> Option<String> {
        self.instructions.clone()
    }

    async fn list_tools(&self) -> TransportResult<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..self.max_tool_pages {
            let params = cursor
                .take()
                .map_or_else(|| json!({}), |value| json!({ "cursor": value }));
            let result = self
                .channel
                .request("tools/list", params, self.request_timeout)
                .await?;
            let page: ToolsPage = serde_json::from_value(result)
                .map_err(|err| TransportError::Protocol(err.to_string()))?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        warn!(
            server = %self.key,
            pages = self.max_tool_pages,
            "tools/list pagination truncated"
        );
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> TransportResult<ToolCallResult> {
        let result = self
            .channel
            .request(
                "tools/call",
                json!({ "name": name, "arguments": arguments }),
                self.request_timeout,
            )
            .await?;
        serde_json::from_value(result).map_err(|err| TransportError::Protocol(err.to_string()))
    }

    async fn disconnect(&self) -> TransportResult<()> {
        self.channel.close().await?;
        info!(server = %self.key, "MCP server disconnected");
        Ok(())
    }
}
