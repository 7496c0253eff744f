//! WebSocket channel carrying JSON-RPC in text frames.

use super::jsonrpc::{self, PendingRequests};
use crate::tool_registry::{
    domain::ServerKey,
    ports::{TransportError, TransportResult},
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedSink = Arc<Mutex<Option<SplitSink<WsStream, Message>>>>;

const SUBPROTOCOL: &str = "mcp";

#[derive(Debug)]
pub(super) struct WebSocketChannel {
    key: ServerKey,
    sink: SharedSink,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
}

impl WebSocketChannel {
    /// Opens the socket, offering the `mcp` subprotocol.
    pub(super) async fn connect(
        key: &ServerKey,
        url: &str,
        headers: &[(String, String)],
    ) -> TransportResult<Self> {
        let mut request = url
            .into_client_request()
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        let request_headers = request.headers_mut();
        request_headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| TransportError::Handshake(format!("invalid header {name}: {err}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|err| TransportError::Handshake(format!("invalid header {name}: {err}")))?;
            request_headers.insert(header_name, header_value);
        }

        debug!(server = %key, url, "opening MCP websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(connect_error)?;
        let (sink, source) = stream.split();

        let channel = Self {
            key: key.clone(),
            sink: Arc::new(Mutex::new(Some(sink))),
            pending: Arc::new(PendingRequests::new()),
            open: Arc::new(AtomicBool::new(true)),
        };
        channel.spawn_reader(source);
        Ok(channel)
    }

    fn spawn_reader(&self, mut source: SplitStream<WsStream>) {
        let key = self.key.clone();
        let sink = Arc::clone(&self.sink);
        let pending = Arc::clone(&self.pending);
        let open = Arc::clone(&self.open);
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        let Ok(payload) = serde_json::from_str::<Value>(text.as_str()) else {
                            debug!(server = %key, "ignoring non-JSON websocket frame");
                            continue;
                        };
                        for reply in pending.dispatch(payload).await {
                            if let Err(err) = send_message(&sink, &reply).await {
                                debug!(
                                    server = %key,
                                    error = %err,
                                    "failed to answer server request"
                                );
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        debug!(server = %key, error = %err, "MCP websocket read failed");
                        break;
                    }
                }
            }
            open.store(false, Ordering::SeqCst);
            pending.fail_all().await;
            debug!(server = %key, "MCP websocket closed");
        });
    }

    pub(super) fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub(super) async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> TransportResult<Value> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        let (id, receiver) = self.pending.register().await;
        if let Err(err) = send_message(&self.sink, &jsonrpc::request(id, method, params)).await {
            self.pending.cancel(id).await;
            return Err(err);
        }
        self.pending.await_response(id, receiver, timeout).await
    }

    pub(super) async fn notify(&self, method: &str, params: Value) -> TransportResult<()> {
        send_message(&self.sink, &jsonrpc::notification(method, params)).await
    }

    /// Sends a close frame and releases the socket.
    pub(super) async fn close(&self) -> TransportResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.pending.fail_all().await;
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        sink.close()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))
    }
}

fn connect_error(err: WsError) -> TransportError {
    match err {
        WsError::Http(response) if response.status() == StatusCode::UNAUTHORIZED => {
            TransportError::OAuthRequired
        }
        other => TransportError::Handshake(other.to_string()),
    }
}

async fn send_message(sink: &SharedSink, message: &Value) -> TransportResult<()> {
    let payload =
        serde_json::to_string(message).map_err(|err| TransportError::Protocol(err.to_string()))?;
    let mut guard = sink.lock().await;
    let writer = guard.as_mut().ok_or(TransportError::Closed)?;
    writer
        .send(Message::Text(payload.into()))
        .await
        .map_err(|err| TransportError::Request(err.to_string()))
}
