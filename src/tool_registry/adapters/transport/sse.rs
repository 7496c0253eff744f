//! Legacy HTTP+SSE channel.
//!
//! A long-lived `GET` stream first announces the POST endpoint in an
//! `endpoint` event. Requests are POSTed there and their responses come back
//! on the stream as `message` events.

use super::http_headers;
use super::jsonrpc::{self, PendingRequests};
use super::sse_parser::SseParser;
use crate::tool_registry::{
    domain::ServerKey,
    ports::{TransportError, TransportResult},
};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub(super) struct SseChannel {
    key: ServerKey,
    client: Client,
    endpoint: Url,
    headers: HeaderMap,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

impl SseChannel {
    /// Opens the event stream and waits for the endpoint announcement.
    pub(super) async fn connect(
        client: Client,
        key: &ServerKey,
        url: &str,
        headers: &[(String, String)],
    ) -> TransportResult<Self> {
        let base = Url::parse(url).map_err(|err| TransportError::Handshake(err.to_string()))?;
        let header_map = http_headers(headers)?;

        debug!(server = %key, url, "opening MCP SSE stream");
        let response = client
            .get(base.clone())
            .headers(header_map.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await
            .map_err(|err| TransportError::Handshake(err.to_string()))?;
        check_status(&response)?;

        let pending = Arc::new(PendingRequests::new());
        let open = Arc::new(AtomicBool::new(true));
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_stream(
            key.clone(),
            response,
            endpoint_tx,
            Arc::clone(&pending),
            Arc::clone(&open),
        ));

        let Ok(announced) = endpoint_rx.await else {
            reader.abort();
            return Err(TransportError::Handshake(String::from(
                "event stream ended before announcing an endpoint",
            )));
        };
        let endpoint = base.join(&announced).map_err(|err| {
            reader.abort();
            TransportError::Handshake(format!("invalid endpoint {announced}: {err}"))
        })?;
        debug!(server = %key, %endpoint, "MCP SSE endpoint announced");

        Ok(Self {
            key: key.clone(),
            client,
            endpoint,
            headers: header_map,
            pending,
            open,
            reader,
        })
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
        let posted = tokio::time::timeout(
            timeout,
            self.post(&jsonrpc::request(id, method, params)),
        )
        .await
        .unwrap_or(Err(TransportError::Timeout(timeout)));
        if let Err(err) = posted {
            self.pending.cancel(id).await;
            return Err(err);
        }
        self.pending.await_response(id, receiver, timeout).await
    }

    pub(super) async fn notify(&self, method: &str, params: Value) -> TransportResult<()> {
        self.post(&jsonrpc::notification(method, params)).await
    }

    async fn post(&self, message: &Value) -> TransportResult<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(message)
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        check_status(&response)
    }

    pub(super) async fn close(&self) -> TransportResult<()> {
        self.open.store(false, Ordering::SeqCst);
        self.reader.abort();
        self.pending.fail_all().await;
        debug!(server = %self.key, "MCP SSE stream closed");
        Ok(())
    }
}

impl Drop for SseChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

fn check_status(response: &Response) -> TransportResult<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(TransportError::OAuthRequired),
        status if status.is_success() => Ok(()),
        status => Err(TransportError::Request(format!("HTTP {status}"))),
    }
}

async fn read_stream(
    key: ServerKey,
    response: Response,
    endpoint_tx: oneshot::Sender<String>,
    pending: Arc<PendingRequests>,
    open: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let bytes = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(server = %key, error = %err, "MCP SSE stream failed");
                break;
            }
        };
        for event in parser.push(&bytes) {
            match event.name.as_str() {
                "endpoint" => {
                    if let Some(sender) = endpoint_tx.take()
                        && sender.send(event.data).is_err()
                    {
                        debug!(server = %key, "endpoint announced after connect was abandoned");
                    }
                }
                "message" => {
                    let Ok(payload) = serde_json::from_str::<Value>(&event.data) else {
                        debug!(server = %key, "ignoring non-JSON SSE message");
                        continue;
                    };
                    // Server-initiated requests are not answered on this transport.
                    let unanswered = pending.dispatch(payload).await;
                    if !unanswered.is_empty() {
                        debug!(server = %key, count = unanswered.len(), "dropping server requests");
                    }
                }
                other => debug!(server = %key, event = other, "ignoring SSE event"),
            }
        }
    }
    open.store(false, Ordering::SeqCst);
    pending.fail_all().await;
    debug!(server = %key, "MCP SSE stream ended");
}
