//! Streamable HTTP channel.
//!
//! Every message is a `POST`; the answer is either a JSON body or a
//! short-lived event stream. The server may assign a session id during
//! `initialize`, which is echoed on later requests and released with a
//! `DELETE` on close.

use super::http_headers;
use super::jsonrpc;
use super::sse_parser::{SseParser, is_event_stream};
use crate::tool_registry::{
    domain::ServerKey,
    ports::{TransportError, TransportResult},
};
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_HEADER: &str = "MCP-Protocol-Version";

#[derive(Debug)]
pub(super) struct StreamableHttpChannel {
    key: ServerKey,
    client: Client,
    url: Url,
    headers: HeaderMap,
    session_id: RwLock<Option<String>>,
    next_id: AtomicU64,
    open: AtomicBool,
}

impl StreamableHttpChannel {
    pub(super) fn new(
        client: Client,
        key: &ServerKey,
        url: &str,
        headers: &[(String, String)],
    ) -> TransportResult<Self> {
        let parsed = Url::parse(url).map_err(|err| TransportError::Handshake(err.to_string()))?;
        Ok(Self {
            key: key.clone(),
            client,
            url: parsed,
            headers: http_headers(headers)?,
            session_id: RwLock::new(None),
            next_id: AtomicU64::new(0),
            open: AtomicBool::new(true),
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
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = jsonrpc::request(id, method, params);
        tokio::time::timeout(timeout, self.exchange(method, &message, id))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)))
    }

    async fn exchange(&self, method: &str, message: &Value, id: u64) -> TransportResult<Value> {
        let response = self
            .post(method, message)?
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        self.check_status(&response)?;
        self.remember_session(&response)?;

        if is_event_stream(response.headers()) {
            return read_event_stream(response, id).await;
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let payload: Value = serde_json::from_slice(&body)
            .map_err(|err| TransportError::Protocol(err.to_string()))?;
        jsonrpc::find_response(payload, id).unwrap_or_else(|| {
            Err(TransportError::Protocol(format!(
                "response body did not answer request {id}"
            )))
        })
    }

    pub(super) async fn notify(&self, method: &str, params: Value) -> TransportResult<()> {
        let response = self
            .post(method, &jsonrpc::notification(method, params))?
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        self.check_status(&response)
    }

    /// Releases the server session, if any.
    pub(super) async fn close(&self) -> TransportResult<()> {
        self.open.store(false, Ordering::SeqCst);
        let session = self
            .session_id
            .write()
            .map_err(|err| TransportError::runtime(std::io::Error::other(err.to_string())))?
            .take();
        let Some(session_id) = session else {
            return Ok(());
        };

        let outcome = self
            .client
            .delete(self.url.clone())
            .headers(self.headers.clone())
            .header(SESSION_HEADER, session_id)
            .send()
            .await;
        match outcome {
            Ok(response) => {
                debug!(server = %self.key, status = %response.status(), "MCP session released");
            }
            // Servers may not support explicit termination.
            Err(err) => debug!(server = %self.key, error = %err, "MCP session release failed"),
        }
        Ok(())
    }

    fn post(&self, method: &str, message: &Value) -> TransportResult<RequestBuilder> {
        let mut builder = self
            .client
            .post(self.url.clone())
            .headers(self.headers.clone())
            .header(
                ACCEPT,
                HeaderValue::from_static("application/json, text/event-stream"),
            )
            .json(message);
        if method != "initialize" {
            builder = builder.header(PROTOCOL_HEADER, jsonrpc::PROTOCOL_VERSION);
        }
        if let Some(session_id) = self.session_id()? {
            builder = builder.header(SESSION_HEADER, session_id);
        }
        Ok(builder)
    }

    fn session_id(&self) -> TransportResult<Option<String>> {
        let session = self
            .session_id
            .read()
            .map_err(|err| TransportError::runtime(std::io::Error::other(err.to_string())))?;
        Ok(session.clone())
    }

    fn remember_session(&self, response: &Response) -> TransportResult<()> {
        let Some(assigned) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        else {
            return Ok(());
        };
        let mut session = self
            .session_id
            .write()
            .map_err(|err| TransportError::runtime(std::io::Error::other(err.to_string())))?;
        *session = Some(assigned.to_owned());
        Ok(())
    }

    fn check_status(&self, response: &Response) -> TransportResult<()> {
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(TransportError::OAuthRequired),
            StatusCode::NOT_FOUND if self.session_id()?.is_some() => {
                debug!(server = %self.key, "MCP session expired");
                self.open.store(false, Ordering::SeqCst);
                Err(TransportError::Closed)
            }
            status if status.is_success() => Ok(()),
            status => Err(TransportError::Request(format!("HTTP {status}"))),
        }
    }
}

async fn read_event_stream(response: Response, id: u64) -> TransportResult<Value> {
    let mut parser = SseParser::new();
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|err| TransportError::Request(err.to_string()))?;
        for event in parser.push(&bytes) {
            if let Some(outcome) = event_response(&event.data, id) {
                return outcome;
            }
        }
    }
    parser
        .finish()
        .and_then(|event| event_response(&event.data, id))
        .unwrap_or_else(|| {
            Err(TransportError::Protocol(String::from(
                "event stream ended without a response",
            )))
        })
}

fn event_response(data: &str, id: u64) -> Option<TransportResult<Value>> {
    let payload = serde_json::from_str::<Value>(data).ok()?;
    jsonrpc::find_response(payload, id)
}
