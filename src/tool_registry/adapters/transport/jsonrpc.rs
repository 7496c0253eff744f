//! JSON-RPC 2.0 framing and response routing shared by the MCP transports.

use crate::tool_registry::ports::{TransportError, TransportResult};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

/// MCP protocol revision announced during `initialize`.
pub(super) const PROTOCOL_VERSION: &str = "2025-06-18";

/// Client name announced during `initialize`.
pub(super) const CLIENT_NAME: &str = "gropius";

const METHOD_NOT_FOUND: i64 = -32601;

pub(super) fn request(id: u64, method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
}

pub(super) fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Builds the `initialize` parameters.
pub(super) fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": { "name": CLIENT_NAME, "version": env!("CARGO_PKG_VERSION") },
    })
}

/// Answers a server-initiated request. Only `ping` is supported.
fn reply_to(id: Value, method: &str) -> Value {
    if method == "ping" {
        return json!({ "jsonrpc": "2.0", "id": id, "result": {} });
    }
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": METHOD_NOT_FOUND, "message": format!("method not found: {method}") },
    })
}

/// Converts a response object into its result or its JSON-RPC error.
pub(super) fn response_outcome(message: &Map<String, Value>) -> TransportResult<Value> {
    if let Some(error) = message.get("error") {
        return Err(TransportError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_owned(),
        });
    }
    Ok(message.get("result").cloned().unwrap_or(Value::Null))
}

/// Extracts the response matching `id` from a decoded payload.
///
/// Used by request/response transports where the body carries the answer.
pub(super) fn find_response(payload: Value, id: u64) -> Option<TransportResult<Value>> {
    messages(payload).into_iter().find_map(|message| {
        let is_match = message.get("id").and_then(Value::as_u64) == Some(id)
            && !message.contains_key("method");
        is_match.then(|| response_outcome(&message))
    })
}

fn messages(payload: Value) -> Vec<Map<String, Value>> {
    match payload {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(message) => Some(message),
                _ => None,
            })
            .collect(),
        Value::Object(message) => vec![message],
        _ => Vec::new(),
    }
}

/// Maps handshake-time failures into [`TransportError::Handshake`].
///
/// Timeouts, OAuth prompts and spawn failures keep their own variants.
pub(super) fn handshake_error(err: TransportError) -> TransportError {
    match err {
        TransportError::Timeout(_)
        | TransportError::OAuthRequired
        | TransportError::Spawn { .. }
        | TransportError::Handshake(_) => err,
        other => TransportError::Handshake(other.to_string()),
    }
}

type Waiter = oneshot::Sender<TransportResult<Value>>;

/// Correlates outgoing request ids with their eventual responses.
#[derive(Debug, Default)]
pub(super) struct PendingRequests {
    next_id: AtomicU64,
    waiters: Mutex<HashMap<u64, Waiter>>,
}

impl PendingRequests {
    pub(super) fn new() -> Self {
        Self::default()
    }

    /// Allocates an id and a receiver for its response.
    pub(super) async fn register(&self) -> (u64, oneshot::Receiver<TransportResult<Value>>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.waiters.lock().await.insert(id, sender);
        (id, receiver)
    }

    pub(super) async fn cancel(&self, id: u64) {
        self.waiters.lock().await.remove(&id);
    }

    /// Drops every waiter so in-flight requests observe a closed channel.
    pub(super) async fn fail_all(&self) {
        self.waiters.lock().await.clear();
    }

    /// Routes responses to their waiters and returns replies owed to the
    /// server for any requests it sent.
    pub(super) async fn dispatch(&self, payload: Value) -> Vec<Value> {
        let mut replies = Vec::new();
        for message in messages(payload) {
            let method = message.get("method").and_then(Value::as_str);
            match (message.get("id"), method) {
                (Some(id), Some(name)) => replies.push(reply_to(id.clone(), name)),
                (None, Some(name)) => debug!(method = name, "ignoring MCP notification"),
                (Some(raw_id), None) => {
                    let Some(id) = raw_id.as_u64() else {
                        debug!(id = %raw_id, "ignoring response with foreign id");
                        continue;
                    };
                    self.resolve(id, response_outcome(&message)).await;
                }
                (None, None) => debug!("ignoring malformed JSON-RPC message"),
            }
        }
        replies
    }

    async fn resolve(&self, id: u64, outcome: TransportResult<Value>) {
        let Some(waiter) = self.waiters.lock().await.remove(&id) else {
            debug!(id, "response for unknown or abandoned request");
            return;
        };
        if waiter.send(outcome).is_err() {
            debug!(id, "request was abandoned before its response arrived");
        }
    }

    /// Waits for the response to `id`, bounded by `timeout`.
    pub(super) async fn await_response(
        &self,
        id: u64,
        receiver: oneshot::Receiver<TransportResult<Value>>,
        timeout: Duration,
    ) -> TransportResult<Value> {
        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => {
                self.cancel(id).await;
                Err(TransportError::Timeout(timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[tokio::test]
    async fn responses_reach_their_waiters() {
        let pending = PendingRequests::new();
        let (id, receiver) = pending.register().await;

        let replies = pending
            .dispatch(json!({ "jsonrpc": "2.0", "id": id, "result": { "ok": true } }))
            .await;
        let outcome = pending
            .await_response(id, receiver, Duration::from_secs(1))
            .await
            .expect("response");

        assert!(replies.is_empty());
        assert_eq!(outcome, json!({ "ok": true }));
    }

    #[rstest]
    #[tokio::test]
    async fn error_responses_become_rpc_errors() {
        let pending = PendingRequests::new();
        let (id, receiver) = pending.register().await;

        pending
            .dispatch(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32602, "message": "bad params" }
            }))
            .await;
        let outcome = pending
            .await_response(id, receiver, Duration::from_secs(1))
            .await;

        assert!(matches!(
            outcome,
            Err(TransportError::Rpc { code: -32602, .. })
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn pings_are_answered_and_other_requests_rejected() {
        let pending = PendingRequests::new();

        let replies = pending
            .dispatch(json!([
                { "jsonrpc": "2.0", "id": "a", "method": "ping" },
                { "jsonrpc": "2.0", "id": "b", "method": "sampling/createMessage" }
            ]))
            .await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies.first().and_then(|reply| reply.get("result")), Some(&json!({})));
        assert!(replies.get(1).and_then(|reply| reply.get("error")).is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn unanswered_requests_time_out() {
        let pending = PendingRequests::new();
        let (id, receiver) = pending.register().await;

        let outcome = pending
            .await_response(id, receiver, Duration::from_millis(10))
            .await;

        assert!(matches!(outcome, Err(TransportError::Timeout(_))));
    }

    #[rstest]
    #[tokio::test]
    async fn failing_all_closes_waiters() {
        let pending = PendingRequests::new();
        let (id, receiver) = pending.register().await;

        pending.fail_all().await;
        let outcome = pending
            .await_response(id, receiver, Duration::from_secs(1))
            .await;

        assert!(matches!(outcome, Err(TransportError::Closed)));
    }

    #[rstest]
    fn find_response_picks_the_matching_id() {
        let payload = json!([
            { "jsonrpc": "2.0", "method": "notifications/progress" },
            { "jsonrpc": "2.0", "id": 7, "result": { "tools": [] } }
        ]);

        let outcome = find_response(payload, 7).expect("matching response");

        assert_eq!(outcome.expect("ok"), json!({ "tools": [] }));
    }
}
