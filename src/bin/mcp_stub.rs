//! Minimal MCP server over stdio, used by the integration tests.
//!
//! Reads newline-delimited JSON-RPC from stdin and answers `initialize`,
//! `tools/list` and `tools/call`. The single `echo` tool returns its
//! arguments. The process exits when stdin closes.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const METHOD_NOT_FOUND: i64 = -32_601;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), BoxError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.next_line().await? {
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        let Some(reply) = answer(&message) else {
            continue;
        };
        let mut payload = serde_json::to_vec(&reply)?;
        payload.push(b'\n');
        stdout.write_all(&payload).await?;
        stdout.flush().await?;
    }
    Ok(())
}

/// Builds the reply for one message; notifications get none.
fn answer(message: &Value) -> Option<Value> {
    let id = message.get("id")?.clone();
    let method = message.get("method").and_then(Value::as_str)?;
    let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
    let outcome = match method {
        "initialize" => Ok(json!({
            "protocolVersion": params
                .get("protocolVersion")
                .cloned()
                .unwrap_or_else(|| json!("2025-06-18")),
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mcp-stub", "version": env!("CARGO_PKG_VERSION") },
            "instructions": "Echo server for tests.",
        })),
        "tools/list" => Ok(json!({
            "tools": [{
                "name": "echo",
                "description": "Returns its arguments",
                "inputSchema": { "type": "object" },
            }],
        })),
        "tools/call" => {
            let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
            Ok(json!({
                "content": [{ "type": "text", "text": arguments.to_string() }],
                "structuredContent": arguments,
            }))
        }
        other => Err(json!({
            "code": METHOD_NOT_FOUND,
            "message": format!("method not found: {other}"),
        })),
    };
    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}
