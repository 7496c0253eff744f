//! Scripted in-memory connector for lifecycle tests and local wiring.
//!
//! No process is spawned and no socket is opened. Each server name is bound
//! to a [`ServerScript`] describing how connection attempts behave, which
//! lets callers exercise handshake failures, OAuth prompts, slow servers and
//! tool changes deterministically.

use crate::tool_registry::{
    domain::{ServerConfig, ServerName},
    ports::{
        ConnectRequest, McpConnection, McpConnector, RemoteTool, ToolCallResult, TransportError,
        TransportResult,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Behaviour of one scripted server.
#[derive(Debug, Clone, Default)]
pub struct ServerScript {
    tools: Vec<RemoteTool>,
    instructions: Option<String>,
    connect_error: Option<String>,
    list_error: Option<String>,
    disconnect_error: Option<String>,
    requires_oauth: bool,
    connect_delay: Option<Duration>,
}

impl ServerScript {
    /// Creates a script for a healthy server with no tools.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Announces `tools` from `tools/list`.
    #[must_use]
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = RemoteTool>) -> Self {
        self.tools = tools.into_iter().collect();
        self
    }

    /// Announces instructions during the handshake.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Fails every handshake with `reason`.
    #[must_use]
    pub fn failing_connect(mut self, reason: impl Into<String>) -> Self {
        self.connect_error = Some(reason.into());
        self
    }

    /// Fails `tools/list` with `reason`.
    #[must_use]
    pub fn failing_list(mut self, reason: impl Into<String>) -> Self {
        self.list_error = Some(reason.into());
        self
    }

    /// Fails teardown with `reason`.
    #[must_use]
    pub fn failing_disconnect(mut self, reason: impl Into<String>) -> Self {
        self.disconnect_error = Some(reason.into());
        self
    }

    /// Demands a bearer token before accepting the handshake.
    #[must_use]
    pub const fn requiring_oauth(mut self) -> Self {
        self.requires_oauth = true;
        self
    }

    /// Delays the handshake by `delay`.
    #[must_use]
    pub const fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }
}

/// Builds a [`RemoteTool`] with an empty object schema.
#[must_use]
pub fn remote_tool(name: impl Into<String>, description: impl Into<String>) -> RemoteTool {
    RemoteTool {
        name: name.into(),
        description: Some(description.into()),
        input_schema: json!({ "type": "object" }),
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    scripts: HashMap<ServerName, ServerScript>,
    connect_attempts: HashMap<ServerName, usize>,
    access_tokens: HashMap<ServerName, Option<String>>,
    configs: HashMap<ServerName, ServerConfig>,
}

/// Connector whose servers follow in-memory scripts.
///
/// Servers without a script fail their handshake.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<RwLock<ScriptState>>,
    live: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    /// Creates a connector with no scripted servers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs or replaces the script for `name`.
    ///
    /// Open connections pick up tool changes on their next `tools/list`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] when the lock is poisoned.
    pub fn script(&self, name: &ServerName, script: ServerScript) -> TransportResult<()> {
        let mut state = self.state.write().map_err(lock_error)?;
        state.scripts.insert(name.clone(), script);
        Ok(())
    }

    /// Returns how many connections are open.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Returns how many handshakes were attempted for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] when the lock is poisoned.
    pub fn connect_attempts(&self, name: &ServerName) -> TransportResult<usize> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.connect_attempts.get(name).copied().unwrap_or_default())
    }

    /// Returns the bearer token presented by the latest attempt for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] when the lock is poisoned.
    pub fn last_access_token(&self, name: &ServerName) -> TransportResult<Option<String>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.access_tokens.get(name).cloned().flatten())
    }

    /// Returns the resolved configuration of the latest attempt for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Runtime`] when the lock is poisoned.
    pub fn last_config(&self, name: &ServerName) -> TransportResult<Option<ServerConfig>> {
        let state = self.state.read().map_err(lock_error)?;
        Ok(state.configs.get(name).cloned())
    }

    fn record_attempt(&self, request: &ConnectRequest) -> TransportResult<Option<ServerScript>> {
        let name = request.config.name();
        let mut state = self.state.write().map_err(lock_error)?;
        *state.connect_attempts.entry(name.clone()).or_default() += 1;
        state
            .access_tokens
            .insert(name.clone(), request.access_token.clone());
        state.configs.insert(name.clone(), request.config.clone());
        Ok(state.scripts.get(name).cloned())
    }
}

fn lock_error(err: impl ToString) -> TransportError {
    TransportError::runtime(std::io::Error::other(err.to_string()))
}

#[async_trait]
impl McpConnector for ScriptedConnector {
    async fn connect(&self, request: &ConnectRequest) -> TransportResult<Arc<dyn McpConnection>> {
        let Some(script) = self.record_attempt(request)? else {
            return Err(TransportError::Handshake(format!(
                "no scripted server named {}",
                request.config.name()
            )));
        };

        if let Some(delay) = script.connect_delay {
            if delay >= request.init_timeout {
                tokio::time::sleep(request.init_timeout).await;
                return Err(TransportError::Timeout(request.init_timeout));
            }
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = script.connect_error {
            return Err(TransportError::Handshake(reason));
        }
        if script.requires_oauth && request.access_token.is_none() {
            return Err(TransportError::OAuthRequired);
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedConnection {
            name: request.config.name().clone(),
            state: Arc::clone(&self.state),
            live: Arc::clone(&self.live),
            instructions: script.instructions,
            connected: AtomicBool::new(true),
        }))
    }
}

/// Connection opened by [`ScriptedConnector`].
#[derive(Debug)]
struct ScriptedConnection {
    name: ServerName,
    state: Arc<RwLock<ScriptState>>,
    live: Arc<AtomicUsize>,
    instructions: Option<String>,
    connected: AtomicBool,
}

impl ScriptedConnection {
    fn current_script(&self) -> TransportResult<ServerScript> {
        if !self.is_connected() {
            return Err(TransportError::Closed);
        }
        let state = self.state.read().map_err(lock_error)?;
        state
            .scripts
            .get(&self.name)
            .cloned()
            .ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl McpConnection for ScriptedConnection {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn server_instructions(&self) -> Option<String> {
        self.instructions.clone()
    }

    async fn list_tools(&self) -> TransportResult<Vec<RemoteTool>> {
        let script = self.current_script()?;
        match script.list_error {
            Some(reason) => Err(TransportError::Request(reason)),
            None => Ok(script.tools),
        }
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> TransportResult<ToolCallResult> {
        let script = self.current_script()?;
        if !script.tools.iter().any(|tool| tool.name == name) {
            return Err(TransportError::Rpc {
                code: -32602,
                message: format!("unknown tool: {name}"),
            });
        }
        Ok(ToolCallResult {
            content: vec![json!({ "type": "text", "text": arguments.to_string() })],
            structured_content: Some(arguments),
            is_error: false,
        })
    }

    async fn disconnect(&self) -> TransportResult<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.live.fetch_sub(1, Ordering::SeqCst);

        let state = self.state.read().map_err(lock_error)?;
        match state
            .scripts
            .get(&self.name)
            .and_then(|script| script.disconnect_error.clone())
        {
            Some(reason) => Err(TransportError::Request(reason)),
            None => Ok(()),
        }
    }
}
