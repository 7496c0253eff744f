//! Connection lifecycle for every configured MCP server.
//!
//! The controller owns the runtime state of each server, the connection
//! registry and the tool catalog, and keeps the three consistent: a server
//! is `online` exactly when it has a registered connection and its enabled
//! tools are published. Operations on one server are serialized through a
//! per-key async lock; operations on different servers run concurrently.
//! Teardown holds every key lock at once.

use super::{
    catalog::{CatalogView, ToolCatalog},
    discovery::ToolDiscovery,
    error::{ToolRegistryError, ToolRegistryResult},
    merge::{ConfigurationMerger, MergeScope},
    registry::{ServerRegistry, SharedConnection},
};
use crate::oauth::domain::OAuthConfig;
use crate::tool_registry::{
    domain::{
        ConfigOrigin, McpSettings, MergedConfig, MergedServer, PendingOAuth, PlaceholderContext,
        ServerConfig, ServerInstructions, ServerKey, ServerName, ServerRuntimeState, ServerStatus,
        ToolDescriptor, UserId, qualified_tool_name,
    },
    ports::{
        AuthorizationBroker, CachedCatalog, ConnectRequest, FileConfig, FileServerMap,
        McpConnection, McpConnector, ToolCacheStore, ToolCallResult, TransportError,
        UserServerFilter, UserServerRepository,
    },
};
use chrono::{DateTime, Utc};
use futures_util::{StreamExt, future::join_all, stream};
use mockable::Clock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Token owner for servers that are not bound to a user.
pub const SYSTEM_USER: &str = "system";

/// Result of connecting or refreshing one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOutcome {
    /// Server the outcome describes.
    pub key: ServerKey,
    /// Status after the operation.
    pub status: ServerStatus,
    /// Number of discovered tools.
    pub tool_count: usize,
    /// Failure description when the server is not online.
    pub error: Option<String>,
    /// Authorization the server is waiting for.
    pub pending_oauth: Option<PendingOAuth>,
}

impl ServerOutcome {
    fn from_state(key: ServerKey, state: &ServerRuntimeState) -> Self {
        Self {
            key,
            status: state.status(),
            tool_count: state.tool_count(),
            error: state.error_message().map(str::to_owned),
            pending_oauth: state.pending_oauth().cloned(),
        }
    }

    fn failed(key: ServerKey, err: &ToolRegistryError) -> Self {
        Self {
            key,
            status: ServerStatus::Error,
            tool_count: 0,
            error: Some(err.to_string()),
            pending_oauth: None,
        }
    }

    /// Returns whether the server ended up online.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == ServerStatus::Online
    }
}

/// Result of [`LifecycleController::initialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeReport {
    /// Per-server outcomes in key order.
    pub servers: Vec<ServerOutcome>,
}

impl InitializeReport {
    /// Returns the number of servers that came online.
    #[must_use]
    pub fn online(&self) -> usize {
        self.servers.iter().filter(|outcome| outcome.is_online()).count()
    }

    /// Returns the outcomes of servers that ended in `error`.
    #[must_use]
    pub fn failed(&self) -> Vec<&ServerOutcome> {
        self.servers
            .iter()
            .filter(|outcome| outcome.status == ServerStatus::Error)
            .collect()
    }
}

/// Result of [`LifecycleController::refresh_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Per-server outcomes in key order.
    pub servers: Vec<ServerOutcome>,
    no_configs: bool,
}

impl RefreshReport {
    /// Report for a refresh that found nothing to do.
    #[must_use]
    pub const fn no_configs() -> Self {
        Self {
            servers: Vec::new(),
            no_configs: true,
        }
    }

    /// Returns whether no server configuration existed.
    #[must_use]
    pub const fn is_no_configs(&self) -> bool {
        self.no_configs
    }

    /// Returns the number of servers that came back online.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.servers.iter().filter(|outcome| outcome.is_online()).count()
    }

    /// Returns the number of servers that did not come back online.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.servers.len() - self.succeeded()
    }
}

/// Result of a dry-run connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConnectionReport {
    /// Server the dry run connected to.
    pub server: ServerName,
    /// Whether the handshake and tool listing succeeded.
    pub success: bool,
    /// Tools the server announced.
    pub tools: Vec<ToolDescriptor>,
    /// Instructions announced during the handshake.
    pub instructions: Option<String>,
    /// Failure description.
    pub error: Option<String>,
    /// Whether the server asked for authorization.
    pub oauth_required: bool,
}

impl TestConnectionReport {
    fn failed(server: ServerName, err: &TransportError) -> Self {
        Self {
            server,
            success: false,
            tools: Vec::new(),
            instructions: None,
            error: Some(err.to_string()),
            oauth_required: matches!(err, TransportError::OAuthRequired),
        }
    }
}

/// Result of [`LifecycleController::teardown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Connections that were closed.
    pub disconnected: usize,
    /// Servers whose disconnect failed, with the error text.
    pub failures: Vec<(ServerKey, String)>,
}

/// A server tracked by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedServer {
    config: ServerConfig,
    origin: ConfigOrigin,
    state: ServerRuntimeState,
    known_tools: Vec<ToolDescriptor>,
}

impl ManagedServer {
    /// Returns the configuration the server runs with.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns where the configuration came from.
    #[must_use]
    pub const fn origin(&self) -> &ConfigOrigin {
        &self.origin
    }

    /// Returns the runtime state.
    #[must_use]
    pub const fn state(&self) -> &ServerRuntimeState {
        &self.state
    }
}

/// Orchestrates connect, discovery, refresh and teardown.
pub struct LifecycleController<R, K, A, C>
where
    R: UserServerRepository,
    K: ToolCacheStore,
    A: AuthorizationBroker,
    C: Clock + Send + Sync,
{
    file_servers: FileServerMap,
    settings: McpSettings,
    connector: Arc<dyn McpConnector>,
    repository: Arc<R>,
    authorization: Arc<A>,
    clock: Arc<C>,
    registry: ServerRegistry,
    catalog: ToolCatalog<K>,
    discovery: ToolDiscovery<C>,
    servers: RwLock<BTreeMap<ServerKey, ManagedServer>>,
    key_locks: Mutex<BTreeMap<ServerKey, Arc<AsyncMutex<()>>>>,
    override_mode: AtomicBool,
}

impl<R, K, A, C> LifecycleController<R, K, A, C>
where
    R: UserServerRepository,
    K: ToolCacheStore,
    A: AuthorizationBroker,
    C: Clock + Send + Sync,
{
    /// Creates a controller for the servers in `file`.
    #[must_use]
    pub fn new(
        file: FileConfig,
        connector: Arc<dyn McpConnector>,
        repository: Arc<R>,
        cache: Arc<K>,
        authorization: Arc<A>,
        clock: Arc<C>,
    ) -> Self {
        let FileConfig { settings, servers } = file;
        Self {
            catalog: ToolCatalog::new(settings.tool_delimiter.clone(), cache),
            discovery: ToolDiscovery::new(Arc::clone(&clock)),
            override_mode: AtomicBool::new(settings.override_mode),
            file_servers: servers,
            settings,
            connector,
            repository,
            authorization,
            clock,
            registry: ServerRegistry::new(),
            servers: RwLock::new(BTreeMap::new()),
            key_locks: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the process-wide settings.
    #[must_use]
    pub const fn settings(&self) -> &McpSettings {
        &self.settings
    }

    /// Returns the servers defined in the configuration file.
    #[must_use]
    pub const fn file_servers(&self) -> &FileServerMap {
        &self.file_servers
    }

    /// Returns the connection registry.
    #[must_use]
    pub const fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    /// Returns the tool catalog.
    #[must_use]
    pub const fn catalog(&self) -> &ToolCatalog<K> {
        &self.catalog
    }

    /// Returns whether user-defined servers are excluded.
    #[must_use]
    pub fn override_mode(&self) -> bool {
        self.override_mode.load(Ordering::SeqCst)
    }

    /// Switches override mode.
    ///
    /// The next [`Self::initialize`] stops tracking user servers; until then
    /// they are no longer reconnected.
    pub fn set_override_mode(&self, enabled: bool) {
        self.override_mode.store(enabled, Ordering::SeqCst);
    }

    /// Connects every enabled server from the file and the user store.
    ///
    /// A server that fails to connect is recorded in `error` and does not
    /// stop the others. User servers that are no longer part of the merged
    /// configuration, because override mode is on or their record was
    /// disabled or deleted, are disconnected and forgotten.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Repository`] when user servers cannot be
    /// listed.
    pub async fn initialize(&self) -> ToolRegistryResult<InitializeReport> {
        let override_mode = self.override_mode();
        let records = if override_mode {
            Vec::new()
        } else {
            self.repository.list(&UserServerFilter::enabled()).await?
        };
        let merged = ConfigurationMerger::merge(
            &self.file_servers,
            &records,
            &MergeScope::Global,
            override_mode,
        );
        for key in self.dropped_user_servers(&merged)? {
            self.forget_server(&key).await?;
        }
        info!(
            servers = merged.len(),
            override_mode,
            concurrency = self.settings.startup_concurrency(),
            "initializing MCP servers"
        );

        let mut outcomes: Vec<ServerOutcome> = stream::iter(merged)
            .map(|(key, server)| self.start_server(key, server))
            .buffer_unordered(self.settings.startup_concurrency())
            .collect()
            .await;
        outcomes.sort_by(|left, right| left.key.cmp(&right.key));
        self.catalog.invalidate_cache().await;

        let report = InitializeReport { servers: outcomes };
        info!(
            online = report.online(),
            failed = report.failed().len(),
            "MCP servers initialized"
        );
        Ok(report)
    }

    async fn start_server(&self, key: ServerKey, server: MergedServer) -> ServerOutcome {
        let result = async {
            let key_lock = self.key_lock(&key)?;
            let _guard = key_lock.lock().await;
            self.track(&key, server.config().clone(), server.origin().clone())?;
            if server.config().is_enabled() {
                self.reconnect(&key).await
            } else {
                self.take_offline(&key).await
            }
        }
        .await;
        result.unwrap_or_else(|err| ServerOutcome::failed(key, &err))
    }

    /// Adds or replaces a server configuration and connects it.
    ///
    /// A disabled configuration is tracked but left offline.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Validation`] for an invalid
    /// configuration. Connection failures are reported in the outcome.
    pub async fn connect_server(
        &self,
        key: ServerKey,
        config: ServerConfig,
        origin: ConfigOrigin,
    ) -> ToolRegistryResult<ServerOutcome> {
        config.validate()?;
        let key_lock = self.key_lock(&key)?;
        let _guard = key_lock.lock().await;
        let enabled = config.is_enabled() && !self.is_overridden(&key);
        self.track(&key, config, origin)?;
        if enabled {
            self.reconnect(&key).await
        } else {
            self.take_offline(&key).await
        }
    }

    /// Reconnects one server and rediscovers its tools.
    ///
    /// Servers in `error` are retried too. User servers stay offline while
    /// override mode is on.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] for untracked keys.
    pub async fn refresh_server(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        let config = self.managed(key)?.config;
        let key_lock = self.key_lock(key)?;
        let _guard = key_lock.lock().await;
        info!(server = %key, "refreshing MCP server");
        if config.is_enabled() && !self.is_overridden(key) {
            self.reconnect(key).await
        } else {
            self.take_offline(key).await
        }
    }

    /// Reconnects every tracked server concurrently, skipping user servers
    /// while override mode is on.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the state lock is
    /// poisoned.
    pub async fn refresh_all(&self) -> ToolRegistryResult<RefreshReport> {
        let keys: Vec<ServerKey> = self
            .tracked_keys()?
            .into_iter()
            .filter(|key| !self.is_overridden(key))
            .collect();
        if keys.is_empty() {
            info!("no MCP server configurations to refresh");
            return Ok(RefreshReport::no_configs());
        }
        let servers = join_all(keys.iter().map(|key| async move {
            self.refresh_server(key)
                .await
                .unwrap_or_else(|err| ServerOutcome::failed(key.clone(), &err))
        }))
        .await;
        let report = RefreshReport {
            servers,
            no_configs: false,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "refreshed MCP servers"
        );
        Ok(report)
    }

    /// Rediscovers tools on the existing connection without reconnecting.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when the server has no
    /// live connection. A failed listing is reported in the outcome and
    /// takes the server to `error`.
    pub async fn refresh_tools(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        let key_lock = self.key_lock(key)?;
        let _guard = key_lock.lock().await;
        let connection = self
            .registry
            .get(key)?
            .ok_or_else(|| ToolRegistryError::ServerNotFound(key.to_string()))?;
        let previous = self.managed(key)?.known_tools;

        match self.discovery.discover(key, connection.as_ref(), &previous).await {
            Ok(tools) => {
                self.catalog.publish(key, &tools).await?;
                self.with_server(key, |server, now| {
                    server.state.replace_tools(tools.clone(), now)?;
                    server.known_tools = tools;
                    Ok::<_, ToolRegistryError>(())
                })??;
            }
            Err(err) => {
                self.catalog.clear(key).await?;
                if let Err(teardown) = self.registry.remove(key).await {
                    warn!(server = %key, error = %teardown, "failed to close MCP connection");
                }
                self.record_failure(key, &err)?;
            }
        }
        let outcome = self.outcome_of(key)?;
        self.persist(key, &outcome).await;
        Ok(outcome)
    }

    /// Connects with `config` once and reports what the server offers.
    ///
    /// Nothing is registered or published and the connection is always
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Validation`] for an invalid
    /// configuration. Connection failures are reported in the result.
    pub async fn test_connection(
        &self,
        config: &ServerConfig,
        user_id: Option<&UserId>,
    ) -> ToolRegistryResult<TestConnectionReport> {
        config.validate()?;
        let name = config.name().clone();
        let key = match user_id {
            Some(owner) => ServerKey::user(owner.clone(), name.clone()),
            None => ServerKey::global(name.clone()),
        };
        let context = self.placeholder_context(&key, config).await;
        let resolved = config.resolve_placeholders(&context);
        let token = self.stored_token(token_owner(&key), config).await;

        let request = self.connect_request(&key, resolved, token);
        let connection = match self.connector.connect(&request).await {
            Ok(connection) => connection,
            Err(err) => {
                debug!(server = %name, error = %err, "test connection failed");
                return Ok(TestConnectionReport::failed(name, &err));
            }
        };
        let discovered = self.discovery.discover(&key, connection.as_ref(), &[]).await;
        let instructions = connection.server_instructions();
        if let Err(err) = connection.disconnect().await {
            debug!(server = %name, error = %err, "failed to close test connection");
        }

        Ok(match discovered {
            Ok(tools) => TestConnectionReport {
                server: name,
                success: true,
                tools,
                instructions,
                error: None,
                oauth_required: false,
            },
            Err(err) => TestConnectionReport {
                server: name,
                success: false,
                tools: Vec::new(),
                instructions,
                error: Some(err.to_string()),
                oauth_required: false,
            },
        })
    }

    /// Takes a server offline, keeping it tracked.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] for untracked keys.
    pub async fn disconnect_server(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        self.managed(key)?;
        let key_lock = self.key_lock(key)?;
        let _guard = key_lock.lock().await;
        self.take_offline(key).await
    }

    /// Disconnects a server and stops tracking it.
    ///
    /// Returns whether the server was tracked.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when a lock is poisoned.
    pub async fn forget_server(&self, key: &ServerKey) -> ToolRegistryResult<bool> {
        let key_lock = self.key_lock(key)?;
        let _guard = key_lock.lock().await;
        self.catalog.clear(key).await?;
        if let Err(err) = self.registry.remove(key).await {
            warn!(server = %key, error = %err, "failed to close MCP connection");
        }
        let removed = {
            let mut servers = self.servers.write().map_err(|err| ToolRegistryError::lock(&err))?;
            servers.remove(key).is_some()
        };
        if removed {
            info!(server = %key, "stopped tracking MCP server");
        }
        Ok(removed)
    }

    /// Enables or disables one tool of a server and republishes its tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] for untracked keys and
    /// [`ToolRegistryError::ToolNotFound`] when the server has no such tool.
    pub async fn toggle_tool(
        &self,
        key: &ServerKey,
        tool_name: &str,
        enabled: bool,
    ) -> ToolRegistryResult<Vec<ToolDescriptor>> {
        let key_lock = self.key_lock(key)?;
        let _guard = key_lock.lock().await;
        let (tools, origin) = self.with_server(key, |server, now| {
            if !server.state.set_tool_enabled(tool_name, enabled, now) {
                return Err(ToolRegistryError::ToolNotFound(qualified_tool_name(
                    tool_name,
                    &self.settings.tool_delimiter,
                    key.name(),
                )));
            }
            server.known_tools = server.state.tools().to_vec();
            Ok((server.known_tools.clone(), server.origin.clone()))
        })??;

        self.catalog.publish(key, &tools).await?;
        if let ConfigOrigin::User { server_id, .. } = origin {
            self.repository
                .set_tools(server_id, &tools, self.clock.utc())
                .await?;
        }
        info!(server = %key, tool = tool_name, enabled, "toggled MCP tool");
        Ok(tools)
    }

    /// Invokes a tool by qualified name on behalf of `view`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ToolDisabled`] when the tool exists but
    /// is switched off, [`ToolRegistryError::ToolNotFound`] when no visible
    /// server offers it and [`ToolRegistryError::ToolCall`] when the call
    /// fails.
    pub async fn call_tool(
        &self,
        view: &CatalogView,
        qualified_name: &str,
        arguments: Value,
    ) -> ToolRegistryResult<ToolCallResult> {
        let Some(entry) = self.catalog.resolve(view, qualified_name)? else {
            return Err(if self.is_disabled_tool(view, qualified_name)? {
                ToolRegistryError::ToolDisabled(qualified_name.to_owned())
            } else {
                ToolRegistryError::ToolNotFound(qualified_name.to_owned())
            });
        };
        let connection = self
            .registry
            .get(entry.server())?
            .ok_or_else(|| ToolRegistryError::ServerNotFound(entry.server().to_string()))?;
        debug!(server = %entry.server(), tool = entry.tool().name(), "calling MCP tool");
        connection
            .call_tool(entry.tool().name(), arguments)
            .await
            .map_err(|source| ToolRegistryError::ToolCall {
                tool: qualified_name.to_owned(),
                source,
            })
    }

    /// Returns the tool snapshot for `view`, served from the cache when
    /// possible.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Cache`] when the cache store fails.
    pub async fn tools(&self, view: &CatalogView) -> ToolRegistryResult<CachedCatalog> {
        self.catalog.cached_snapshot(view).await
    }

    /// Closes every connection and empties the catalog.
    ///
    /// Failures are collected; every connection is attempted. Waits for
    /// in-flight connects and refreshes to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when a lock is poisoned.
    pub async fn teardown(&self) -> ToolRegistryResult<TeardownReport> {
        let _guards = self.lock_all().await?;
        let connections = self.registry.drain()?;
        self.catalog.clear_all().await?;
        let results = join_all(connections.into_iter().map(|(key, connection)| async move {
            let result = connection.disconnect().await;
            (key, result)
        }))
        .await;

        let mut report = TeardownReport::default();
        for (key, result) in results {
            match result {
                Ok(()) => report.disconnected += 1,
                Err(err) => {
                    warn!(server = %key, error = %err, "failed to disconnect MCP server");
                    report.failures.push((key, err.to_string()));
                }
            }
        }
        {
            let now = self.clock.utc();
            let mut servers = self.servers.write().map_err(|err| ToolRegistryError::lock(&err))?;
            for server in servers.values_mut() {
                server.state.mark_offline(now);
            }
        }
        info!(
            disconnected = report.disconnected,
            failed = report.failures.len(),
            "MCP teardown complete"
        );
        Ok(report)
    }

    /// Returns a tracked server.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the state lock is
    /// poisoned.
    pub fn server(&self, key: &ServerKey) -> ToolRegistryResult<Option<ManagedServer>> {
        let servers = self.servers.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(servers.get(key).cloned())
    }

    /// Returns every tracked server in key order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the state lock is
    /// poisoned.
    pub fn servers(&self) -> ToolRegistryResult<Vec<(ServerKey, ManagedServer)>> {
        let servers = self.servers.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(servers
            .iter()
            .map(|(key, server)| (key.clone(), server.clone()))
            .collect())
    }

    fn key_lock(&self, key: &ServerKey) -> ToolRegistryResult<Arc<AsyncMutex<()>>> {
        let mut locks = self.key_locks.lock().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(Arc::clone(locks.entry(key.clone()).or_default()))
    }

    async fn lock_all(&self) -> ToolRegistryResult<Vec<OwnedMutexGuard<()>>> {
        let mut keys: BTreeSet<ServerKey> = {
            let locks = self.key_locks.lock().map_err(|err| ToolRegistryError::lock(&err))?;
            locks.keys().cloned().collect()
        };
        keys.extend(self.tracked_keys()?);
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.key_lock(&key)?.lock_owned().await);
        }
        Ok(guards)
    }

    fn is_overridden(&self, key: &ServerKey) -> bool {
        self.override_mode() && key.user_id().is_some()
    }

    fn dropped_user_servers(&self, merged: &MergedConfig) -> ToolRegistryResult<Vec<ServerKey>> {
        let servers = self.servers.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(servers
            .iter()
            .filter(|(key, server)| {
                matches!(server.origin, ConfigOrigin::User { .. }) && merged.get(key).is_none()
            })
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn managed(&self, key: &ServerKey) -> ToolRegistryResult<ManagedServer> {
        self.server(key)?
            .ok_or_else(|| ToolRegistryError::ServerNotFound(key.to_string()))
    }

    fn tracked_keys(&self) -> ToolRegistryResult<Vec<ServerKey>> {
        let servers = self.servers.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(servers.keys().cloned().collect())
    }

    fn with_server<T>(
        &self,
        key: &ServerKey,
        update: impl FnOnce(&mut ManagedServer, DateTime<Utc>) -> T,
    ) -> ToolRegistryResult<T> {
        let now = self.clock.utc();
        let mut servers = self.servers.write().map_err(|err| ToolRegistryError::lock(&err))?;
        let server = servers
            .get_mut(key)
            .ok_or_else(|| ToolRegistryError::ServerNotFound(key.to_string()))?;
        Ok(update(server, now))
    }

    fn outcome_of(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        let server = self.managed(key)?;
        Ok(ServerOutcome::from_state(key.clone(), &server.state))
    }

    fn track(
        &self,
        key: &ServerKey,
        config: ServerConfig,
        origin: ConfigOrigin,
    ) -> ToolRegistryResult<()> {
        let now = self.clock.utc();
        let mut servers = self.servers.write().map_err(|err| ToolRegistryError::lock(&err))?;
        match servers.get_mut(key) {
            Some(server) => {
                server.config = config;
                server.origin = origin;
            }
            None => {
                servers.insert(
                    key.clone(),
                    ManagedServer {
                        config,
                        origin,
                        state: ServerRuntimeState::new(now),
                        known_tools: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn take_offline(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        self.catalog.clear(key).await?;
        if let Err(err) = self.registry.remove(key).await {
            warn!(server = %key, error = %err, "failed to close MCP connection");
        }
        self.with_server(key, |server, now| server.state.mark_offline(now))?;
        let outcome = self.outcome_of(key)?;
        self.persist(key, &outcome).await;
        debug!(server = %key, "MCP server offline");
        Ok(outcome)
    }

    async fn reconnect(&self, key: &ServerKey) -> ToolRegistryResult<ServerOutcome> {
        let server = self.managed(key)?;
        self.with_server(key, |managed, now| {
            if managed.state.status() == ServerStatus::Connecting {
                Ok(())
            } else {
                managed.state.mark_connecting(now)
            }
        })??;
        self.catalog.clear(key).await?;
        if let Err(err) = self.registry.remove(key).await {
            warn!(server = %key, error = %err, "failed to close previous MCP connection");
        }

        let previous = self.previous_tools(&server).await;
        match self.open(key, &server.config).await {
            Ok(connection) => self.adopt(key, &server.config, connection, &previous).await?,
            Err(err) => self.record_failure(key, &err)?,
        }
        let outcome = self.outcome_of(key)?;
        self.persist(key, &outcome).await;
        Ok(outcome)
    }

    async fn previous_tools(&self, server: &ManagedServer) -> Vec<ToolDescriptor> {
        if !server.known_tools.is_empty() {
            return server.known_tools.clone();
        }
        let ConfigOrigin::User { user_id, server_id } = &server.origin else {
            return Vec::new();
        };
        match self.repository.get(*server_id, user_id).await {
            Ok(record) => record.map(|found| found.tools().to_vec()).unwrap_or_default(),
            Err(err) => {
                warn!(server_id = %server_id, error = %err, "failed to load stored tool overrides");
                Vec::new()
            }
        }
    }

    async fn adopt(
        &self,
        key: &ServerKey,
        config: &ServerConfig,
        connection: SharedConnection,
        previous: &[ToolDescriptor],
    ) -> ToolRegistryResult<()> {
        let tools = match self.discovery.discover(key, connection.as_ref(), previous).await {
            Ok(tools) => tools,
            Err(err) => {
                if let Err(teardown) = connection.disconnect().await {
                    debug!(server = %key, error = %teardown, "failed to close MCP connection");
                }
                return self.record_failure(key, &err);
            }
        };
        let instructions = match config.server_instructions() {
            ServerInstructions::Disabled => None,
            ServerInstructions::FromServer => connection.server_instructions(),
            ServerInstructions::Custom(text) => Some(text.clone()),
        };

        let status = self.with_server(key, |server, _| server.state.status())?;
        if !status.can_transition_to(ServerStatus::Online) {
            debug!(server = %key, status = %status, "discarding connection for settled server");
            if let Err(teardown) = connection.disconnect().await {
                debug!(server = %key, error = %teardown, "failed to close MCP connection");
            }
            return Ok(());
        }
        self.registry.set(key.clone(), connection).await?;
        let published = self.catalog.publish(key, &tools).await?;
        let discovered = tools.len();
        self.with_server(key, |server, now| {
            server.state.mark_online(tools.clone(), instructions, now)?;
            server.known_tools = tools;
            Ok::<_, ToolRegistryError>(())
        })??;
        info!(server = %key, tool_count = discovered, published, "MCP server online");
        Ok(())
    }

    async fn open(
        &self,
        key: &ServerKey,
        config: &ServerConfig,
    ) -> ToolRegistryResult<SharedConnection> {
        let owner = token_owner(key);
        let context = self.placeholder_context(key, config).await;
        let resolved = config.resolve_placeholders(&context);
        let token = self.stored_token(owner, config).await;
        match self
            .connector
            .connect(&self.connect_request(key, resolved.clone(), token))
            .await
        {
            Ok(connection) => Ok(connection),
            Err(TransportError::OAuthRequired) => match config.oauth() {
                Some(oauth) => self.park_on_authorization(key, owner, resolved, oauth).await,
                None => Err(ToolRegistryError::Connect {
                    server: key.clone(),
                    source: TransportError::OAuthRequired,
                }),
            },
            Err(source) => Err(ToolRegistryError::Connect {
                server: key.clone(),
                source,
            }),
        }
    }

    async fn park_on_authorization(
        &self,
        key: &ServerKey,
        owner: &str,
        resolved: ServerConfig,
        oauth: &OAuthConfig,
    ) -> ToolRegistryResult<SharedConnection> {
        let pending = self
            .authorization
            .request_authorization(owner, &resolved, oauth)
            .await?;
        self.with_server(key, |server, now| {
            server.state.mark_awaiting_oauth(pending.clone(), now)
        })??;
        info!(
            server = %key,
            flow_id = %pending.flow_id,
            "MCP server awaiting OAuth authorization"
        );

        let wait = self.settings.oauth_wait();
        if wait.is_zero() {
            return Err(oauth_required(key, pending));
        }
        match self.authorization.await_authorization(&pending.flow_id, wait).await {
            Ok(token) => self
                .connector
                .connect(&self.connect_request(key, resolved, Some(token)))
                .await
                .map_err(|source| ToolRegistryError::Connect {
                    server: key.clone(),
                    source,
                }),
            Err(err) => {
                debug!(server = %key, error = %err, "OAuth authorization not completed");
                Err(oauth_required(key, pending))
            }
        }
    }

    fn record_failure(&self, key: &ServerKey, err: &ToolRegistryError) -> ToolRegistryResult<()> {
        if let ToolRegistryError::OAuthRequired { pending: Some(_), .. } = err {
            return Ok(());
        }
        warn!(server = %key, error = %err, "MCP server failed");
        self.with_server(key, |server, now| server.state.mark_error(err.to_string(), now))??;
        Ok(())
    }

    async fn persist(&self, key: &ServerKey, outcome: &ServerOutcome) {
        let Ok(Some(server)) = self.server(key) else {
            return;
        };
        let ConfigOrigin::User { server_id, .. } = server.origin else {
            return;
        };
        let now = self.clock.utc();
        if let Err(err) = self
            .repository
            .set_status(server_id, outcome.status, outcome.error.as_deref(), now)
            .await
        {
            warn!(server = %key, error = %err, "failed to persist MCP server status");
        }
        if outcome.is_online()
            && let Err(err) = self
                .repository
                .set_tools(server_id, server.state.tools(), now)
                .await
        {
            warn!(server = %key, error = %err, "failed to persist MCP server tools");
        }
    }

    async fn placeholder_context(
        &self,
        key: &ServerKey,
        config: &ServerConfig,
    ) -> PlaceholderContext {
        let Some(user_id) = key.user_id() else {
            return PlaceholderContext::new();
        };
        let base = PlaceholderContext::for_user(user_id.as_str());
        let declared = config.custom_user_vars();
        if declared.is_empty() {
            return base;
        }
        match self
            .authorization
            .user_variables(user_id.as_str(), config.name().as_str())
            .await
        {
            Ok(values) => values
                .into_iter()
                .filter(|(name, _)| declared.contains_key(name))
                .fold(base, |context, (name, value)| context.with_custom_var(name, value)),
            Err(err) => {
                warn!(server = %key, error = %err, "failed to read custom user variables");
                base
            }
        }
    }

    async fn stored_token(&self, owner: &str, config: &ServerConfig) -> Option<String> {
        config.oauth()?;
        match self
            .authorization
            .access_token(owner, config.name().as_str())
            .await
        {
            Ok(token) => token,
            Err(err) => {
                warn!(server = %config.name(), error = %err, "failed to read stored OAuth tokens");
                None
            }
        }
    }

    fn connect_request(
        &self,
        key: &ServerKey,
        config: ServerConfig,
        access_token: Option<String>,
    ) -> ConnectRequest {
        ConnectRequest {
            key: key.clone(),
            request_timeout: config
                .timeout()
                .unwrap_or_else(|| self.settings.default_timeout()),
            init_timeout: config
                .init_timeout()
                .unwrap_or_else(|| self.settings.default_init_timeout()),
            shutdown_grace: self.settings.shutdown_grace(),
            max_tool_pages: self.settings.max_tool_pages,
            access_token,
            config,
        }
    }

    fn is_disabled_tool(
        &self,
        view: &CatalogView,
        qualified_name: &str,
    ) -> ToolRegistryResult<bool> {
        let servers = self.servers.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(servers
            .iter()
            .filter(|(key, _)| match view {
                CatalogView::All => true,
                CatalogView::User(user_id) => key.user_id().is_none_or(|owner| owner == user_id),
            })
            .any(|(key, server)| {
                server.state.tools().iter().any(|tool| {
                    let qualified =
                        qualified_tool_name(tool.name(), &self.settings.tool_delimiter, key.name());
                    !tool.is_enabled() && qualified == qualified_name
                })
            }))
    }
}

fn token_owner(key: &ServerKey) -> &str {
    key.user_id().map_or(SYSTEM_USER, UserId::as_str)
}

fn oauth_required(key: &ServerKey, pending: PendingOAuth) -> ToolRegistryError {
    ToolRegistryError::OAuthRequired {
        server: key.clone(),
        pending: Some(Box::new(pending)),
    }
}
