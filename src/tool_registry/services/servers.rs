//! Server management operations behind the REST surface.
//!
//! User servers are addressed by record id and owner. Runtime operations
//! (refresh, tool toggles) take a server name and resolve it the way the
//! user's catalog does: the user's own server first, then the global one.

use super::{
    error::{ToolRegistryError, ToolRegistryResult},
    lifecycle::{LifecycleController, RefreshReport, ServerOutcome, TestConnectionReport},
};
use crate::tool_registry::{
    domain::{
        ConfigOrigin, McpServerId, PendingOAuth, ServerConfig, ServerKey, ServerName,
        ServerRuntimeState, ServerStatus, ToolDescriptor, TransportKind, UserId,
        UserServerRecord,
    },
    ports::{AuthorizationBroker, ToolCacheStore, UserServerFilter, UserServerRepository},
};
use mockable::Clock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// Filter for [`McpServerService::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerQuery {
    /// Keep servers with this enabled flag.
    pub enabled: Option<bool>,
    /// Keep servers using this transport.
    pub transport: Option<TransportKind>,
    /// Keep servers in this status.
    pub status: Option<ServerStatus>,
}

impl ServerQuery {
    fn matches(&self, view: &ServerView) -> bool {
        self.enabled.is_none_or(|enabled| view.config.is_enabled() == enabled)
            && self
                .transport
                .is_none_or(|kind| view.config.transport().kind() == kind)
            && self.status.is_none_or(|status| view.status == status)
    }
}

/// A server as presented to one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerView {
    /// Registry key.
    pub key: ServerKey,
    /// Record id for user-defined servers.
    pub id: Option<McpServerId>,
    /// Configuration.
    pub config: ServerConfig,
    /// Live status, or the last persisted one when the server is not tracked.
    pub status: ServerStatus,
    /// Last error.
    pub error: Option<String>,
    /// Discovered tools with their enabled flags.
    pub tools: Vec<ToolDescriptor>,
    /// Instructions surfaced to the model.
    pub instructions: Option<String>,
    /// Authorization the server waits for.
    pub pending_oauth: Option<PendingOAuth>,
}

impl ServerView {
    /// Returns whether the server comes from the user store.
    #[must_use]
    pub const fn is_user_defined(&self) -> bool {
        self.id.is_some()
    }
}

/// Aggregate counts across every tracked server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Tracked servers.
    pub total: usize,
    /// Servers from the user store.
    pub user_defined: usize,
    /// Servers per status.
    pub by_status: BTreeMap<&'static str, usize>,
    /// Servers per transport.
    pub by_transport: BTreeMap<TransportKind, usize>,
    /// Tools currently published in the catalog.
    pub published_tools: usize,
}

/// Manages user servers and exposes runtime operations.
pub struct McpServerService<R, K, A, C>
where
    R: UserServerRepository,
    K: ToolCacheStore,
    A: AuthorizationBroker,
    C: Clock + Send + Sync,
{
    repository: Arc<R>,
    controller: Arc<LifecycleController<R, K, A, C>>,
    clock: Arc<C>,
}

impl<R, K, A, C> McpServerService<R, K, A, C>
where
    R: UserServerRepository,
    K: ToolCacheStore,
    A: AuthorizationBroker,
    C: Clock + Send + Sync,
{
    /// Creates the service.
    #[must_use]
    pub const fn new(
        repository: Arc<R>,
        controller: Arc<LifecycleController<R, K, A, C>>,
        clock: Arc<C>,
    ) -> Self {
        Self {
            repository,
            controller,
            clock,
        }
    }

    /// Lists the servers visible to `user_id`.
    ///
    /// File servers shadowed by one of the user's enabled servers are left
    /// out. Disabled user servers are listed.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Repository`] when the store fails.
    pub async fn list(
        &self,
        user_id: &UserId,
        query: &ServerQuery,
    ) -> ToolRegistryResult<Vec<ServerView>> {
        let records = self
            .repository
            .list(&UserServerFilter::for_user(user_id.clone()))
            .await?;
        let shadowing: BTreeSet<&ServerName> = if self.controller.override_mode() {
            BTreeSet::new()
        } else {
            records
                .iter()
                .filter(|record| record.is_enabled())
                .map(|record| record.config().name())
                .collect()
        };

        let mut views = Vec::new();
        for (name, config) in self.controller.file_servers() {
            if shadowing.contains(name) {
                continue;
            }
            views.push(self.file_view(ServerKey::global(name.clone()), config)?);
        }
        for record in &records {
            views.push(self.record_view(record)?);
        }
        views.retain(|view| query.matches(view));
        views.sort_by(|left, right| {
            left.config
                .name()
                .cmp(right.config.name())
                .then_with(|| left.key.cmp(&right.key))
        });
        Ok(views)
    }

    /// Returns one of the user's servers.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when the user owns no
    /// such record.
    pub async fn get(&self, user_id: &UserId, id: McpServerId) -> ToolRegistryResult<ServerView> {
        let record = self.find(user_id, id).await?;
        self.record_view(&record)
    }

    /// Stores a new user server and connects it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Validation`] for an invalid configuration
    /// and [`ToolRegistryError::DuplicateName`] when the user already has a
    /// server with that name. Connection failures are reflected in the
    /// returned status.
    pub async fn create(
        &self,
        user_id: &UserId,
        config: ServerConfig,
    ) -> ToolRegistryResult<ServerView> {
        config.validate()?;
        self.ensure_name_free(user_id, config.name(), None).await?;
        let record = UserServerRecord::new(user_id.clone(), config, &*self.clock);
        self.repository.create(&record).await?;
        info!(server = %record.key(), id = %record.id(), "created user MCP server");
        self.activate(&record).await?;
        self.get(user_id, record.id()).await
    }

    /// Replaces a user server's configuration and reconnects it.
    ///
    /// A rename drops the live server under the old name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Validation`],
    /// [`ToolRegistryError::ServerNotFound`] or
    /// [`ToolRegistryError::DuplicateName`].
    pub async fn update(
        &self,
        user_id: &UserId,
        id: McpServerId,
        config: ServerConfig,
    ) -> ToolRegistryResult<ServerView> {
        config.validate()?;
        let mut record = self.find(user_id, id).await?;
        self.ensure_name_free(user_id, config.name(), Some(id)).await?;
        let previous_key = record.key();
        record.replace_config(config, self.clock.utc());
        self.repository.update(&record).await?;
        if previous_key != record.key() {
            self.controller.forget_server(&previous_key).await?;
        }
        info!(server = %record.key(), id = %id, "updated user MCP server");
        self.activate(&record).await?;
        self.get(user_id, id).await
    }

    /// Deletes a user server and disconnects it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when the user owns no
    /// such record.
    pub async fn delete(&self, user_id: &UserId, id: McpServerId) -> ToolRegistryResult<()> {
        let record = self.find(user_id, id).await?;
        self.repository.delete(id, user_id).await?;
        self.controller.forget_server(&record.key()).await?;
        info!(server = %record.key(), id = %id, "deleted user MCP server");
        Ok(())
    }

    /// Enables or disables a user server, connecting or disconnecting it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when the user owns no
    /// such record.
    pub async fn toggle_enabled(
        &self,
        user_id: &UserId,
        id: McpServerId,
        enabled: bool,
    ) -> ToolRegistryResult<ServerView> {
        let record = self
            .repository
            .toggle_enabled(id, user_id, enabled, self.clock.utc())
            .await?;
        info!(server = %record.key(), enabled, "toggled user MCP server");
        self.activate(&record).await?;
        self.get(user_id, id).await
    }

    /// Dry-runs a configuration without registering it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Validation`] for an invalid
    /// configuration.
    pub async fn test_connection(
        &self,
        user_id: &UserId,
        config: &ServerConfig,
    ) -> ToolRegistryResult<TestConnectionReport> {
        self.controller.test_connection(config, Some(user_id)).await
    }

    /// Rediscovers the tools of the server `name` as seen by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when no such server is
    /// connected.
    pub async fn refresh_tools(
        &self,
        user_id: &UserId,
        name: &ServerName,
    ) -> ToolRegistryResult<ServerOutcome> {
        let key = self.resolve_key(user_id, name)?;
        self.controller.refresh_tools(&key).await
    }

    /// Reconnects the server `name` as seen by `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] when no such server is
    /// tracked.
    pub async fn refresh_server(
        &self,
        user_id: &UserId,
        name: &ServerName,
    ) -> ToolRegistryResult<ServerOutcome> {
        let key = self.resolve_key(user_id, name)?;
        self.controller.refresh_server(&key).await
    }

    /// Reconnects every tracked server.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when a lock is poisoned.
    pub async fn refresh_all(&self) -> ToolRegistryResult<RefreshReport> {
        self.controller.refresh_all().await
    }

    /// Enables or disables one tool of the server `name` as seen by
    /// `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ServerNotFound`] or
    /// [`ToolRegistryError::ToolNotFound`].
    pub async fn toggle_tool(
        &self,
        user_id: &UserId,
        name: &ServerName,
        tool_name: &str,
        enabled: bool,
    ) -> ToolRegistryResult<Vec<ToolDescriptor>> {
        let key = self.resolve_key(user_id, name)?;
        self.controller.toggle_tool(&key, tool_name, enabled).await
    }

    /// Returns counts across every tracked server.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when a lock is poisoned.
    pub fn stats(&self) -> ToolRegistryResult<ServerStats> {
        let mut stats = ServerStats::default();
        for (key, server) in self.controller.servers()? {
            stats.total += 1;
            if !key.is_global() {
                stats.user_defined += 1;
            }
            *stats
                .by_status
                .entry(server.state().status().as_str())
                .or_default() += 1;
            *stats
                .by_transport
                .entry(server.config().transport().kind())
                .or_default() += 1;
        }
        stats.published_tools = self.controller.catalog().tool_count()?;
        Ok(stats)
    }

    async fn find(
        &self,
        user_id: &UserId,
        id: McpServerId,
    ) -> ToolRegistryResult<UserServerRecord> {
        self.repository
            .get(id, user_id)
            .await?
            .ok_or_else(|| ToolRegistryError::ServerNotFound(id.to_string()))
    }

    async fn ensure_name_free(
        &self,
        user_id: &UserId,
        name: &ServerName,
        except: Option<McpServerId>,
    ) -> ToolRegistryResult<()> {
        let records = self
            .repository
            .list(&UserServerFilter::for_user(user_id.clone()))
            .await?;
        let taken = records
            .iter()
            .any(|record| record.config().name() == name && Some(record.id()) != except);
        if taken {
            return Err(ToolRegistryError::DuplicateName(name.clone()));
        }
        Ok(())
    }

    async fn activate(&self, record: &UserServerRecord) -> ToolRegistryResult<()> {
        if self.controller.override_mode() {
            info!(server = %record.key(), "override mode on; user MCP server not connected");
            return Ok(());
        }
        let outcome = self
            .controller
            .connect_server(
                record.key(),
                record.config().clone(),
                ConfigOrigin::User {
                    user_id: record.user_id().clone(),
                    server_id: record.id(),
                },
            )
            .await?;
        info!(server = %outcome.key, status = %outcome.status, "user MCP server activated");
        Ok(())
    }

    fn resolve_key(&self, user_id: &UserId, name: &ServerName) -> ToolRegistryResult<ServerKey> {
        let own = ServerKey::user(user_id.clone(), name.clone());
        if self.controller.server(&own)?.is_some() {
            return Ok(own);
        }
        let global = ServerKey::global(name.clone());
        if self.controller.server(&global)?.is_some() {
            return Ok(global);
        }
        Err(ToolRegistryError::ServerNotFound(name.to_string()))
    }

    fn file_view(&self, key: ServerKey, config: &ServerConfig) -> ToolRegistryResult<ServerView> {
        let managed = self.controller.server(&key)?;
        Ok(match managed {
            Some(server) => live_view(key, None, server.config().clone(), server.state()),
            None => ServerView {
                key,
                id: None,
                config: config.clone(),
                status: ServerStatus::Unknown,
                error: None,
                tools: Vec::new(),
                instructions: None,
                pending_oauth: None,
            },
        })
    }

    fn record_view(&self, record: &UserServerRecord) -> ToolRegistryResult<ServerView> {
        let key = record.key();
        let managed = self.controller.server(&key)?;
        Ok(match managed {
            Some(server) => live_view(
                key,
                Some(record.id()),
                record.config().clone(),
                server.state(),
            ),
            None => ServerView {
                key,
                id: Some(record.id()),
                config: record.config().clone(),
                status: record.status(),
                error: record.error_message().map(str::to_owned),
                tools: record.tools().to_vec(),
                instructions: None,
                pending_oauth: None,
            },
        })
    }
}

fn live_view(
    key: ServerKey,
    id: Option<McpServerId>,
    config: ServerConfig,
    state: &ServerRuntimeState,
) -> ServerView {
    ServerView {
        key,
        id,
        config,
        status: state.status(),
        error: state.error_message().map(str::to_owned),
        tools: state.tools().to_vec(),
        instructions: state.instructions().map(str::to_owned),
        pending_oauth: state.pending_oauth().cloned(),
    }
}
