//! Shared tool catalog with per-view snapshots.
//!
//! Entries are grouped by server. Publishing replaces a server's group in a
//! single write, so readers see either the old or the new tool set and never
//! a mix. Every mutation drops the cached snapshots held by the
//! [`ToolCacheStore`].

use super::error::{ToolRegistryError, ToolRegistryResult};
use crate::tool_registry::{
    domain::{CatalogTool, ServerKey, ServerName, ToolDescriptor, UserId},
    ports::{CacheScope, CachedCatalog, ToolCacheStore},
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Whose tools a snapshot contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogView {
    /// Every published tool.
    All,
    /// Global tools plus the user's own, with the user's servers shadowing
    /// global servers of the same name.
    User(UserId),
}

impl CatalogView {
    fn cache_scope(&self) -> CacheScope {
        match self {
            Self::All => CacheScope::Global,
            Self::User(user_id) => CacheScope::User(user_id.clone()),
        }
    }
}

/// Tool catalog keyed by server.
pub struct ToolCatalog<K>
where
    K: ToolCacheStore,
{
    delimiter: String,
    entries: RwLock<BTreeMap<ServerKey, Vec<CatalogTool>>>,
    cache: Arc<K>,
}

impl<K> ToolCatalog<K>
where
    K: ToolCacheStore,
{
    /// Creates an empty catalog naming tools with `delimiter`.
    #[must_use]
    pub fn new(delimiter: impl Into<String>, cache: Arc<K>) -> Self {
        Self {
            delimiter: delimiter.into(),
            entries: RwLock::new(BTreeMap::new()),
            cache,
        }
    }

    /// Replaces the tools published for `key` with the enabled entries of
    /// `tools`. Returns the number of published tools.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub async fn publish(
        &self,
        key: &ServerKey,
        tools: &[ToolDescriptor],
    ) -> ToolRegistryResult<usize> {
        let published: Vec<CatalogTool> = tools
            .iter()
            .filter(|tool| tool.is_enabled())
            .map(|tool| CatalogTool::new(key.clone(), tool.clone(), &self.delimiter))
            .collect();
        let count = published.len();
        {
            let mut entries = self.entries.write().map_err(|err| ToolRegistryError::lock(&err))?;
            if published.is_empty() {
                entries.remove(key);
            } else {
                entries.insert(key.clone(), published);
            }
        }
        debug!(server = %key, tool_count = count, "published MCP tools");
        self.invalidate_cache().await;
        Ok(count)
    }

    /// Removes the tools of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub async fn clear(&self, key: &ServerKey) -> ToolRegistryResult<()> {
        let removed = {
            let mut entries = self.entries.write().map_err(|err| ToolRegistryError::lock(&err))?;
            entries.remove(key).is_some()
        };
        if removed {
            self.invalidate_cache().await;
        }
        Ok(())
    }

    /// Removes every tool.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub async fn clear_all(&self) -> ToolRegistryResult<()> {
        {
            let mut entries = self.entries.write().map_err(|err| ToolRegistryError::lock(&err))?;
            entries.clear();
        }
        self.invalidate_cache().await;
        Ok(())
    }

    /// Returns the tools published for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn entries_for(&self, key: &ServerKey) -> ToolRegistryResult<Vec<CatalogTool>> {
        let entries = self.entries.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(entries.get(key).cloned().unwrap_or_default())
    }

    /// Returns the number of published tools across all servers.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn tool_count(&self) -> ToolRegistryResult<usize> {
        let entries = self.entries.read().map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(entries.values().map(Vec::len).sum())
    }

    /// Builds the snapshot for `view` from the live catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn snapshot(&self, view: &CatalogView) -> ToolRegistryResult<CachedCatalog> {
        let entries = self.entries.read().map_err(|err| ToolRegistryError::lock(&err))?;
        let shadowed: BTreeSet<&ServerName> = match view {
            CatalogView::All => BTreeSet::new(),
            CatalogView::User(user_id) => entries
                .keys()
                .filter(|key| key.user_id() == Some(user_id))
                .map(ServerKey::name)
                .collect(),
        };

        let mut snapshot = CachedCatalog::new();
        for (key, tools) in &*entries {
            let visible = match view {
                CatalogView::All => true,
                CatalogView::User(user_id) => match key.user_id() {
                    Some(owner) => owner == user_id,
                    None => !shadowed.contains(key.name()),
                },
            };
            if visible {
                snapshot.extend(
                    tools
                        .iter()
                        .map(|tool| (tool.qualified_name().to_owned(), tool.clone())),
                );
            }
        }
        Ok(snapshot)
    }

    /// Looks up one qualified tool name in `view`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn resolve(
        &self,
        view: &CatalogView,
        qualified_name: &str,
    ) -> ToolRegistryResult<Option<CatalogTool>> {
        Ok(self.snapshot(view)?.remove(qualified_name))
    }

    /// Returns the snapshot for `view`, reading through the cache store.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Cache`] when the cache store fails and
    /// [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub async fn cached_snapshot(&self, view: &CatalogView) -> ToolRegistryResult<CachedCatalog> {
        let scope = view.cache_scope();
        if let Some(cached) = self.cache.get(&scope).await? {
            return Ok(cached);
        }
        let snapshot = self.snapshot(view)?;
        self.cache.set(&scope, &snapshot).await?;
        debug!(global = scope.is_global(), tool_count = snapshot.len(), "cached tool snapshot");
        Ok(snapshot)
    }

    /// Drops cached snapshots so readers rebuild from the live catalog.
    pub async fn invalidate_cache(&self) {
        if let Err(err) = self.cache.invalidate_all().await {
            warn!(error = %err, "failed to invalidate MCP tool cache");
        }
    }
}
