//! In-memory tool cache store.

use crate::tool_registry::ports::{
    CacheScope, CachedCatalog, ToolCacheError, ToolCacheResult, ToolCacheStore,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Map-backed cache of catalog snapshots.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolCacheStore {
    entries: Arc<RwLock<HashMap<CacheScope, CachedCatalog>>>,
}

impl InMemoryToolCacheStore {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many partitions are cached.
    ///
    /// # Errors
    ///
    /// Returns [`ToolCacheError::Backend`] when the lock is poisoned.
    pub fn cached_partitions(&self) -> ToolCacheResult<usize> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries.len())
    }

    fn lock_error(err: impl ToString) -> ToolCacheError {
        ToolCacheError::backend(std::io::Error::other(err.to_string()))
    }
}

#[async_trait]
impl ToolCacheStore for InMemoryToolCacheStore {
    async fn get(&self, scope: &CacheScope) -> ToolCacheResult<Option<CachedCatalog>> {
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries.get(scope).cloned())
    }

    async fn set(&self, scope: &CacheScope, catalog: &CachedCatalog) -> ToolCacheResult<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        entries.insert(scope.clone(), catalog.clone());
        Ok(())
    }

    async fn invalidate_all(&self) -> ToolCacheResult<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        entries.clear();
        Ok(())
    }
}
