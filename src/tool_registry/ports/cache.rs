//! Cache port for published tool catalogs.

use crate::tool_registry::domain::{CatalogTool, UserId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Result type for tool cache operations.
pub type ToolCacheResult<T> = Result<T, ToolCacheError>;

/// A catalog snapshot keyed by qualified tool name.
pub type CachedCatalog = BTreeMap<String, CatalogTool>;

/// Cache partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheScope {
    /// Every server, as used by administrative views.
    Global,
    /// The catalog as seen by one user.
    User(UserId),
}

impl CacheScope {
    /// Returns whether this is the process-wide partition.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

/// Store that keeps computed catalog snapshots across reads.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolCacheStore: Send + Sync {
    /// Returns the cached snapshot for `scope`.
    async fn get(&self, scope: &CacheScope) -> ToolCacheResult<Option<CachedCatalog>>;

    /// Stores a snapshot for `scope`.
    async fn set(&self, scope: &CacheScope, catalog: &CachedCatalog) -> ToolCacheResult<()>;

    /// Drops every cached snapshot.
    async fn invalidate_all(&self) -> ToolCacheResult<()>;
}

/// Errors returned by tool cache implementations.
#[derive(Debug, Clone, Error)]
pub enum ToolCacheError {
    /// Backend failure.
    #[error("tool cache backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl ToolCacheError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
