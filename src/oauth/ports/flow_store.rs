//! Keyed flow-state store with store-managed expiry.

use crate::oauth::domain::{FlowId, OAuthFlowState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for flow-state store operations.
pub type FlowStoreResult<T> = Result<T, FlowStoreError>;

/// External store of OAuth flow records.
///
/// Expired entries must behave as absent.
#[async_trait]
pub trait FlowStateStore: Send + Sync {
    /// Loads a flow record.
    async fn get(&self, flow_id: &FlowId) -> FlowStoreResult<Option<OAuthFlowState>>;

    /// Stores or replaces a flow record, resetting its time-to-live.
    async fn put(&self, state: &OAuthFlowState, ttl: Duration) -> FlowStoreResult<()>;

    /// Removes a flow record. Removing a missing record is not an error.
    async fn delete(&self, flow_id: &FlowId) -> FlowStoreResult<()>;
}

/// Errors returned by flow-state stores.
#[derive(Debug, Clone, Error)]
pub enum FlowStoreError {
    /// Backend failure.
    #[error("flow state store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl FlowStoreError {
    /// Wraps a backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
