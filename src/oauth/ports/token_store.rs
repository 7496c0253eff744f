//! Persistent store for per-user server credentials: OAuth tokens and the
//! values users supply for a server's custom variables.

use crate::oauth::domain::{OAuthTokens, TokenKey};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Result type for token store operations.
pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Credential persistence keyed by user and server.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Finds stored credentials.
    async fn find(&self, key: &TokenKey) -> TokenStoreResult<Option<OAuthTokens>>;

    /// Stores credentials for a key that has none.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError::AlreadyExists`] when the key is taken.
    async fn create(&self, key: &TokenKey, tokens: &OAuthTokens) -> TokenStoreResult<()>;

    /// Replaces existing credentials.
    ///
    /// # Errors
    ///
    /// Returns [`TokenStoreError::NotFound`] when the key is absent.
    async fn update(&self, key: &TokenKey, tokens: &OAuthTokens) -> TokenStoreResult<()>;

    /// Deletes credentials. Deleting a missing key is not an error.
    async fn delete(&self, key: &TokenKey) -> TokenStoreResult<()>;

    /// Returns the custom variable values saved for a key; empty when none.
    async fn find_variables(&self, key: &TokenKey) -> TokenStoreResult<BTreeMap<String, String>>;

    /// Replaces the custom variable values for a key. An empty map removes
    /// them.
    async fn save_variables(
        &self,
        key: &TokenKey,
        values: &BTreeMap<String, String>,
    ) -> TokenStoreResult<()>;
}

/// Errors returned by token store implementations.
#[derive(Debug, Clone, Error)]
pub enum TokenStoreError {
    /// Credentials already exist for the key.
    #[error("tokens already stored for {0}")]
    AlreadyExists(TokenKey),

    /// No credentials exist for the key.
    #[error("no tokens stored for {0}")]
    NotFound(TokenKey),

    /// Backend failure.
    #[error("token store error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl TokenStoreError {
    /// Wraps a backend failure.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
