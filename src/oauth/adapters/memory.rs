//! In-memory flow-state and token stores.

use crate::oauth::{
    domain::{FlowId, OAuthFlowState, OAuthTokens, TokenKey},
    ports::{
        FlowStateStore, FlowStoreError, FlowStoreResult, TokenStore, TokenStoreError,
        TokenStoreResult,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Flow-state store that expires entries against an injected clock.
#[derive(Clone)]
pub struct InMemoryFlowStateStore<C>
where
    C: Clock + Send + Sync,
{
    entries: Arc<RwLock<HashMap<FlowId, StoredFlow>>>,
    clock: Arc<C>,
}

#[derive(Debug, Clone)]
struct StoredFlow {
    state: OAuthFlowState,
    expires_at: DateTime<Utc>,
}

impl<C> InMemoryFlowStateStore<C>
where
    C: Clock + Send + Sync,
{
    /// Creates an empty store.
    #[must_use]
    pub fn new(clock: Arc<C>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    fn lock_error(err: impl ToString) -> FlowStoreError {
        FlowStoreError::backend(std::io::Error::other(err.to_string()))
    }
}

#[async_trait]
impl<C> FlowStateStore for InMemoryFlowStateStore<C>
where
    C: Clock + Send + Sync,
{
    async fn get(&self, flow_id: &FlowId) -> FlowStoreResult<Option<OAuthFlowState>> {
        let now = self.clock.utc();
        let entries = self.entries.read().map_err(Self::lock_error)?;
        Ok(entries
            .get(flow_id)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.state.clone()))
    }

    async fn put(&self, state: &OAuthFlowState, ttl: Duration) -> FlowStoreResult<()> {
        let now = self.clock.utc();
        let ttl_delta = chrono::Duration::from_std(ttl).map_err(FlowStoreError::backend)?;
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        entries.retain(|_, stored| stored.expires_at > now);
        entries.insert(
            state.flow_id().clone(),
            StoredFlow {
                state: state.clone(),
                expires_at: now + ttl_delta,
            },
        );
        Ok(())
    }

    async fn delete(&self, flow_id: &FlowId) -> FlowStoreResult<()> {
        let mut entries = self.entries.write().map_err(Self::lock_error)?;
        entries.remove(flow_id);
        Ok(())
    }
}

/// Token store backed by maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: Arc<RwLock<HashMap<TokenKey, OAuthTokens>>>,
    variables: Arc<RwLock<HashMap<TokenKey, BTreeMap<String, String>>>>,
}

impl InMemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error(err: impl ToString) -> TokenStoreError {
        TokenStoreError::backend(std::io::Error::other(err.to_string()))
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn find(&self, key: &TokenKey) -> TokenStoreResult<Option<OAuthTokens>> {
        let tokens = self.tokens.read().map_err(Self::lock_error)?;
        Ok(tokens.get(key).cloned())
    }

    async fn create(&self, key: &TokenKey, tokens: &OAuthTokens) -> TokenStoreResult<()> {
        let mut stored = self.tokens.write().map_err(Self::lock_error)?;
        if stored.contains_key(key) {
            return Err(TokenStoreError::AlreadyExists(key.clone()));
        }
        stored.insert(key.clone(), tokens.clone());
        Ok(())
    }

    async fn update(&self, key: &TokenKey, tokens: &OAuthTokens) -> TokenStoreResult<()> {
        let mut stored = self.tokens.write().map_err(Self::lock_error)?;
        let entry = stored
            .get_mut(key)
            .ok_or_else(|| TokenStoreError::NotFound(key.clone()))?;
        *entry = tokens.clone();
        Ok(())
    }

    async fn delete(&self, key: &TokenKey) -> TokenStoreResult<()> {
        let mut stored = self.tokens.write().map_err(Self::lock_error)?;
        stored.remove(key);
        Ok(())
    }

    async fn find_variables(&self, key: &TokenKey) -> TokenStoreResult<BTreeMap<String, String>> {
        let variables = self.variables.read().map_err(Self::lock_error)?;
        Ok(variables.get(key).cloned().unwrap_or_default())
    }

    async fn save_variables(
        &self,
        key: &TokenKey,
        values: &BTreeMap<String, String>,
    ) -> TokenStoreResult<()> {
        let mut variables = self.variables.write().map_err(Self::lock_error)?;
        if values.is_empty() {
            variables.remove(key);
        } else {
            variables.insert(key.clone(), values.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::domain::FlowMetadata;
    use chrono::Local;
    use std::sync::Mutex;

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().expect("clock lock");
            *now += chrono::Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn local(&self) -> DateTime<Local> {
            self.utc().with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            *self.0.lock().expect("clock lock")
        }
    }

    #[tokio::test]
    async fn flow_expires_after_ttl() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock(Mutex::new(start)));
        let store = InMemoryFlowStateStore::new(clock.clone());
        let flow_id = FlowId::new("alice:github:n1");
        let state = OAuthFlowState::pending(
            flow_id.clone(),
            FlowMetadata::new("github", "alice"),
            start,
        );

        store
            .put(&state, Duration::from_secs(60))
            .await
            .expect("put should succeed");
        let fresh = store.get(&flow_id).await.expect("get should succeed");
        clock.advance(120);
        let expired = store.get(&flow_id).await.expect("get should succeed");

        assert!(fresh.is_some());
        assert!(expired.is_none());
    }

    #[tokio::test]
    async fn token_create_rejects_existing_key() {
        let store = InMemoryTokenStore::new();
        let key = TokenKey::new("alice", "github");
        store
            .create(&key, &OAuthTokens::bearer("one"))
            .await
            .expect("first create should succeed");

        let result = store.create(&key, &OAuthTokens::bearer("two")).await;

        assert!(matches!(result, Err(TokenStoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn token_update_requires_existing_key() {
        let store = InMemoryTokenStore::new();
        let result = store
            .update(&TokenKey::new("alice", "github"), &OAuthTokens::bearer("x"))
            .await;
        assert!(matches!(result, Err(TokenStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn saving_empty_variables_removes_them() {
        let store = InMemoryTokenStore::new();
        let key = TokenKey::new("alice", "github");
        let values = BTreeMap::from([(String::from("ORG"), String::from("acme"))]);
        store
            .save_variables(&key, &values)
            .await
            .expect("save should succeed");
        let saved = store.find_variables(&key).await.expect("find should succeed");

        store
            .save_variables(&key, &BTreeMap::new())
            .await
            .expect("clear should succeed");
        let cleared = store.find_variables(&key).await.expect("find should succeed");

        assert_eq!(saved, values);
        assert!(cleared.is_empty());
    }
}
