//! In-memory repository for user-defined MCP servers.

use crate::tool_registry::{
    domain::{McpServerId, ServerName, ServerStatus, ToolDescriptor, UserId, UserServerRecord},
    ports::{
        UserServerFilter, UserServerRepository, UserServerRepositoryError,
        UserServerRepositoryResult,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Thread-safe in-memory user-server repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserServerRepository {
    state: Arc<RwLock<InMemoryUserServerState>>,
}

#[derive(Debug, Default)]
struct InMemoryUserServerState {
    servers: HashMap<McpServerId, UserServerRecord>,
    name_index: HashMap<(UserId, ServerName), McpServerId>,
}

impl InMemoryUserServerState {
    fn owned_mut(
        &mut self,
        id: McpServerId,
        user_id: Option<&UserId>,
    ) -> UserServerRepositoryResult<&mut UserServerRecord> {
        self.servers
            .get_mut(&id)
            .filter(|record| user_id.is_none_or(|owner| record.user_id() == owner))
            .ok_or(UserServerRepositoryError::NotFound(id))
    }
}

fn index_key(record: &UserServerRecord) -> (UserId, ServerName) {
    (record.user_id().clone(), record.config().name().clone())
}

impl InMemoryUserServerRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error(err: impl ToString) -> UserServerRepositoryError {
        UserServerRepositoryError::persistence(std::io::Error::other(err.to_string()))
    }
}

#[async_trait]
impl UserServerRepository for InMemoryUserServerRepository {
    async fn list(
        &self,
        filter: &UserServerFilter,
    ) -> UserServerRepositoryResult<Vec<UserServerRecord>> {
        let state = self.state.read().map_err(Self::lock_error)?;
        let mut records: Vec<UserServerRecord> = state
            .servers
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        records.sort_by(|left, right| index_key(left).cmp(&index_key(right)));
        Ok(records)
    }

    async fn get(
        &self,
        id: McpServerId,
        user_id: &UserId,
    ) -> UserServerRepositoryResult<Option<UserServerRecord>> {
        let state = self.state.read().map_err(Self::lock_error)?;
        Ok(state
            .servers
            .get(&id)
            .filter(|record| record.user_id() == user_id)
            .cloned())
    }

    async fn create(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()> {
        let mut state = self.state.write().map_err(Self::lock_error)?;

        let key = index_key(record);
        if state.name_index.contains_key(&key) {
            let (user_id, name) = key;
            return Err(UserServerRepositoryError::DuplicateServerName { user_id, name });
        }

        state.name_index.insert(key, record.id());
        state.servers.insert(record.id(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &UserServerRecord) -> UserServerRepositoryResult<()> {
        let mut state = self.state.write().map_err(Self::lock_error)?;

        let stored_key = index_key(state.owned_mut(record.id(), Some(record.user_id()))?);
        let new_key = index_key(record);
        if new_key != stored_key {
            if let Some(&indexed_id) = state.name_index.get(&new_key)
                && indexed_id != record.id()
            {
                let (user_id, name) = new_key;
                return Err(UserServerRepositoryError::DuplicateServerName { user_id, name });
            }

            state.name_index.remove(&stored_key);
            state.name_index.insert(new_key, record.id());
        }

        state.servers.insert(record.id(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: McpServerId, user_id: &UserId) -> UserServerRepositoryResult<()> {
        let mut state = self.state.write().map_err(Self::lock_error)?;
        let stored_key = index_key(state.owned_mut(id, Some(user_id))?);
        state.name_index.remove(&stored_key);
        state.servers.remove(&id);
        Ok(())
    }

    async fn set_tools(
        &self,
        id: McpServerId,
        tools: &[ToolDescriptor],
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()> {
        let mut state = self.state.write().map_err(Self::lock_error)?;
        state.owned_mut(id, None)?.replace_tools(tools.to_vec(), at);
        Ok(())
    }

    async fn set_status(
        &self,
        id: McpServerId,
        status: ServerStatus,
        error_message: Option<&str>,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<()> {
        let mut state = self.state.write().map_err(Self::lock_error)?;
        state
            .owned_mut(id, None)?
            .record_status(status, error_message.map(str::to_owned), at);
        Ok(())
    }

    async fn toggle_enabled(
        &self,
        id: McpServerId,
        user_id: &UserId,
        enabled: bool,
        at: DateTime<Utc>,
    ) -> UserServerRepositoryResult<UserServerRecord> {
        let mut state = self.state.write().map_err(Self::lock_error)?;
        let record = state.owned_mut(id, Some(user_id))?;
        record.set_enabled(enabled, at);
        Ok(record.clone())
    }
}
