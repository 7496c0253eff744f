//! Live connections keyed by server.

use super::error::{ToolRegistryError, ToolRegistryResult};
use crate::tool_registry::{domain::ServerKey, ports::McpConnection};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// A registered connection.
pub type SharedConnection = Arc<dyn McpConnection>;

/// Holds at most one live connection per [`ServerKey`].
///
/// The map lock is never held across a disconnect: connections are evicted
/// first and closed afterwards.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    connections: RwLock<BTreeMap<ServerKey, SharedConnection>>,
}

impl ServerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the connection for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn get(&self, key: &ServerKey) -> ToolRegistryResult<Option<SharedConnection>> {
        let connections = self
            .connections
            .read()
            .map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(connections.get(key).cloned())
    }

    /// Registers `connection`, disconnecting any connection it replaces
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub async fn set(
        &self,
        key: ServerKey,
        connection: SharedConnection,
    ) -> ToolRegistryResult<()> {
        let previous = {
            let mut connections = self
                .connections
                .write()
                .map_err(|err| ToolRegistryError::lock(&err))?;
            connections.insert(key.clone(), connection)
        };
        if let Some(replaced) = previous {
            debug!(server = %key, "replacing registered MCP connection");
            if let Err(err) = replaced.disconnect().await {
                warn!(server = %key, error = %err, "failed to disconnect replaced MCP connection");
            }
        }
        Ok(())
    }

    /// Evicts and disconnects the connection for `key`.
    ///
    /// Returns whether a connection was registered.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Teardown`] when the disconnect fails; the
    /// connection is evicted regardless.
    pub async fn remove(&self, key: &ServerKey) -> ToolRegistryResult<bool> {
        let evicted = {
            let mut connections = self
                .connections
                .write()
                .map_err(|err| ToolRegistryError::lock(&err))?;
            connections.remove(key)
        };
        let Some(connection) = evicted else {
            return Ok(false);
        };
        connection
            .disconnect()
            .await
            .map_err(|source| ToolRegistryError::Teardown {
                server: key.clone(),
                source,
            })?;
        Ok(true)
    }

    /// Returns every registered connection in key order.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn list_all(&self) -> ToolRegistryResult<Vec<(ServerKey, SharedConnection)>> {
        let connections = self
            .connections
            .read()
            .map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(connections
            .iter()
            .map(|(key, connection)| (key.clone(), Arc::clone(connection)))
            .collect())
    }

    /// Returns the registered keys.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn keys(&self) -> ToolRegistryResult<Vec<ServerKey>> {
        let connections = self
            .connections
            .read()
            .map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(connections.keys().cloned().collect())
    }

    /// Returns the number of registered connections.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn len(&self) -> ToolRegistryResult<usize> {
        let connections = self
            .connections
            .read()
            .map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(connections.len())
    }

    /// Removes every connection without disconnecting it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Runtime`] when the lock is poisoned.
    pub fn drain(&self) -> ToolRegistryResult<Vec<(ServerKey, SharedConnection)>> {
        let mut connections = self
            .connections
            .write()
            .map_err(|err| ToolRegistryError::lock(&err))?;
        Ok(std::mem::take(&mut *connections).into_iter().collect())
    }
}
