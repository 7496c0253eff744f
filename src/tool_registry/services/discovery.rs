//! Tool discovery on a live connection.

use super::error::{ToolRegistryError, ToolRegistryResult};
use crate::tool_registry::{
    domain::{ServerKey, ToolDescriptor},
    ports::McpConnection,
};
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns `tools/list` results into tool descriptors.
#[derive(Debug)]
pub struct ToolDiscovery<C>
where
    C: Clock + Send + Sync,
{
    clock: Arc<C>,
}

impl<C> ToolDiscovery<C>
where
    C: Clock + Send + Sync,
{
    /// Creates a discovery service stamping tools with `clock`.
    #[must_use]
    pub const fn new(clock: Arc<C>) -> Self {
        Self { clock }
    }

    /// Lists the server's tools.
    ///
    /// Tools present in `previous` keep their enabled flag; new tools start
    /// enabled. Tools with blank names are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::ToolDiscovery`] when listing fails.
    pub async fn discover(
        &self,
        key: &ServerKey,
        connection: &dyn McpConnection,
        previous: &[ToolDescriptor],
    ) -> ToolRegistryResult<Vec<ToolDescriptor>> {
        let remote_tools =
            connection
                .list_tools()
                .await
                .map_err(|source| ToolRegistryError::ToolDiscovery {
                    server: key.clone(),
                    source,
                })?;

        let now = self.clock.utc();
        let mut tools = Vec::with_capacity(remote_tools.len());
        for remote in remote_tools {
            let descriptor = match ToolDescriptor::new(remote.name, remote.input_schema, now) {
                Ok(descriptor) => descriptor.with_description(remote.description),
                Err(err) => {
                    warn!(server = %key, error = %err, "ignoring malformed tool");
                    continue;
                }
            };
            let enabled = previous
                .iter()
                .find(|tool| tool.name() == descriptor.name())
                .is_none_or(ToolDescriptor::is_enabled);
            tools.push(descriptor.with_enabled(enabled));
        }
        debug!(server = %key, tool_count = tools.len(), "discovered MCP tools");
        Ok(tools)
    }
}
