//! Port contracts for MCP connection and tool lifecycle orchestration.

mod authorization;
mod cache;
mod file_config;
mod repository;
mod transport;

pub use authorization::AuthorizationBroker;
pub use cache::{CacheScope, CachedCatalog, ToolCacheError, ToolCacheResult, ToolCacheStore};
pub use file_config::{FileConfig, FileConfigError, FileConfigSource, FileServerMap};
pub use repository::{
    UserServerFilter, UserServerRepository, UserServerRepositoryError, UserServerRepositoryResult,
};
pub use transport::{
    ConnectRequest, McpConnection, McpConnector, RemoteTool, ToolCallResult, TransportError,
    TransportResult,
};

#[cfg(test)]
pub use authorization::MockAuthorizationBroker;
#[cfg(test)]
pub use cache::MockToolCacheStore;
#[cfg(test)]
pub use transport::MockMcpConnector;
