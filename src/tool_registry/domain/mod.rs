//! Domain model for MCP server configuration, runtime state and tools.
//!
//! The tool registry domain models server identity and scope, transport
//! configuration, the runtime status machine, discovered tool metadata and
//! the merged view of file and user configuration. Infrastructure concerns
//! remain outside this boundary.

mod error;
mod ids;
mod merged;
mod placeholders;
mod runtime;
mod server;
mod settings;
mod tool;
mod transport;
mod user_server;

pub use error::{ParseServerStatusError, ToolRegistryDomainError};
pub use ids::{McpServerId, ServerKey, ServerName, ServerScope, UserId};
pub use merged::{ConfigOrigin, MergedConfig, MergedServer};
pub use placeholders::{PlaceholderContext, contains_placeholder};
pub use runtime::{PendingOAuth, ServerRuntimeState, ServerStatus};
pub use server::{
    CustomUserVar, ServerConfig, ServerConfigDocument, ServerInstructions,
    ServerInstructionsValue,
};
pub use settings::McpSettings;
pub use tool::{CatalogTool, DEFAULT_TOOL_DELIMITER, ToolDescriptor, qualified_tool_name};
pub use transport::{
    McpTransport, RemoteTransportConfig, StderrMode, StdioTransportConfig, TransportKind,
};
pub use user_server::{PersistedUserServerData, UserServerRecord};
