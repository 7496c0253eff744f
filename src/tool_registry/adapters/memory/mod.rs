//! In-memory adapters for the tool registry ports.

mod connector;
mod tool_cache;
mod user_servers;

pub use connector::{ScriptedConnector, ServerScript, remote_tool};
pub use tool_cache::InMemoryToolCacheStore;
pub use user_servers::InMemoryUserServerRepository;
