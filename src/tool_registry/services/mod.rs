//! Application services for MCP connection and tool lifecycle.
//!
//! [`LifecycleController`] owns live connections, runtime states and the
//! tool catalog. [`McpServerService`] layers user-server management on top
//! of it. The remaining services are the building blocks the controller
//! composes.

mod catalog;
mod discovery;
mod error;
mod lifecycle;
mod merge;
mod registry;
mod servers;

pub use catalog::{CatalogView, ToolCatalog};
pub use discovery::ToolDiscovery;
pub use error::{ErrorKind, ToolRegistryError, ToolRegistryResult};
pub use lifecycle::{
    InitializeReport, LifecycleController, ManagedServer, RefreshReport, SYSTEM_USER,
    ServerOutcome, TeardownReport, TestConnectionReport,
};
pub use merge::{ConfigurationMerger, MergeScope};
pub use registry::{ServerRegistry, SharedConnection};
pub use servers::{McpServerService, ServerQuery, ServerStats, ServerView};
