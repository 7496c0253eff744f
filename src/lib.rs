//! Gropius: MCP server connection and tool lifecycle management.
//!
//! This crate connects to Model Context Protocol servers over stdio,
//! WebSocket, SSE and streamable HTTP, discovers their tools and publishes
//! them in a catalog keyed by qualified tool name. Server definitions come
//! from an operator YAML file and from a per-user store; the two are merged
//! with user servers shadowing file servers of the same name.
//!
//! # Architecture
//!
//! Gropius follows hexagonal architecture principles:
//!
//! - **Domain**: Pure business logic with no infrastructure dependencies
//! - **Ports**: Abstract trait interfaces for external interactions
//! - **Adapters**: Concrete implementations of ports (transports, stores)
//!
//! # Modules
//!
//! - [`tool_registry`]: Server configuration, connections and the tool catalog
//! - [`oauth`]: Authorization flows for protected servers
//! - [`telemetry`]: Tracing setup for the binaries

pub mod oauth;
pub mod telemetry;
pub mod tool_registry;
