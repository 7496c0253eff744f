//! MCP server connections and the tool catalog.
//!
//! Server configurations from the YAML file and the user store are merged,
//! connected through one of four transports and their tools published under
//! qualified names. The lifecycle controller keeps runtime status, live
//! connections and published tools consistent across refreshes, OAuth
//! parking and teardown. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
mod tests;
