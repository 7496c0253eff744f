//! OAuth flow tracking for MCP servers that require user authorization.
//!
//! A connection attempt that hits an authorization-required response starts
//! an authorization flow here, parks on a linked tool flow, and resumes once
//! the browser callback has exchanged the code for tokens. Flow records live
//! in an external keyed store with its own expiry policy; this module only
//! uses flow ids as opaque lookup keys.
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Flow orchestration in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
