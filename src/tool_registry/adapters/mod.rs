//! Adapter implementations for the tool registry ports.

pub mod memory;
pub mod postgres;
pub mod transport;

mod authorization;
mod file_config;

pub use file_config::{YamlFileConfigSource, parse_file_config};
pub use transport::JsonRpcConnector;
