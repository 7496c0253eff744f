//! Shared fixtures for in-memory adapter integration tests.

use gropius::tool_registry::{
    adapters::memory::InMemoryUserServerRepository,
    domain::{McpTransport, ServerConfig, ServerName, UserId},
};
use mockable::DefaultClock;
use rstest::fixture;
use std::io;
use tokio::runtime::Runtime;

/// Provides a tokio runtime for async operations in tests.
///
/// # Errors
///
/// Returns an error if the runtime cannot be created.
#[fixture]
pub fn runtime() -> io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}

/// Provides a fresh repository for each test.
#[fixture]
pub fn repo() -> InMemoryUserServerRepository {
    InMemoryUserServerRepository::new()
}

/// Provides a clock for record timestamps.
#[fixture]
pub fn clock() -> DefaultClock {
    DefaultClock
}

/// First test user.
#[fixture]
pub fn alice() -> UserId {
    UserId::new("alice").expect("valid user id")
}

/// Second test user.
#[fixture]
pub fn bob() -> UserId {
    UserId::new("bob").expect("valid user id")
}

/// Builds a stdio server configuration launching `<name>-mcp`.
pub fn stdio_config(name: &str) -> ServerConfig {
    ServerConfig::new(
        ServerName::new(name).expect("valid server name"),
        McpTransport::stdio(format!("{name}-mcp")).expect("valid transport"),
    )
}
