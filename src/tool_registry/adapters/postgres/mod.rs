//! `PostgreSQL` adapter for user-defined MCP server persistence.

mod models;
mod repository;
mod schema;

pub use repository::{PostgresUserServerRepository, UserServerPgPool};
