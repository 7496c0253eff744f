//! Diesel row models for user-defined MCP servers.

use super::schema::mcp_user_servers;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Query result row.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = mcp_user_servers)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserServerRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: String,
    /// Server name.
    pub name: String,
    /// Configuration document.
    pub config: Value,
    /// Last recorded status.
    pub status: String,
    /// Last recorded error.
    pub error_message: Option<String>,
    /// Tool descriptors.
    pub tools: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Insert model.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = mcp_user_servers)]
pub struct NewUserServerRow {
    /// Record identifier.
    pub id: uuid::Uuid,
    /// Owning user.
    pub user_id: String,
    /// Server name.
    pub name: String,
    /// Configuration document.
    pub config: Value,
    /// Last recorded status.
    pub status: String,
    /// Last recorded error.
    pub error_message: Option<String>,
    /// Tool descriptors.
    pub tools: Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}
