//! Diesel schema for user-defined MCP server persistence.

diesel::table! {
    /// MCP servers owned by individual users.
    mcp_user_servers (id) {
        /// Record identifier.
        id -> Uuid,
        /// Owning user.
        #[max_length = 255]
        user_id -> Varchar,
        /// Server name, unique per user.
        #[max_length = 100]
        name -> Varchar,
        /// Server configuration in its camelCase document form.
        config -> Jsonb,
        /// Last recorded status (`unknown`, `connecting`, `online`, `offline`, `error`).
        #[max_length = 50]
        status -> Varchar,
        /// Error from the last failed connection.
        error_message -> Nullable<Text>,
        /// Discovered tools with their enabled overrides.
        tools -> Jsonb,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}
