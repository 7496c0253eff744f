//! In-memory adapter integration tests.
//!
//! Tests are organized into modules by adapter:
//! - `user_server_repository_tests`: ownership, name uniqueness, filtering
//! - `tool_cache_tests`: scoped snapshots and invalidation

mod in_memory {
    pub mod helpers;

    mod tool_cache_tests;
    mod user_server_repository_tests;
}
