//! Merging of file-defined and user-defined server configuration.

use crate::tool_registry::{
    domain::{ConfigOrigin, MergedConfig, MergedServer, ServerKey, UserId, UserServerRecord},
    ports::FileServerMap,
};
use tracing::warn;

/// Whose servers a merge covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeScope {
    /// File servers plus every user's enabled servers, as used at startup.
    Global,
    /// File servers as seen by one user, with that user's servers on top.
    User(UserId),
}

/// Pure merge of file and database configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationMerger;

impl ConfigurationMerger {
    /// Produces the merged configuration for `scope`.
    ///
    /// Disabled user records and records whose configuration no longer
    /// validates are left out. In a user scope a user server replaces the
    /// file server of the same name. With `override_mode` on, user records
    /// are ignored entirely.
    #[must_use]
    pub fn merge(
        file: &FileServerMap,
        user_servers: &[UserServerRecord],
        scope: &MergeScope,
        override_mode: bool,
    ) -> MergedConfig {
        let mut merged = MergedConfig::new();
        for (name, config) in file {
            merged.insert(
                ServerKey::global(name.clone()),
                MergedServer::new(config.clone(), ConfigOrigin::File),
            );
        }
        if override_mode {
            return merged;
        }

        for record in user_servers {
            if !record.is_enabled() {
                continue;
            }
            if let MergeScope::User(user_id) = scope
                && record.user_id() != user_id
            {
                continue;
            }
            if let Err(err) = record.config().validate() {
                warn!(
                    server = %record.key(),
                    error = %err,
                    "skipping user MCP server with invalid configuration"
                );
                continue;
            }

            if matches!(scope, MergeScope::User(_)) {
                merged.remove(&ServerKey::global(record.config().name().clone()));
            }
            merged.insert(
                record.key(),
                MergedServer::new(
                    record.config().clone(),
                    ConfigOrigin::User {
                        user_id: record.user_id().clone(),
                        server_id: record.id(),
                    },
                ),
            );
        }
        merged
    }
}
