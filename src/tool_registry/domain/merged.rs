//! Result of merging file-defined and user-defined server configuration.

use super::{McpServerId, ServerConfig, ServerKey, ServerName, UserId};
use std::collections::BTreeMap;

/// Where a merged entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// The operator's YAML file.
    File,
    /// A user's database record.
    User {
        /// Owning user.
        user_id: UserId,
        /// Record identifier.
        server_id: McpServerId,
    },
}

/// One entry of a [`MergedConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedServer {
    config: ServerConfig,
    origin: ConfigOrigin,
}

impl MergedServer {
    /// Creates a merged entry.
    #[must_use]
    pub const fn new(config: ServerConfig, origin: ConfigOrigin) -> Self {
        Self { config, origin }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the origin.
    #[must_use]
    pub const fn origin(&self) -> &ConfigOrigin {
        &self.origin
    }

    /// Returns whether the entry came from a user record.
    #[must_use]
    pub const fn is_user_defined(&self) -> bool {
        matches!(self.origin, ConfigOrigin::User { .. })
    }

    /// Returns the owning user of a user-defined entry.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        match &self.origin {
            ConfigOrigin::File => None,
            ConfigOrigin::User { user_id, .. } => Some(user_id),
        }
    }
}

/// Ordered map of every server that should be live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedConfig {
    servers: BTreeMap<ServerKey, MergedServer>,
}

impl MergedConfig {
    /// Creates an empty merge result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            servers: BTreeMap::new(),
        }
    }

    /// Inserts an entry, returning any entry it replaced.
    pub fn insert(&mut self, key: ServerKey, server: MergedServer) -> Option<MergedServer> {
        self.servers.insert(key, server)
    }

    /// Removes an entry.
    pub fn remove(&mut self, key: &ServerKey) -> Option<MergedServer> {
        self.servers.remove(key)
    }

    /// Looks up an entry.
    #[must_use]
    pub fn get(&self, key: &ServerKey) -> Option<&MergedServer> {
        self.servers.get(key)
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&ServerKey, &MergedServer)> {
        self.servers.iter()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Returns whether the merge produced no servers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Projects the merge onto server names, as seen by a single user.
    ///
    /// When a name exists both globally and for a user, the user entry wins.
    #[must_use]
    pub fn by_name(&self) -> BTreeMap<ServerName, &MergedServer> {
        let mut by_name = BTreeMap::new();
        for (key, server) in &self.servers {
            if key.is_global() && by_name.contains_key(key.name()) {
                continue;
            }
            by_name.insert(key.name().clone(), server);
        }
        by_name
    }
}

impl IntoIterator for MergedConfig {
    type Item = (ServerKey, MergedServer);
    type IntoIter = std::collections::btree_map::IntoIter<ServerKey, MergedServer>;

    fn into_iter(self) -> Self::IntoIter {
        self.servers.into_iter()
    }
}
