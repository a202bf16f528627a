//! Per-connection metadata.

use std::collections::HashMap;

/// Metadata key under which the client's name is stored.
const NAME_KEY: &str = "name";

/// Identity and free-form metadata of one client connection.
///
/// Owned by the connection's handler task, so access never needs a lock.
/// Commands reach it through their
/// [`CommandContext`](crate::commands::CommandContext).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    id: u64,
    metadata: HashMap<String, String>,
}

impl ClientInfo {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            metadata: HashMap::new(),
        }
    }

    /// The connection id, unique for the lifetime of the server.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stores a metadata entry, returning the value it replaced.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.metadata.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.set(NAME_KEY, name);
    }

    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY)
    }

    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata() {
        let mut client = ClientInfo::new(3);
        assert_eq!(client.id(), 3);
        assert_eq!(client.name(), None);

        assert_eq!(client.set("lib-name", "redis-py"), None);
        assert_eq!(
            client.set("lib-name", "jedis"),
            Some("redis-py".to_string())
        );
        client.set_name("app");

        assert_eq!(client.get("lib-name"), Some("jedis"));
        assert_eq!(client.name(), Some("app"));
        assert_eq!(client.metadata().len(), 2);
    }
}
