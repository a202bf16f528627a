//! Registry of live connections.
//!
//! The server registers every accepted connection here and receives a
//! [`ConnectionGuard`]. The entry disappears when the guard is dropped,
//! which happens exactly once, when the connection task ends (normally, by
//! error, or by panic).
//!
//! The registry has its own lock and never touches the keyspace lock.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// A snapshot of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

/// Live connections keyed by connection id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    live: Mutex<HashMap<u64, ConnectionInfo>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new connection. The entry lives as long as the guard.
    pub fn register(self: &Arc<Self>, id: u64, peer: SocketAddr) -> ConnectionGuard {
        self.live.lock().insert(
            id,
            ConnectionInfo {
                id,
                peer,
                connected_at: Instant::now(),
            },
        );

        ConnectionGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.live.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.lock().is_empty()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.live.lock().contains_key(&id)
    }

    /// Returns the live connections ordered by id.
    pub fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut connections: Vec<ConnectionInfo> = self.live.lock().values().cloned().collect();
        connections.sort_by_key(|c| c.id);
        connections
    }
}

/// Removes its connection from the registry when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    id: u64,
}

impl ConnectionGuard {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.live.lock().remove(&self.id);
    }
}
