//! Thread-Safe Storage Engine with Expiry Support
//!
//! This module implements the keyspace behind every command: a map from key
//! to [`Entry`], where an entry carries its value and an optional absolute
//! expiry timestamp in epoch milliseconds.
//!
//! ## Design Decisions
//!
//! 1. **One Lock**: A single `RwLock` guards the whole keyspace, so a value
//!    and its TTL are always read and written together.
//! 2. **Lazy Expiry**: Reads check the TTL and purge a stale entry on the spot.
//! 3. **Active Expiry**: [`StorageEngine::keys_chunk`] hands out random samples
//!    that the background sweeper feeds to
//!    [`StorageEngine::remove_if_expired_many`].
//! 4. **Dense Key Vector**: Keys are also kept in a `Vec` so sampling costs
//!    O(sample) rather than O(keyspace).
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │                RwLock<Keyspace>                       │  │
//! │  │  entries: HashMap<key, Slot{index, Entry}>            │  │
//! │  │  keys:    Vec<key>      (slot.index points here)      │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation takes the lock around in-memory work only and releases it
//! before returning, so operations on one key are totally ordered by lock
//! acquisition.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Represents a stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The actual value stored
    pub value: Bytes,
    /// Absolute expiry in epoch milliseconds (None = never expires)
    pub expire_at_millis: Option<i64>,
}

impl Entry {
    /// Checks if this entry has expired as of `now` (epoch ms).
    #[inline]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expire_at_millis.map(|exp| now >= exp).unwrap_or(false)
    }

    /// Checks if this entry has expired.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }
}

/// Conditions and TTL handling for [`StorageEngine::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Only write if the key does not currently exist (NX)
    pub if_not_exists: bool,
    /// Only write if the key currently exists (XX)
    pub if_exists: bool,
    /// Keep whatever TTL the key already had (KEEPTTL)
    pub keep_ttl: bool,
    /// New absolute expiry in epoch ms; ignored when `keep_ttl` is set
    pub expire_at_millis: Option<i64>,
}

/// What a [`StorageEngine::set`] call observed and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOutcome {
    /// The live value stored under the key before the call
    pub previous: Option<Bytes>,
    /// Whether the new value was written (false when NX/XX suppressed it)
    pub written: bool,
}

#[derive(Debug)]
struct Slot {
    index: usize,
    entry: Entry,
}

/// The map plus a dense key vector for random sampling.
#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<Bytes, Slot>,
    keys: Vec<Bytes>,
}

impl Keyspace {
    fn get(&self, key: &[u8]) -> Option<&Entry> {
        self.entries.get(key).map(|slot| &slot.entry)
    }

    fn insert(&mut self, key: Bytes, entry: Entry) {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.entry = entry;
            return;
        }
        let index = self.keys.len();
        self.keys.push(key.clone());
        self.entries.insert(key, Slot { index, entry });
    }

    fn remove(&mut self, key: &[u8]) -> Option<Entry> {
        let slot = self.entries.remove(key)?;
        self.keys.swap_remove(slot.index);

        // The former last key now lives at the removed slot's position.
        if let Some(moved) = self.keys.get(slot.index).cloned() {
            if let Some(moved_slot) = self.entries.get_mut(&moved) {
                moved_slot.index = slot.index;
            }
        }
        Some(slot.entry)
    }

    fn sample(&self, n: usize) -> Vec<Bytes> {
        let amount = n.min(self.keys.len());
        if amount == 0 {
            return Vec::new();
        }
        let mut rng = rand::thread_rng();
        rand::seq::index::sample(&mut rng, self.keys.len(), amount)
            .into_iter()
            .map(|i| self.keys[i].clone())
            .collect()
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Storage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// The main storage engine.
///
/// # Thread Safety
///
/// This struct is designed to be wrapped in an `Arc` and shared across
/// all client handler tasks and the expiry sweeper.
///
/// # Example
///
/// ```
/// use sparkkv::storage::{now_millis, SetOptions, StorageEngine};
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), SetOptions::default());
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// // Expires one minute from now
/// let options = SetOptions {
///     expire_at_millis: Some(now_millis() + 60_000),
///     ..Default::default()
/// };
/// engine.set(Bytes::from("session"), Bytes::from("abc123"), options);
/// ```
pub struct StorageEngine {
    keyspace: RwLock<Keyspace>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,

    /// Statistics: number of expired keys cleaned up
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        Self {
            keyspace: RwLock::new(Keyspace::default()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    /// Writes `value` under `key`, subject to `options`.
    ///
    /// - NX on a live key, or XX on a missing key, leaves the store untouched.
    /// - An expired key counts as missing.
    /// - With `keep_ttl` the key keeps its previous TTL (or lack of one);
    ///   otherwise the TTL becomes `expire_at_millis`.
    pub fn set(&self, key: Bytes, value: Bytes, options: SetOptions) -> SetOutcome {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let now = now_millis();
        let mut keyspace = self.keyspace.write();

        let mut previous = keyspace.get(&key).cloned();
        if previous.as_ref().is_some_and(|e| e.is_expired_at(now)) {
            keyspace.remove(&key);
            self.expired_count.fetch_add(1, Ordering::Relaxed);
            previous = None;
        }

        let exists = previous.is_some();
        if (options.if_not_exists && exists) || (options.if_exists && !exists) {
            return SetOutcome {
                previous: previous.map(|e| e.value),
                written: false,
            };
        }

        let expire_at_millis = if options.keep_ttl {
            previous.as_ref().and_then(|e| e.expire_at_millis)
        } else {
            options.expire_at_millis.filter(|&t| t > 0)
        };

        keyspace.insert(
            key,
            Entry {
                value,
                expire_at_millis,
            },
        );

        SetOutcome {
            previous: previous.map(|e| e.value),
            written: true,
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    /// This implements "lazy expiry" - expired keys are detected and removed on access.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_entry(key).map(|entry| entry.value)
    }

    /// Gets the full entry for a key (including its TTL).
    pub fn get_entry(&self, key: &[u8]) -> Option<Entry> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        // Fast path: read lock for live keys
        {
            let keyspace = self.keyspace.read();
            match keyspace.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Key exists but is expired - need write lock to remove it
        let mut keyspace = self.keyspace.write();
        match keyspace.get(key) {
            Some(entry) if entry.is_expired() => {}
            // Race: another writer replaced the key in between
            Some(entry) => return Some(entry.clone()),
            None => return None,
        }
        keyspace.remove(key);
        self.expired_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Remaining TTL for a key in milliseconds.
    ///
    /// # Returns
    ///
    /// - `Some(ms)` if the key exists and has an expiry
    /// - `Some(-1)` if the key exists but has no expiry
    /// - `None` if the key doesn't exist
    pub fn ttl_millis(&self, key: &[u8]) -> Option<i64> {
        self.get_entry(key).map(|entry| {
            entry
                .expire_at_millis
                .map(|exp| (exp - now_millis()).max(0))
                .unwrap_or(-1)
        })
    }

    /// Deletes a key and its TTL.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.keyspace.write().remove(key).is_some()
    }

    /// Deletes multiple keys under a single lock acquisition.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were deleted.
    pub fn remove_many(&self, keys: &[Bytes]) -> u64 {
        self.del_count.fetch_add(keys.len() as u64, Ordering::Relaxed);
        let mut keyspace = self.keyspace.write();
        keys.iter()
            .filter(|key| keyspace.remove(key).is_some())
            .count() as u64
    }

    /// Returns up to `n` keys sampled at random from the keyspace.
    ///
    /// The sample is unordered and may repeat keys across calls; it may also
    /// contain keys that are stored but already expired. It is meant as a
    /// cheap feed for the sweeper, not as an iteration primitive.
    pub fn keys_chunk(&self, n: usize) -> Vec<Bytes> {
        self.keyspace.read().sample(n)
    }

    /// Removes those of `keys` whose TTL has elapsed.
    ///
    /// # Returns
    ///
    /// Returns the number of keys that were removed.
    pub fn remove_if_expired_many(&self, keys: &[Bytes]) -> u64 {
        let now = now_millis();

        let expired: Vec<&Bytes> = {
            let keyspace = self.keyspace.read();
            keys.iter()
                .filter(|key| {
                    keyspace
                        .get(key)
                        .map(|entry| entry.is_expired_at(now))
                        .unwrap_or(false)
                })
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        // Re-check under the write lock: a key may have been overwritten since.
        let mut keyspace = self.keyspace.write();
        let mut removed = 0u64;
        for key in expired {
            let still_expired = keyspace
                .get(key)
                .map(|entry| entry.is_expired_at(now))
                .unwrap_or(false);
            if still_expired {
                keyspace.remove(key);
                removed += 1;
            }
        }

        self.expired_count.fetch_add(removed, Ordering::Relaxed);
        removed
    }

    /// Returns the number of stored keys, including expired keys not yet purged.
    pub fn len(&self) -> u64 {
        self.keyspace.read().len() as u64
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns database statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}
