//! Storage Engine Module
//!
//! This module provides the keyspace and its expiry machinery: a
//! single-lock, TTL-aware map plus the background sweeper that purges
//! expired keys nobody reads.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │            RwLock<{ key -> (value, expire_at) }>            │
//! └─────────────────────────────────────────────────────────────┘
//!            ▲                               ▲
//!            │ get / set / remove            │ keys_chunk +
//!            │ (lazy expiry on read)         │ remove_if_expired_many
//!   ┌────────┴────────┐        ┌─────────────┴─────────────┐
//!   │ Command handlers│        │     ExpirySweeper         │
//!   └─────────────────┘        │  (supervised Tokio task)  │
//!                              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use sparkkv::storage::{now_millis, SetOptions, StorageEngine};
//! use bytes::Bytes;
//!
//! let engine = StorageEngine::new();
//!
//! // Basic operations
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), SetOptions::default());
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! // Only set if absent
//! let outcome = engine.set(
//!     Bytes::from("name"),
//!     Bytes::from("someone else"),
//!     SetOptions { if_not_exists: true, ..Default::default() },
//! );
//! assert!(!outcome.written);
//! ```

pub mod engine;
pub mod expiry;

// Re-export commonly used types
pub use engine::{now_millis, Entry, SetOptions, SetOutcome, StorageEngine, StorageStats};
pub use expiry::{ExpiryConfig, ExpirySource, ExpirySweeper};
