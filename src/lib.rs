//! # SparkKV - An In-Memory, TTL-Aware Key-Value Cache Server
//!
//! SparkKV speaks RESP3, the Redis serialization protocol, so existing Redis
//! clients can connect to it. It stores binary-safe values under string
//! keys, with optional per-key expiry.
//!
//! ## Features
//!
//! - **RESP3 wire protocol**: incremental decoder, pipelining, HELLO handshake
//! - **TTL Support**: lazy expiry on read plus a supervised background sweeper
//! - **Async I/O**: built on Tokio, one task per connection
//! - **Per-connection metadata**: client names and library info via CLIENT
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SparkKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │TcpTransport │───>│ Connection  │───>│  Command    │                  │
//! │  │  (accept)   │    │  Handler    │    │  Registry   │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐    │
//! │  │   RESP3     │    │              StorageEngine                   │    │
//! │  │   Codec     │    │   RwLock<key -> (value, expire_at)>          │    │
//! │  └─────────────┘    └──────────────────────────────────────────────┘    │
//! │                                               ▲                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │   (supervised Tokio task, restarts on panic)    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use sparkkv::{Server, ServerConfig, TcpTransport};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::default();
//!     let mut transport = TcpTransport::new(config.bind_address());
//!     transport.listen_and_accept().await?;
//!
//!     let server = Server::new(config);
//!     server.serve(&mut transport).await;
//!     server.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [NX|XX] [GET] [EX|PX|EXAT|PXAT n | KEEPTTL]`
//! - `GET key`
//! - `HELLO [protover [SETNAME name]]`
//! - `CLIENT SETINFO | SETNAME | GETNAME | ID`
//! - `PING [message]`
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP3 value type, encoder and incremental decoder
//! - [`storage`]: TTL-aware keyspace and the expiry sweeper
//! - [`commands`]: option parser, command registry and command handlers
//! - [`connection`]: per-connection loop, client metadata, live registry
//! - [`server`]: TCP transport and the server that ties it all together
//! - [`config`]: file and command-line configuration
//!
//! ## Lazy + Active Expiry
//!
//! Keys with TTL are expired in two ways:
//! 1. **Lazy**: When a key is accessed, we check if it's expired
//! 2. **Active**: A background task samples keys and removes expired ones
//!
//! This ensures memory is reclaimed even for keys that are never accessed again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export main types for convenience
pub use commands::CommandHandler;
pub use config::{ConfigError, ServerConfig};
pub use connection::{ClientInfo, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::{CloseHandle, Server, TcpTransport};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// Version of SparkKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
