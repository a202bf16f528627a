//! Command Processing Module
//!
//! This module implements the command layer. It receives decoded RESP
//! frames, looks the command up in an immutable registry, and returns the
//! reply produced by the command.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  name + args, registry lookup
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ Command impls   │────>│ StorageEngine   │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value [NX|XX] [GET] [EX|PX|EXAT|PXAT n | KEEPTTL]`
//! - `GET key`
//! - `HELLO [protover [SETNAME name]]`
//! - `CLIENT SETINFO | SETNAME | GETNAME | ID`
//! - `PING [message]`

pub mod connection;
pub mod handler;
pub mod options;
pub mod registry;
pub mod string;

pub use handler::CommandHandler;
pub use registry::{Command, CommandContext, CommandRegistry};

use crate::config::ServerConfig;
use crate::storage::StorageEngine;
use std::sync::Arc;

/// Builds the registry of every command the server understands.
pub fn default_registry(storage: Arc<StorageEngine>, config: Arc<ServerConfig>) -> CommandRegistry {
    CommandRegistry::builder()
        .register("hello", connection::HelloCommand::new(config))
        .register("client", connection::ClientCommand)
        .register("ping", connection::PingCommand)
        .register("set", string::SetCommand::new(Arc::clone(&storage)))
        .register("get", string::GetCommand::new(storage))
        .build()
}
