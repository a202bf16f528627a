//! Command Handler Module
//!
//! Turns a decoded frame into a registry lookup and returns the reply.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │   split()   │───>│   lookup    │───>│  execute()  │      │
//! │  └─────────────┘    └─────────────┘    └─────────────┘      │
//! │   name + args        CommandRegistry     Command impl       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! A frame is either an array whose first element names the command, or a
//! bare string naming a command with no arguments. Names are matched
//! case-insensitively.

use super::registry::{CommandContext, CommandRegistry};
use crate::config::ServerConfig;
use crate::connection::ClientInfo;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::debug;

/// Dispatches decoded frames to the registered commands.
///
/// Cloning is cheap: clones share the same registry.
#[derive(Clone, Debug)]
pub struct CommandHandler {
    registry: Arc<CommandRegistry>,
}

impl CommandHandler {
    /// Creates a handler serving the default command set.
    pub fn new(storage: Arc<StorageEngine>, config: Arc<ServerConfig>) -> Self {
        Self::with_registry(Arc::new(super::default_registry(storage, config)))
    }

    /// Creates a handler over an existing registry.
    pub fn with_registry(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Executes a command and returns the response.
    ///
    /// # Arguments
    ///
    /// * `frame` - The decoded request
    /// * `client` - Metadata of the calling connection
    pub fn execute(&self, frame: RespValue, client: &mut ClientInfo) -> RespValue {
        let (name, args) = match split_command(frame) {
            Ok(parts) => parts,
            Err(reply) => return reply,
        };

        debug!(
            conn_id = client.id(),
            command = %name,
            args = args.len(),
            "Executing command"
        );

        match self.registry.get(&name) {
            Some(command) => {
                let mut ctx = CommandContext {
                    name: &name,
                    args: &args,
                    client,
                };
                command.execute(&mut ctx)
            }
            None => RespValue::error_lossy(format!("ERR unknown command '{}'", name)),
        }
    }
}

/// Splits a frame into its lowercased command name and arguments.
fn split_command(frame: RespValue) -> Result<(String, Vec<RespValue>), RespValue> {
    let mut args = match frame {
        RespValue::Array(args) => args,
        bare @ (RespValue::SimpleString(_) | RespValue::BulkString(_)) => vec![bare],
        _ => return Err(RespValue::error("ERR invalid command format")),
    };

    if args.is_empty() {
        return Err(RespValue::error("ERR empty command"));
    }

    let name = match args[0].to_arg_string() {
        Some(name) => name.to_ascii_lowercase(),
        None => return Err(RespValue::error("ERR invalid command name")),
    };
    args.remove(0);

    Ok((name, args))
}
