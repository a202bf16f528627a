//! Command Registry
//!
//! A fixed table from lowercase command name to handler. The table is
//! assembled once through [`CommandRegistryBuilder`] and is read-only
//! afterwards, so it can be shared between connections without locking.

use crate::connection::ClientInfo;
use crate::protocol::RespValue;
use std::collections::HashMap;
use std::fmt;

/// Everything a handler sees for one invocation.
pub struct CommandContext<'a> {
    /// Lowercased command name, as looked up in the registry
    pub name: &'a str,
    /// Arguments following the command name
    pub args: &'a [RespValue],
    /// Metadata of the connection that issued the command
    pub client: &'a mut ClientInfo,
}

/// A command handler.
///
/// Handlers never fail: every outcome, including user errors, is expressed
/// as the reply they return.
pub trait Command: Send + Sync {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue;
}

/// Immutable lookup table of commands.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    pub fn builder() -> CommandRegistryBuilder {
        CommandRegistryBuilder::default()
    }

    /// Looks up a command by its lowercase name.
    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|cmd| cmd.as_ref())
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}

/// Collects commands before the registry is frozen.
#[derive(Default)]
pub struct CommandRegistryBuilder {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistryBuilder {
    /// Registers `command` under `name` (stored lowercase). A later
    /// registration of the same name replaces the earlier one.
    pub fn register(mut self, name: &str, command: impl Command + 'static) -> Self {
        self.commands
            .insert(name.to_ascii_lowercase(), Box::new(command));
        self
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
        }
    }
}

/// The reply for a command invoked with the wrong number of arguments.
pub fn wrong_arity(name: &str) -> RespValue {
    RespValue::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name
    ))
}

/// The reply for a malformed combination of options.
pub fn syntax_error() -> RespValue {
    RespValue::error("ERR syntax error")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Command for Echo {
        fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
            match ctx.args {
                [arg] => arg.clone(),
                _ => wrong_arity(ctx.name),
            }
        }
    }

    #[test]
    fn test_register_lowercases_names() {
        let registry = CommandRegistry::builder().register("ECHO", Echo).build();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("ECHO").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_execute_through_registry() {
        let registry = CommandRegistry::builder().register("echo", Echo).build();
        let mut client = ClientInfo::new(1);
        let args = [RespValue::bulk_string("hi")];
        let mut ctx = CommandContext {
            name: "echo",
            args: &args,
            client: &mut client,
        };

        let reply = registry.get("echo").unwrap().execute(&mut ctx);
        assert_eq!(reply, RespValue::bulk_string("hi"));

        ctx.args = &[];
        assert_eq!(
            registry.get("echo").unwrap().execute(&mut ctx),
            RespValue::error("ERR wrong number of arguments for 'echo' command")
        );
    }
}
