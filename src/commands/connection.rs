//! Connection Commands
//!
//! Commands that concern the calling connection rather than the keyspace:
//!
//! - `PING [message]`
//! - `HELLO [protover [SETNAME name]]`
//! - `CLIENT SETINFO | SETNAME | GETNAME | ID`

use super::options::{parse_options, OptionSpec};
use super::registry::{wrong_arity, Command, CommandContext};
use crate::config::ServerConfig;
use crate::protocol::RespValue;
use std::sync::Arc;

/// PING [message]
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
        match ctx.args {
            [] => RespValue::pong(),
            [message] => match message.to_arg_bytes() {
                Some(message) => RespValue::bulk_string(message),
                None => RespValue::error("ERR invalid message"),
            },
            _ => wrong_arity(ctx.name),
        }
    }
}

const HELLO_SCHEMA: &[OptionSpec] = &[OptionSpec::value("SETNAME")];

/// HELLO [protover [SETNAME name]]
///
/// Replies with a map describing the server and the calling connection.
pub struct HelloCommand {
    config: Arc<ServerConfig>,
}

impl HelloCommand {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self { config }
    }

    fn server_info(&self, client_id: u64) -> RespValue {
        let field = |name: &str| RespValue::bulk_string(name.to_string());
        let text = |value: &str| RespValue::bulk_string(value.to_string());

        RespValue::map(vec![
            (field("server"), text(&self.config.server_name)),
            (field("version"), text(&self.config.version)),
            (field("proto"), RespValue::integer(self.config.proto_version)),
            (field("id"), RespValue::integer(client_id as i64)),
            (field("mode"), text(&self.config.mode)),
            (field("role"), text(&self.config.role)),
            (
                field("modules"),
                RespValue::array(self.config.modules.iter().map(|m| text(m)).collect()),
            ),
        ])
    }
}

impl Command for HelloCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
        if let Some((protover, rest)) = ctx.args.split_first() {
            let supported = protover
                .to_arg_string()
                .and_then(|s| s.parse::<i64>().ok())
                .is_some_and(|v| (2..=self.config.proto_version).contains(&v));
            if !supported {
                return RespValue::error("NOPROTO unsupported protocol version");
            }

            let parsed = match parse_options(rest, HELLO_SCHEMA) {
                Ok(parsed) => parsed,
                Err(e) => return RespValue::error_lossy(format!("ERR {}", e)),
            };
            if let Some(name) = parsed.value("SETNAME") {
                match name.to_arg_string() {
                    Some(name) => ctx.client.set_name(name),
                    None => return RespValue::error("ERR invalid client name"),
                }
            }
        }

        self.server_info(ctx.client.id())
    }
}

/// CLIENT subcommand [arguments]
pub struct ClientCommand;

impl ClientCommand {
    fn setinfo(ctx: &mut CommandContext<'_>, args: &[RespValue]) -> RespValue {
        if args.len() < 2 {
            return wrong_arity("client|setinfo");
        }

        let mut parts = Vec::with_capacity(args.len());
        for arg in args {
            match arg.to_arg_string() {
                Some(part) => parts.push(part),
                None => return RespValue::error("ERR invalid client info"),
            }
        }

        let attribute = parts.remove(0);
        ctx.client.set(attribute, parts.join(" "));
        RespValue::ok()
    }
}

impl Command for ClientCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
        let Some((sub, args)) = ctx.args.split_first() else {
            return wrong_arity(ctx.name);
        };
        let sub = sub.to_arg_string().unwrap_or_default();

        match sub.to_ascii_lowercase().as_str() {
            "setinfo" => Self::setinfo(ctx, args),
            "setname" => match args {
                [name] => match name.to_arg_string() {
                    Some(name) => {
                        ctx.client.set_name(name);
                        RespValue::ok()
                    }
                    None => RespValue::error("ERR invalid client name"),
                },
                _ => wrong_arity("client|setname"),
            },
            "getname" => match args {
                [] => ctx
                    .client
                    .name()
                    .map(|name| RespValue::bulk_string(name.to_string()))
                    .unwrap_or_else(RespValue::null),
                _ => wrong_arity("client|getname"),
            },
            "id" => match args {
                [] => RespValue::integer(ctx.client.id() as i64),
                _ => wrong_arity("client|id"),
            },
            _ => RespValue::error_lossy(format!("ERR unknown subcommand '{}'", sub)),
        }
    }
}
