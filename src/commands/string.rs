//! String Commands
//!
//! - `GET key`
//! - `SET key value [NX | XX] [GET] [EX s | PX ms | EXAT ts | PXAT ts-ms | KEEPTTL]`

use super::options::{parse_options, OptionSpec, ParsedOptions};
use super::registry::{syntax_error, wrong_arity, Command, CommandContext};
use crate::protocol::RespValue;
use crate::storage::{now_millis, SetOptions, StorageEngine};
use std::sync::Arc;

const SET_SCHEMA: &[OptionSpec] = &[
    OptionSpec::flag("NX"),
    OptionSpec::flag("XX"),
    OptionSpec::flag("GET"),
    OptionSpec::flag("KEEPTTL"),
    OptionSpec::value("EX"),
    OptionSpec::value("PX"),
    OptionSpec::value("EXAT"),
    OptionSpec::value("PXAT"),
];

/// The mutually exclusive expiry options of SET.
const EXPIRY_OPTIONS: [&str; 4] = ["EX", "PX", "EXAT", "PXAT"];

/// SET key value [options]
pub struct SetCommand {
    storage: Arc<StorageEngine>,
}

impl SetCommand {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }
}

impl Command for SetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
        if ctx.args.len() < 2 {
            return wrong_arity(ctx.name);
        }

        let (key, value) = match (ctx.args[0].to_arg_bytes(), ctx.args[1].to_arg_bytes()) {
            (Some(key), Some(value)) => (key, value),
            _ => return RespValue::error("ERR invalid key or value"),
        };

        let parsed = match parse_options(&ctx.args[2..], SET_SCHEMA) {
            Ok(parsed) => parsed,
            Err(e) => return RespValue::error_lossy(format!("ERR {}", e)),
        };

        let options = match set_options(&parsed, now_millis()) {
            Ok(options) => options,
            Err(reply) => return reply,
        };

        let outcome = self.storage.set(key, value, options);

        if !parsed.flag("GET") {
            RespValue::ok()
        } else if outcome.written {
            outcome.previous.into()
        } else {
            RespValue::null()
        }
    }
}

/// Validates the parsed SET options and resolves any expiry to an absolute
/// deadline relative to `now`.
fn set_options(parsed: &ParsedOptions, now: i64) -> Result<SetOptions, RespValue> {
    let if_not_exists = parsed.flag("NX");
    let if_exists = parsed.flag("XX");
    let keep_ttl = parsed.flag("KEEPTTL");

    if if_not_exists && if_exists {
        return Err(syntax_error());
    }

    let mut given = EXPIRY_OPTIONS
        .iter()
        .filter_map(|&name| parsed.value(name).map(|value| (name, value)));
    let expiry = given.next();
    if given.next().is_some() || (keep_ttl && expiry.is_some()) {
        return Err(syntax_error());
    }

    let expire_at_millis = match expiry {
        None => None,
        Some((name, value)) => Some(resolve_expiry(name, value, now).ok_or_else(invalid_expire)?),
    };

    Ok(SetOptions {
        if_not_exists,
        if_exists,
        keep_ttl,
        expire_at_millis,
    })
}

fn resolve_expiry(name: &str, value: &RespValue, now: i64) -> Option<i64> {
    let amount = value
        .to_arg_string()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|n| *n > 0)?;

    match name {
        "EX" => amount.checked_mul(1000)?.checked_add(now),
        "PX" => amount.checked_add(now),
        "EXAT" => amount.checked_mul(1000),
        "PXAT" => Some(amount),
        _ => None,
    }
}

fn invalid_expire() -> RespValue {
    RespValue::error("ERR invalid expire time in 'set' command")
}

/// GET key
pub struct GetCommand {
    storage: Arc<StorageEngine>,
}

impl GetCommand {
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }
}

impl Command for GetCommand {
    fn execute(&self, ctx: &mut CommandContext<'_>) -> RespValue {
        let [key] = ctx.args else {
            return wrong_arity(ctx.name);
        };
        match key.to_arg_bytes() {
            Some(key) => self.storage.get(&key).into(),
            None => RespValue::error("ERR invalid key"),
        }
    }
}
