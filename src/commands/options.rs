//! Option-Schema Parser
//!
//! Turns the trailing tokens of a command (`NX`, `EX 10`, ...) into named
//! flags and values according to a declared schema.
//!
//! Tokens are scanned left to right and matched case-insensitively against
//! the schema:
//!
//! - a flag records `true`
//! - a value option takes the next token verbatim as its value; if there is
//!   no next token, or the next token is itself a schema name, parsing fails
//! - anything else is an unknown argument
//!
//! Declared flags that never appear read as `false`. Value options that never
//! appear are absent; callers pick their own defaults.

use crate::protocol::RespValue;
use std::collections::HashMap;
use thiserror::Error;

/// Whether an option stands alone or carries a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    Flag,
    Value,
}

/// One named entry of an option schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptionSpec {
    pub name: &'static str,
    pub kind: OptionKind,
}

impl OptionSpec {
    pub const fn flag(name: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Flag,
        }
    }

    pub const fn value(name: &'static str) -> Self {
        Self {
            name,
            kind: OptionKind::Value,
        }
    }
}

/// Errors produced by [`parse_options`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// A token that names no option in the schema
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),

    /// A value option at the end of the input, or followed by another option name
    #[error("missing value for '{0}'")]
    MissingValue(&'static str),
}

/// The result of a successful parse, keyed by the schema's option names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOptions {
    flags: HashMap<&'static str, bool>,
    values: HashMap<&'static str, RespValue>,
}

impl ParsedOptions {
    /// Returns the flag's state; `false` for names not declared as flags.
    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Returns the token that followed a value option, if it was given.
    pub fn value(&self, name: &str) -> Option<&RespValue> {
        self.values.get(name)
    }
}

/// Parses `args` against `schema`.
///
/// # Example
///
/// ```
/// use sparkkv::commands::options::{parse_options, OptionSpec};
/// use sparkkv::protocol::RespValue;
///
/// let schema = [OptionSpec::flag("NX"), OptionSpec::value("EX")];
/// let args = [RespValue::bulk_string("ex"), RespValue::bulk_string("10")];
///
/// let parsed = parse_options(&args, &schema).unwrap();
/// assert!(!parsed.flag("NX"));
/// assert_eq!(parsed.value("EX"), Some(&RespValue::bulk_string("10")));
/// ```
pub fn parse_options(
    args: &[RespValue],
    schema: &[OptionSpec],
) -> Result<ParsedOptions, OptionError> {
    let mut parsed = ParsedOptions::default();

    let mut tokens = args.iter().peekable();
    while let Some(token) = tokens.next() {
        let spec = lookup(schema, token)
            .ok_or_else(|| OptionError::UnknownArgument(token_text(token)))?;

        match spec.kind {
            OptionKind::Flag => {
                parsed.flags.insert(spec.name, true);
            }
            OptionKind::Value => {
                let value = tokens
                    .next_if(|next| lookup(schema, next).is_none())
                    .ok_or(OptionError::MissingValue(spec.name))?;
                parsed.values.insert(spec.name, value.clone());
            }
        }
    }

    for spec in schema {
        if spec.kind == OptionKind::Flag {
            parsed.flags.entry(spec.name).or_insert(false);
        }
    }

    Ok(parsed)
}

fn lookup<'s>(schema: &'s [OptionSpec], token: &RespValue) -> Option<&'s OptionSpec> {
    let text = token.to_arg_string()?;
    schema
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(&text))
}

fn token_text(token: &RespValue) -> String {
    token
        .to_arg_string()
        .unwrap_or_else(|| token.to_string())
}
