//! RESP3 Data Types and Encoder
//!
//! This module defines the values carried by the wire protocol and how each
//! of them is written to the wire. Every frame starts with a one-byte tag:
//!
//! - `+` Simple String
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String
//! - `#` Boolean
//! - `,` Double
//! - `_` Null
//! - `*` Array
//! - `%` Map
//!
//! Scalars end with CRLF (`\r\n`); composite types carry an element or pair
//! count and are followed by their children, encoded recursively.
//!
//! ## Examples
//!
//! Simple String: `+OK\r\n`
//! Error: `-ERR unknown command\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Boolean: `#t\r\n`
//! Null: `_\r\n`
//! Array: `*2\r\n$3\r\nGET\r\n$4\r\nname\r\n`
//! Map: `%1\r\n+proto\r\n:3\r\n`

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const BOOLEAN: u8 = b'#';
    pub const DOUBLE: u8 = b',';
    pub const NULL: u8 = b'_';
    pub const ARRAY: u8 = b'*';
    pub const MAP: u8 = b'%';
}

/// Errors raised while encoding a value.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Error text must fit on a single line.
    #[error("error message must not contain CR or LF: {0:?}")]
    MultilineError(String),
}

/// A single value on the wire.
///
/// Requests arrive as arrays of bulk strings; replies can be any variant.
#[derive(Debug, Clone)]
pub enum RespValue {
    /// Single-line, non binary-safe string.
    /// Format: `+<string>\r\n`
    ///
    /// A simple string holding CR or LF is written as a bulk string instead.
    SimpleString(String),

    /// Error reply. Must not contain CR or LF.
    /// Format: `-<error message>\r\n`
    Error(String),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),

    /// Binary-safe string.
    /// Format: `$<length>\r\n<data>\r\n`
    BulkString(Bytes),

    /// Format: `#t\r\n` or `#f\r\n`
    Boolean(bool),

    /// Format: `,<floating point>\r\n`
    Double(f64),

    /// Format: `_\r\n`. The RESP2 null forms `$-1\r\n` and `*-1\r\n`
    /// decode to this variant too.
    Null,

    /// Format: `*<count>\r\n<element1><element2>...`
    Array(Vec<RespValue>),

    /// Format: `%<count>\r\n<key1><value1><key2><value2>...`
    ///
    /// Pair order carries no meaning; equality ignores it.
    Map(Vec<(RespValue, RespValue)>),
}

impl PartialEq for RespValue {
    fn eq(&self, other: &Self) -> bool {
        use RespValue::*;
        match (self, other) {
            (SimpleString(a), SimpleString(b)) => a == b,
            (Error(a), Error(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (BulkString(a), BulkString(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Null, Null) => true,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                // Each pair in `b` may match at most one pair in `a`
                let mut matched = vec![false; b.len()];
                a.iter().all(|pair| {
                    match (0..b.len()).find(|&i| !matched[i] && &b[i] == pair) {
                        Some(i) => {
                            matched[i] = true;
                            true
                        }
                        None => false,
                    }
                })
            }
            _ => false,
        }
    }
}

impl RespValue {
    /// Creates a new simple string response.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let ok = RespValue::simple_string("OK");
    /// ```
    pub fn simple_string(s: impl Into<String>) -> Self {
        RespValue::SimpleString(s.into())
    }

    /// Creates a new error response.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let err = RespValue::error("ERR unknown command");
    /// ```
    pub fn error(s: impl Into<String>) -> Self {
        RespValue::Error(s.into())
    }

    /// Creates an error response whose text may echo client input.
    ///
    /// CR and LF are replaced with spaces so the reply always encodes.
    pub fn error_lossy(s: impl Into<String>) -> Self {
        let mut text = s.into();
        if has_line_break(text.as_bytes()) {
            text = text.replace(['\r', '\n'], " ");
        }
        RespValue::Error(text)
    }

    /// Creates a new integer response.
    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// Creates a new bulk string response.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let bulk = RespValue::bulk_string(Bytes::from("hello"));
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    pub fn boolean(b: bool) -> Self {
        RespValue::Boolean(b)
    }

    pub fn double(d: f64) -> Self {
        RespValue::Double(d)
    }

    /// Creates a null response.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Creates an array response.
    pub fn array(values: Vec<RespValue>) -> Self {
        RespValue::Array(values)
    }

    /// Creates a map response from key/value pairs.
    pub fn map(pairs: Vec<(RespValue, RespValue)>) -> Self {
        RespValue::Map(pairs)
    }

    /// Common response for successful operations
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// Common response for PONG
    pub fn pong() -> Self {
        RespValue::SimpleString("PONG".to_string())
    }

    /// Serializes the value to bytes for sending over the wire.
    ///
    /// Fails only for an [`RespValue::Error`] (at any depth) whose text
    /// contains CR or LF.
    pub fn serialize(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf)?;
        Ok(buf)
    }

    /// Serializes the value into an existing buffer.
    ///
    /// On error the buffer may hold a partially written frame; callers that
    /// reuse the buffer should truncate it.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            RespValue::SimpleString(s) => {
                if has_line_break(s.as_bytes()) {
                    write_bulk(buf, s.as_bytes());
                } else {
                    buf.push(prefix::SIMPLE_STRING);
                    buf.extend_from_slice(s.as_bytes());
                    buf.extend_from_slice(CRLF);
                }
            }
            RespValue::Error(s) => {
                if has_line_break(s.as_bytes()) {
                    return Err(EncodeError::MultilineError(s.clone()));
                }
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::BulkString(data) => write_bulk(buf, data),
            RespValue::Boolean(b) => {
                buf.push(prefix::BOOLEAN);
                buf.push(if *b { b't' } else { b'f' });
                buf.extend_from_slice(CRLF);
            }
            RespValue::Double(d) => {
                buf.push(prefix::DOUBLE);
                buf.extend_from_slice(format_double(*d).as_bytes());
                buf.extend_from_slice(CRLF);
            }
            RespValue::Null => {
                buf.push(prefix::NULL);
                buf.extend_from_slice(CRLF);
            }
            RespValue::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf)?;
                }
            }
            RespValue::Map(pairs) => {
                buf.push(prefix::MAP);
                buf.extend_from_slice(pairs.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for (key, value) in pairs {
                    key.serialize_into(buf)?;
                    value.serialize_into(buf)?;
                }
            }
        }
        Ok(())
    }

    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }

    /// Returns true if this value is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Attempts to extract the inner string from SimpleString or BulkString.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Attempts to extract the inner bytes from BulkString.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Attempts to extract the inner integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Attempts to extract the inner array.
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Returns the value as raw argument bytes.
    ///
    /// Command arguments are normally bulk strings, but simple strings and
    /// integers are accepted as well.
    pub fn to_arg_bytes(&self) -> Option<Bytes> {
        match self {
            RespValue::BulkString(b) => Some(b.clone()),
            RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
            RespValue::Integer(n) => Some(Bytes::from(n.to_string())),
            _ => None,
        }
    }

    /// Returns the value as a UTF-8 argument string.
    pub fn to_arg_string(&self) -> Option<String> {
        match self {
            RespValue::Integer(n) => Some(n.to_string()),
            other => other.as_str().map(str::to_string),
        }
    }
}

#[inline]
fn has_line_break(s: &[u8]) -> bool {
    s.iter().any(|&b| b == b'\r' || b == b'\n')
}

fn write_bulk(buf: &mut Vec<u8>, data: &[u8]) {
    buf.push(prefix::BULK_STRING);
    buf.extend_from_slice(data.len().to_string().as_bytes());
    buf.extend_from_slice(CRLF);
    buf.extend_from_slice(data);
    buf.extend_from_slice(CRLF);
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".to_string()
    } else if d == f64::INFINITY {
        "inf".to_string()
    } else if d == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        // Display for f64 prints the shortest string that parses back exactly.
        d.to_string()
    }
}

impl From<Bytes> for RespValue {
    fn from(data: Bytes) -> Self {
        RespValue::BulkString(data)
    }
}

impl From<Option<Bytes>> for RespValue {
    fn from(data: Option<Bytes>) -> Self {
        data.map(RespValue::BulkString).unwrap_or(RespValue::Null)
    }
}

impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "\"{}\"", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            RespValue::Boolean(b) => write!(f, "({})", b),
            RespValue::Double(d) => write!(f, "(double) {}", format_double(*d)),
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    writeln!(f)?;
                    for (i, v) in values.iter().enumerate() {
                        writeln!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
            RespValue::Map(pairs) => {
                if pairs.is_empty() {
                    write!(f, "(empty hash)")
                } else {
                    writeln!(f)?;
                    for (i, (k, v)) in pairs.iter().enumerate() {
                        writeln!(f, "{}# {} => {}", i + 1, k, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
