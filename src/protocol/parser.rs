//! Incremental RESP3 Decoder
//!
//! The decoder reads one frame from the front of a buffer and reports how
//! many bytes that frame occupied, so a connection can advance its read
//! buffer past exactly one frame and keep the rest for the next call.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((value, consumed)))` - Successfully parsed a value, `consumed` bytes were used
//! - `Ok(None)` - Need more data, the frame is incomplete
//! - `Err(ParseError)` - The frame is structurally invalid
//!
//! An incomplete frame is retriable once more bytes arrive. An invalid frame
//! is fatal to that decode attempt only; the caller decides what to do with
//! the buffered bytes.
//!
//! Every line-terminated field is read up to the first CR, and that CR must
//! be followed by LF. A bare CR is a framing error.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Unknown type prefix byte
    #[error("unknown type prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid floating point format
    #[error("invalid double: {0}")]
    InvalidDouble(String),

    /// Boolean payload other than `t` or `f`
    #[error("invalid boolean: {0}")]
    InvalidBoolean(String),

    /// Invalid UTF-8 in a simple string or error message
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array or map length is negative (but not -1 for null)
    #[error("invalid aggregate length: {0}")]
    InvalidAggregateLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("{0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum aggregate nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

type Parsed = Option<(RespValue, usize)>;

/// An incremental RESP3 parser.
///
/// # Example
///
/// ```
/// use sparkkv::protocol::{RespParser, RespValue};
///
/// let parser = RespParser::new();
/// let buffer = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n+extra";
///
/// let (value, consumed) = parser.parse(buffer).unwrap().unwrap();
/// assert_eq!(consumed, 23);
/// assert!(matches!(value, RespValue::Array(_)));
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    max_bulk_len: usize,
    max_depth: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a new parser with the default limits.
    pub fn new() -> Self {
        Self {
            max_bulk_len: MAX_BULK_SIZE,
            max_depth: MAX_NESTING_DEPTH,
        }
    }

    /// Overrides the largest accepted bulk string.
    pub fn with_max_bulk_len(mut self, max_bulk_len: usize) -> Self {
        self.max_bulk_len = max_bulk_len;
        self
    }

    /// Attempts to parse one RESP frame from the front of the buffer.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Parsed> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        if buf.is_empty() {
            return Ok(None);
        }

        if depth > self.max_depth {
            return Err(ParseError::ProtocolError(format!(
                "maximum nesting depth exceeded: {}",
                self.max_depth
            )));
        }

        match buf[0] {
            prefix::SIMPLE_STRING => self.parse_simple_string(buf),
            prefix::ERROR => self.parse_error(buf),
            prefix::INTEGER => self.parse_integer(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::BOOLEAN => self.parse_boolean(buf),
            prefix::DOUBLE => self.parse_double(buf),
            prefix::NULL => self.parse_null(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            prefix::MAP => self.parse_map(buf, depth),
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Parses a simple string: `+<string>\r\n`
    fn parse_simple_string(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let s = single_line_text(line)?;
        Ok(Some((RespValue::SimpleString(s), consumed)))
    }

    /// Parses an error: `-<error message>\r\n`
    fn parse_error(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let s = single_line_text(line)?;
        Ok(Some((RespValue::Error(s), consumed)))
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let n = parse_i64(line)?;
        Ok(Some((RespValue::Integer(n), consumed)))
    }

    /// Parses a boolean: `#t\r\n` / `#f\r\n`
    fn parse_boolean(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let b = match line {
            b"t" => true,
            b"f" => false,
            other => {
                return Err(ParseError::InvalidBoolean(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };
        Ok(Some((RespValue::Boolean(b), consumed)))
    }

    /// Parses a double: `,<floating point>\r\n`
    fn parse_double(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
        let d: f64 = s
            .parse()
            .map_err(|_| ParseError::InvalidDouble(s.to_string()))?;
        Ok(Some((RespValue::Double(d), consumed)))
    }

    /// Parses a null: `_\r\n`
    fn parse_null(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        if !line.is_empty() {
            return Err(ParseError::ProtocolError(
                "null must not carry a payload".to_string(),
            ));
        }
        Ok(Some((RespValue::Null, consumed)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Parsed> {
        let Some((line, data_start)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let length = parse_i64(line)?;

        // RESP2 null bulk string
        if length == -1 {
            return Ok(Some((RespValue::Null, data_start)));
        }
        if length < 0 {
            return Err(ParseError::InvalidBulkLength(length));
        }

        let length = length as usize;
        if length > self.max_bulk_len {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_len,
            });
        }

        let data_end = data_start + length;
        let total_needed = data_end + CRLF.len();
        if buf.len() < total_needed {
            return Ok(None);
        }

        if &buf[data_end..total_needed] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string length does not match its content".to_string(),
            ));
        }

        let data = Bytes::copy_from_slice(&buf[data_start..data_end]);
        Ok(Some((RespValue::BulkString(data), total_needed)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        let Some((count, mut consumed)) = self.parse_count(buf)? else {
            return Ok(None);
        };
        let Some(count) = count else {
            return Ok(Some((RespValue::Null, consumed)));
        };

        let mut elements = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Some((value, used)) => {
                    elements.push(value);
                    consumed += used;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((RespValue::Array(elements), consumed)))
    }

    /// Parses a map: `%<count>\r\n<key><value>...`
    fn parse_map(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        let Some((count, mut consumed)) = self.parse_count(buf)? else {
            return Ok(None);
        };
        let Some(count) = count else {
            return Ok(Some((RespValue::Null, consumed)));
        };

        let mut pairs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let Some((key, used)) = self.parse_value(&buf[consumed..], depth + 1)? else {
                return Ok(None);
            };
            consumed += used;
            let Some((value, used)) = self.parse_value(&buf[consumed..], depth + 1)? else {
                return Ok(None);
            };
            consumed += used;
            pairs.push((key, value));
        }

        Ok(Some((RespValue::Map(pairs), consumed)))
    }

    /// Reads the count line of an aggregate. `Some(None)` is the RESP2 null (`-1`).
    #[allow(clippy::type_complexity)]
    fn parse_count(&self, buf: &[u8]) -> ParseResult<Option<(Option<usize>, usize)>> {
        let Some((line, consumed)) = read_line(buf, 1)? else {
            return Ok(None);
        };
        let count = parse_i64(line)?;
        if count == -1 {
            return Ok(Some((None, consumed)));
        }
        if count < 0 {
            return Err(ParseError::InvalidAggregateLength(count));
        }
        Ok(Some((Some(count as usize), consumed)))
    }
}

/// Reads the line starting at `start` up to the first CR.
///
/// Returns the line content (without CRLF) and the offset just past the LF,
/// or `None` if the terminator has not arrived yet.
fn read_line(buf: &[u8], start: usize) -> ParseResult<Option<(&[u8], usize)>> {
    let rest = &buf[start..];
    let Some(cr) = rest.iter().position(|&b| b == b'\r') else {
        return Ok(None);
    };
    match rest.get(cr + 1) {
        None => Ok(None),
        Some(b'\n') => Ok(Some((&rest[..cr], start + cr + 2))),
        Some(_) => Err(ParseError::ProtocolError(
            "CR not followed by LF".to_string(),
        )),
    }
}

fn single_line_text(line: &[u8]) -> ParseResult<String> {
    if line.contains(&b'\n') {
        return Err(ParseError::ProtocolError(
            "single-line value must not contain LF".to_string(),
        ));
    }
    std::str::from_utf8(line)
        .map(str::to_string)
        .map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

fn parse_i64(line: &[u8]) -> ParseResult<i64> {
    let s = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    s.parse()
        .map_err(|_| ParseError::InvalidInteger(s.to_string()))
}

/// Helper function to parse a single RESP message from bytes.
///
/// This is a convenience function for simple use cases.
pub fn parse_message(buf: &[u8]) -> ParseResult<Parsed> {
    RespParser::new().parse(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_string() {
        let input = b"+OK\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::SimpleString("OK".to_string()));
        assert_eq!(result.1, 5);
    }

    #[test]
    fn test_parse_simple_string_incomplete() {
        assert!(parse_message(b"+OK").unwrap().is_none());
        // CR seen but LF not yet arrived
        assert!(parse_message(b"+OK\r").unwrap().is_none());
    }

    #[test]
    fn test_bare_cr_is_rejected() {
        let result = parse_message(b"+O\rK\r\n");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_lf_inside_simple_string_is_rejected() {
        let result = parse_message(b"+O\nK\r\n");
        assert!(matches!(result, Err(ParseError::ProtocolError(_))));
    }

    #[test]
    fn test_parse_error() {
        let input = b"-ERR unknown command\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Error("ERR unknown command".to_string())
        );
        assert_eq!(result.1, 22);
    }

    #[test]
    fn test_parse_integer() {
        let input = b":1000\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::Integer(1000));
        assert_eq!(result.1, 7);
    }

    #[test]
    fn test_parse_negative_integer() {
        let input = b":-42\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::Integer(-42));
    }

    #[test]
    fn test_parse_boolean() {
        let (value, consumed) = parse_message(b"#t\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Boolean(true));
        assert_eq!(consumed, 4);

        let (value, _) = parse_message(b"#f\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Boolean(false));

        assert!(matches!(
            parse_message(b"#x\r\n"),
            Err(ParseError::InvalidBoolean(_))
        ));
    }

    #[test]
    fn test_parse_double() {
        let (value, _) = parse_message(b",3.25\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Double(3.25));

        let (value, _) = parse_message(b",-inf\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Double(f64::NEG_INFINITY));

        assert!(matches!(
            parse_message(b",abc\r\n"),
            Err(ParseError::InvalidDouble(_))
        ));
    }

    #[test]
    fn test_parse_null() {
        let (value, consumed) = parse_message(b"_\r\n").unwrap().unwrap();
        assert_eq!(value, RespValue::Null);
        assert_eq!(consumed, 3);
    }

    #[test]
    fn test_parse_bulk_string() {
        let input = b"$5\r\nhello\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::BulkString(Bytes::from("hello")));
        assert_eq!(result.1, 11);
    }

    #[test]
    fn test_parse_null_bulk_string() {
        let input = b"$-1\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::Null);
        assert_eq!(result.1, 5);
    }

    #[test]
    fn test_parse_empty_bulk_string() {
        let input = b"$0\r\n\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::BulkString(Bytes::from("")));
        assert_eq!(result.1, 6);
    }

    #[test]
    fn test_parse_bulk_string_incomplete() {
        let input = b"$5\r\nhel";
        assert!(parse_message(input).unwrap().is_none());
    }

    #[test]
    fn test_bulk_string_length_mismatch() {
        let input = b"$3\r\nhello\r\n";
        assert!(matches!(
            parse_message(input),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_bulk_string_too_large() {
        let parser = RespParser::new().with_max_bulk_len(4);
        assert!(matches!(
            parser.parse(b"$5\r\nhello\r\n"),
            Err(ParseError::MessageTooLarge { size: 5, max: 4 })
        ));
    }

    #[test]
    fn test_parse_array() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Array(vec![
                RespValue::BulkString(Bytes::from("GET")),
                RespValue::BulkString(Bytes::from("name")),
            ])
        );
        assert_eq!(result.1, 23);
    }

    #[test]
    fn test_parse_leaves_trailing_frame() {
        let input = b"+OK\r\n:1\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(value, RespValue::simple_string("OK"));
        let (next, _) = parse_message(&input[consumed..]).unwrap().unwrap();
        assert_eq!(next, RespValue::Integer(1));
    }

    #[test]
    fn test_parse_null_array() {
        let input = b"*-1\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::Null);
    }

    #[test]
    fn test_parse_empty_array() {
        let input = b"*0\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(result.0, RespValue::Array(vec![]));
    }

    #[test]
    fn test_parse_array_incomplete() {
        assert!(parse_message(b"*2\r\n:1\r\n").unwrap().is_none());
        assert!(parse_message(b"*2\r\n").unwrap().is_none());
    }

    #[test]
    fn test_parse_nested_array() {
        let input = b"*2\r\n:1\r\n*2\r\n:2\r\n:3\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::Array(vec![
                RespValue::Integer(1),
                RespValue::Array(vec![RespValue::Integer(2), RespValue::Integer(3),]),
            ])
        );
    }

    #[test]
    fn test_parse_map() {
        let input = b"%2\r\n+a\r\n:1\r\n+b\r\n#t\r\n";
        let (value, consumed) = parse_message(input).unwrap().unwrap();
        assert_eq!(
            value,
            RespValue::Map(vec![
                (RespValue::simple_string("a"), RespValue::Integer(1)),
                (RespValue::simple_string("b"), RespValue::Boolean(true)),
            ])
        );
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_map_missing_value_is_incomplete() {
        assert!(parse_message(b"%1\r\n+a\r\n").unwrap().is_none());
    }

    #[test]
    fn test_unknown_prefix() {
        assert!(matches!(
            parse_message(b"@invalid\r\n"),
            Err(ParseError::UnknownPrefix(b'@'))
        ));
    }

    #[test]
    fn test_parse_invalid_integer() {
        let input = b":not_a_number\r\n";
        let result = parse_message(input);
        assert!(matches!(result, Err(ParseError::InvalidInteger(_))));
    }

    #[test]
    fn test_nesting_depth_limit() {
        let mut input = Vec::new();
        for _ in 0..=MAX_NESTING_DEPTH + 1 {
            input.extend_from_slice(b"*1\r\n");
        }
        input.extend_from_slice(b":1\r\n");
        assert!(matches!(
            parse_message(&input),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_roundtrip() {
        let original = RespValue::Array(vec![
            RespValue::bulk_string(Bytes::from("SET")),
            RespValue::simple_string("key"),
            RespValue::integer(-7),
            RespValue::boolean(false),
            RespValue::double(0.1),
            RespValue::null(),
            RespValue::error("ERR nope"),
            RespValue::map(vec![(
                RespValue::bulk_string(Bytes::from("modules")),
                RespValue::array(vec![]),
            )]),
        ]);

        let serialized = original.serialize().unwrap();
        let (parsed, consumed) = parse_message(&serialized).unwrap().unwrap();
        assert_eq!(original, parsed);
        assert_eq!(consumed, serialized.len());
    }

    #[test]
    fn test_multiline_simple_string_roundtrips_as_bulk() {
        let original = RespValue::simple_string("a\r\nb\nc\r");
        let serialized = original.serialize().unwrap();
        let (parsed, _) = parse_message(&serialized).unwrap().unwrap();
        assert_eq!(parsed, RespValue::bulk_string(Bytes::from("a\r\nb\nc\r")));
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        // Bulk strings should handle binary data including null bytes
        let input = b"$5\r\nhel\x00o\r\n";
        let result = parse_message(input).unwrap().unwrap();
        assert_eq!(
            result.0,
            RespValue::BulkString(Bytes::from(&b"hel\x00o"[..]))
        );
    }
}
