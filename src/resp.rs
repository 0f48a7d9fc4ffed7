//! RESP wire values and the codec that frames them.
//!
//! Decoding is incremental: [`RespValue::decode`] only consumes bytes from the
//! buffer once a complete top-level value is available, so callers can keep
//! appending socket reads to the same `BytesMut` until a frame is whole.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

const CRLF: &[u8] = b"\r\n";

/// Arrays nested deeper than this are rejected instead of recursed into.
pub const MAX_NESTING_DEPTH: usize = 128;
/// Same ceiling as Redis' `proto-max-bulk-len`.
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;
/// Longest header or simple line accepted before its CRLF arrives.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum RespError {
    #[error("invalid UTF-8 sequence")]
    InvalidUtf8,
    #[error("unknown RESP type '{0}'")]
    UnknownRespType(char),
    #[error("failed to parse integer")]
    FailedToParseInteger,
    #[error("invalid bulk string")]
    InvalidBulkString,
    #[error("invalid array")]
    InvalidArray,
    #[error("invalid null")]
    InvalidNull,
    #[error("arrays nested too deep")]
    NestingTooDeep,
    #[error("bulk string too large")]
    BulkStringTooLarge,
    #[error("line too long")]
    LineTooLong,
}

impl RespError {
    pub fn as_resp(&self) -> RespValue {
        RespValue::Error(format!("ERR Protocol error: {}", self))
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.as_resp().encode()).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+<text>\r\n`
    SimpleString(String),
    /// `-<message>\r\n`
    Error(String),
    /// `$<len>\r\n<bytes>\r\n`, `None` is the null bulk string `$-1\r\n`.
    BulkString(Option<Bytes>),
    /// `*<count>\r\n<items>`, `None` is the null array `*-1\r\n`.
    Array(Option<Vec<RespValue>>),
    /// `$<len>\r\n<bytes>` with no trailing CRLF. Write-only.
    RdbPayload(Bytes),
    /// `_\r\n`
    Nil,
}

impl RespValue {
    pub fn simple_string(text: impl Into<String>) -> Self {
        RespValue::SimpleString(text.into())
    }

    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    pub fn null_bulk_string() -> Self {
        RespValue::BulkString(None)
    }

    pub fn array(elements: Vec<RespValue>) -> Self {
        RespValue::Array(Some(elements))
    }

    /// Builds the array-of-bulk-strings form every client command uses.
    pub fn command(parts: &[&str]) -> Self {
        RespValue::Array(Some(
            parts
                .iter()
                .map(|part| RespValue::bulk_string(part.to_string()))
                .collect(),
        ))
    }

    /// Textual content of a simple or bulk string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RespValue::SimpleString(s) => Some(s.as_str()),
            RespValue::BulkString(Some(data)) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buffer = BytesMut::new();
        self.encode_into(&mut buffer);
        buffer.freeze()
    }

    fn encode_into(&self, buffer: &mut BytesMut) {
        match self {
            RespValue::SimpleString(s) => {
                buffer.put_u8(b'+');
                buffer.put_slice(s.as_bytes());
                buffer.put_slice(CRLF);
            }
            RespValue::Error(message) => {
                buffer.put_u8(b'-');
                buffer.put_slice(message.as_bytes());
                buffer.put_slice(CRLF);
            }
            RespValue::BulkString(Some(data)) => {
                buffer.put_slice(format!("${}\r\n", data.len()).as_bytes());
                buffer.put_slice(data);
                buffer.put_slice(CRLF);
            }
            RespValue::BulkString(None) => buffer.put_slice(b"$-1\r\n"),
            RespValue::Array(Some(elements)) => {
                buffer.put_slice(format!("*{}\r\n", elements.len()).as_bytes());

                for element in elements {
                    element.encode_into(buffer);
                }
            }
            RespValue::Array(None) => buffer.put_slice(b"*-1\r\n"),
            RespValue::RdbPayload(data) => {
                buffer.put_slice(format!("${}\r\n", data.len()).as_bytes());
                buffer.put_slice(data);
            }
            RespValue::Nil => buffer.put_slice(b"_\r\n"),
        }
    }

    /// Decodes every complete value currently in the buffer.
    pub fn parse(buffer: &mut BytesMut) -> Result<Vec<RespValue>, RespError> {
        let mut values = Vec::new();

        while let Some((value, _)) = Self::decode(buffer)? {
            values.push(value);
        }

        Ok(values)
    }

    /// Decodes one top-level value from the front of `buffer`.
    ///
    /// Returns `Ok(None)` and leaves the buffer untouched when the value is
    /// not complete yet. On success the consumed bytes are removed and their
    /// count is returned alongside the value.
    pub fn decode(buffer: &mut BytesMut) -> Result<Option<(RespValue, usize)>, RespError> {
        match parse_value(buffer, 0, 0)? {
            Some((value, consumed)) => {
                buffer.advance(consumed);
                Ok(Some((value, consumed)))
            }
            None => Ok(None),
        }
    }
}

/// Tracks how far a partially received frame has been checked, so each new
/// read only walks the bytes that arrived since the last call.
#[derive(Debug, Default)]
pub struct FrameScanner {
    position: usize,
    /// Elements still missing from each array that is open at `position`.
    pending: Vec<usize>,
}

enum Token {
    Incomplete,
    /// Something the decoder will reject; decoding reports the exact error.
    Invalid,
    Value(usize),
    Array(usize, usize),
}

impl FrameScanner {
    /// Returns `true` once `buffer` starts with a whole top-level value, or
    /// with a malformed one. Either way [`RespValue::decode`] will not return
    /// `Ok(None)` for it.
    pub fn scan(&mut self, buffer: &[u8]) -> bool {
        loop {
            let next = match scan_token(buffer, self.position, self.pending.len()) {
                Token::Incomplete => return false,
                Token::Invalid => return true,
                Token::Array(count, next) if count > 0 => {
                    self.pending.push(count);
                    self.position = next;
                    continue;
                }
                Token::Array(_, next) | Token::Value(next) => next,
            };

            self.position = next;

            loop {
                let Some(remaining) = self.pending.last_mut() else {
                    return true;
                };

                *remaining -= 1;
                if *remaining > 0 {
                    break;
                }

                self.pending.pop();
            }
        }
    }

    pub fn reset(&mut self) {
        self.position = 0;
        self.pending.clear();
    }
}

fn scan_token(buffer: &[u8], position: usize, depth: usize) -> Token {
    let Some(marker) = buffer.get(position) else {
        return Token::Incomplete;
    };

    let Some((line, next)) = read_line(buffer, position + 1) else {
        if buffer.len() - position > MAX_LINE_LENGTH {
            return Token::Invalid;
        }

        return Token::Incomplete;
    };

    match marker {
        b'+' | b'-' | b'_' => Token::Value(next),
        b'$' => match bulk_length(line) {
            Ok(None) => Token::Value(next),
            Ok(Some(length)) if buffer.len() >= next + length + CRLF.len() => {
                Token::Value(next + length + CRLF.len())
            }
            Ok(Some(_)) => Token::Incomplete,
            Err(_) => Token::Invalid,
        },
        b'*' if depth < MAX_NESTING_DEPTH => match parse_integer(line) {
            Ok(count) => Token::Array(usize::try_from(count).unwrap_or(0), next),
            Err(_) => Token::Invalid,
        },
        _ => Token::Invalid,
    }
}

/// Length of a bulk string header, `None` for the null bulk string.
fn bulk_length(line: &[u8]) -> Result<Option<usize>, RespError> {
    let length = parse_integer(line)?;

    if length == -1 {
        return Ok(None);
    }

    let length = usize::try_from(length).map_err(|_| RespError::InvalidBulkString)?;

    if length > MAX_BULK_LENGTH {
        return Err(RespError::BulkStringTooLarge);
    }

    Ok(Some(length))
}

fn parse_value(
    buffer: &[u8],
    position: usize,
    depth: usize,
) -> Result<Option<(RespValue, usize)>, RespError> {
    let Some(marker) = buffer.get(position) else {
        return Ok(None);
    };

    let Some((line, next)) = read_line(buffer, position + 1) else {
        if buffer.len() - position > MAX_LINE_LENGTH {
            return Err(RespError::LineTooLong);
        }

        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((RespValue::SimpleString(line_to_string(line)?), next))),
        b'-' => Ok(Some((RespValue::Error(line_to_string(line)?), next))),
        b'_' => {
            if !line.is_empty() {
                return Err(RespError::InvalidNull);
            }

            Ok(Some((RespValue::Nil, next)))
        }
        b'$' => {
            let Some(length) = bulk_length(line)? else {
                return Ok(Some((RespValue::BulkString(None), next)));
            };

            let end = next + length;

            if buffer.len() < end + CRLF.len() {
                return Ok(None);
            }

            if &buffer[end..end + CRLF.len()] != CRLF {
                return Err(RespError::InvalidBulkString);
            }

            let data = Bytes::copy_from_slice(&buffer[next..end]);
            Ok(Some((RespValue::BulkString(Some(data)), end + CRLF.len())))
        }
        b'*' => {
            if depth >= MAX_NESTING_DEPTH {
                return Err(RespError::NestingTooDeep);
            }

            let count = parse_integer(line)?;

            if count < 0 {
                return Ok(Some((RespValue::Array(None), next)));
            }

            let count = usize::try_from(count).map_err(|_| RespError::InvalidArray)?;
            let mut elements = Vec::with_capacity(count.min(1024));
            let mut cursor = next;

            while elements.len() < count {
                match parse_value(buffer, cursor, depth + 1)? {
                    Some((element, after)) => {
                        elements.push(element);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((RespValue::Array(Some(elements)), cursor)))
        }
        other => Err(RespError::UnknownRespType(*other as char)),
    }
}

/// Returns the line starting at `start` without its CRLF, and the index just past it.
pub(crate) fn read_line(buffer: &[u8], start: usize) -> Option<(&[u8], usize)> {
    if start > buffer.len() {
        return None;
    }

    buffer[start..]
        .windows(2)
        .position(|window| window == CRLF)
        .map(|offset| (&buffer[start..start + offset], start + offset + CRLF.len()))
}

pub(crate) fn parse_integer(line: &[u8]) -> Result<i64, RespError> {
    std::str::from_utf8(line)
        .map_err(|_| RespError::InvalidUtf8)?
        .parse::<i64>()
        .map_err(|_| RespError::FailedToParseInteger)
}

fn line_to_string(line: &[u8]) -> Result<String, RespError> {
    String::from_utf8(line.to_vec()).map_err(|_| RespError::InvalidUtf8)
}
