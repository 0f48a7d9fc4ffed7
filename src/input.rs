//! Input handling for connections.
//!
//! [`RespReader`] owns the read half of a connection and a growable buffer.
//! It yields one complete RESP value at a time, keeping any bytes that belong
//! to the next frame for the following call, so a frame split across several
//! socket reads (or several frames in one read) are both handled.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::commands::CommandError;
use crate::resp::{parse_integer, read_line, FrameScanner, RespError, RespValue, MAX_BULK_LENGTH};

const READ_CHUNK_SIZE: usize = 4096;

/// Errors that can occur while reading and parsing commands from network streams.
#[derive(Error, Debug, PartialEq)]
pub enum CommandReadError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("RESP parse error: {0}")]
    RespParseError(#[from] RespError),
    #[error("Command construction error: {0}")]
    CommandError(#[from] CommandError),
    #[error("Invalid RDB payload")]
    InvalidRdbPayload,
}

impl CommandReadError {
    pub fn as_string(&self) -> String {
        match self {
            CommandReadError::RespParseError(err) => err.as_string(),
            CommandReadError::CommandError(err) => err.as_string(),
            other => String::from_utf8_lossy(
                &RespValue::Error(format!("ERR {}", other)).encode(),
            )
            .into_owned(),
        }
    }
}

impl From<std::io::Error> for CommandReadError {
    fn from(err: std::io::Error) -> Self {
        CommandReadError::IoError(err.to_string())
    }
}

/// A decoded frame together with the number of wire bytes it occupied.
#[derive(Debug, PartialEq)]
pub struct Frame {
    pub value: RespValue,
    pub length: usize,
}

#[derive(Debug)]
pub struct RespReader<R> {
    stream: R,
    buffer: BytesMut,
    scanner: FrameScanner,
}

impl<R> RespReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(stream: R) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            scanner: FrameScanner::default(),
        }
    }

    /// Reads until one complete value is buffered and returns it.
    ///
    /// # Returns
    ///
    /// * `Ok(Frame)` - The next value and its encoded length
    /// * `Err(CommandReadError::ConnectionClosed)` - End of stream with no partial frame pending
    /// * `Err(CommandReadError::IoError)` - End of stream mid-frame, or a socket error
    /// * `Err(CommandReadError::RespParseError)` - The buffered bytes are not valid RESP
    pub async fn read_frame(&mut self) -> Result<Frame, CommandReadError> {
        loop {
            if self.scanner.scan(&self.buffer) {
                self.scanner.reset();

                if let Some((value, length)) = RespValue::decode(&mut self.buffer)? {
                    return Ok(Frame { value, length });
                }
            }

            self.fill_buffer().await?;
        }
    }

    /// Reads an RDB snapshot framed as `$<len>\r\n<bytes>` (no trailing CRLF).
    pub async fn read_rdb_payload(&mut self) -> Result<Bytes, CommandReadError> {
        let (length, header_length) = loop {
            if let Some((line, next)) = read_line(&self.buffer, 0) {
                if line.first() != Some(&b'$') {
                    return Err(CommandReadError::InvalidRdbPayload);
                }

                let length = parse_integer(&line[1..])?;
                let length = usize::try_from(length)
                    .ok()
                    .filter(|length| *length <= MAX_BULK_LENGTH)
                    .ok_or(CommandReadError::InvalidRdbPayload)?;

                break (length, next);
            }

            self.fill_buffer().await?;
        };

        while self.buffer.len() < header_length + length {
            self.fill_buffer().await?;
        }

        self.scanner.reset();
        self.buffer.advance(header_length);
        Ok(self.buffer.split_to(length).freeze())
    }

    /// Gives back the stream together with any bytes read but not yet decoded.
    pub fn into_inner(self) -> (R, BytesMut) {
        (self.stream, self.buffer)
    }

    async fn fill_buffer(&mut self) -> Result<(), CommandReadError> {
        self.buffer.reserve(READ_CHUNK_SIZE);
        let number_of_bytes = self.stream.read_buf(&mut self.buffer).await?;

        if number_of_bytes == 0 {
            if self.buffer.is_empty() {
                return Err(CommandReadError::ConnectionClosed);
            }

            return Err(CommandReadError::IoError(
                "connection closed mid-frame".to_string(),
            ));
        }

        Ok(())
    }
}
