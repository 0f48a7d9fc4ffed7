//! Replica side of the replication handshake.
//!
//! The replica walks a fixed sequence of request/reply steps against its
//! master. Any reply that deviates from the expected one aborts the handshake
//! and no later step is attempted.

use std::fmt;

use bytes::Bytes;
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    net::{tcp::OwnedReadHalf, TcpStream},
};
use tracing::{debug, info, warn};

use crate::{
    commands::replication::FullresyncArguments,
    connection::ConnectionHandle,
    input::{CommandReadError, RespReader},
    resp::RespValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Disconnected,
    Connected,
    Pinged,
    PortSent,
    CapaSent,
    Synced,
    Streaming,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::Connected => "connected",
            HandshakeState::Pinged => "pinged",
            HandshakeState::PortSent => "port-sent",
            HandshakeState::CapaSent => "capa-sent",
            HandshakeState::Synced => "synced",
            HandshakeState::Streaming => "streaming",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("failed to connect to master at {address}: {source}")]
    ConnectionFailed {
        address: String,
        source: std::io::Error,
    },
    #[error("unexpected reply from master while {state}: expected {expected}, received {received:?}")]
    UnexpectedReply {
        state: HandshakeState,
        expected: &'static str,
        received: RespValue,
    },
    #[error("failed to write to master: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to read from master: {0}")]
    Read(#[from] CommandReadError),
}

/// A master connection that completed the handshake and is ready to stream.
#[derive(Debug)]
pub struct MasterLink<R> {
    pub reader: RespReader<R>,
    pub connection: ConnectionHandle,
}

/// The outcome of a successful handshake.
#[derive(Debug)]
pub struct Synchronised<R> {
    pub link: MasterLink<R>,
    pub resync: FullresyncArguments,
    /// The snapshot sent by the master. It is never loaded.
    pub snapshot: Bytes,
}

pub struct Handshake<R, W> {
    state: HandshakeState,
    address: String,
    reader: RespReader<R>,
    writer: W,
}

impl<R, W> Handshake<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    /// Starts a handshake over an already open connection.
    pub fn new(address: impl Into<String>, reader: R, writer: W) -> Self {
        Self {
            state: HandshakeState::Connected,
            address: address.into(),
            reader: RespReader::new(reader),
            writer,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Performs the replication handshake:
    /// 1. `PING`, expecting `+PONG`
    /// 2. `REPLCONF listening-port <port>`, expecting `+OK`
    /// 3. `REPLCONF capa psync2`, expecting `+OK`
    /// 4. `PSYNC ? -1`, expecting `+FULLRESYNC <replid> <offset>`
    /// 5. the RDB snapshot, read and discarded
    ///
    /// On success the connection is handed back in the streaming state.
    pub async fn run(mut self, listening_port: u16) -> Result<Synchronised<R>, HandshakeError> {
        let reply = self.request(&["PING"]).await?;
        self.expect_simple_string(reply, "PONG")?;
        self.advance(HandshakeState::Pinged);

        let port = listening_port.to_string();
        let reply = self.request(&["REPLCONF", "listening-port", &port]).await?;
        self.expect_simple_string(reply, "OK")?;
        self.advance(HandshakeState::PortSent);

        let reply = self.request(&["REPLCONF", "capa", "psync2"]).await?;
        self.expect_simple_string(reply, "OK")?;
        self.advance(HandshakeState::CapaSent);

        let reply = self.request(&["PSYNC", "?", "-1"]).await?;
        let resync = self.expect_full_resync(reply)?;
        let snapshot = self.reader.read_rdb_payload().await?;
        self.advance(HandshakeState::Synced);

        info!(
            master = %self.address,
            replication_id = ?resync.replication_id,
            offset = ?resync.offset,
            snapshot_bytes = snapshot.len(),
            "full resync received"
        );

        self.advance(HandshakeState::Streaming);

        Ok(Synchronised {
            link: MasterLink {
                reader: self.reader,
                connection: ConnectionHandle::new(self.address, self.writer),
            },
            resync,
            snapshot,
        })
    }

    async fn request(&mut self, parts: &[&str]) -> Result<RespValue, HandshakeError> {
        self.writer
            .write_all(&RespValue::command(parts).encode())
            .await?;
        self.writer.flush().await?;

        Ok(self.reader.read_frame().await?.value)
    }

    fn expect_simple_string(
        &self,
        reply: RespValue,
        expected: &'static str,
    ) -> Result<(), HandshakeError> {
        match reply {
            RespValue::SimpleString(text) if text == expected => Ok(()),
            received => Err(self.unexpected(expected, received)),
        }
    }

    /// Any status line containing `FULLRESYNC` is accepted. Its replication id
    /// and offset are only informational, so malformed fields are dropped.
    fn expect_full_resync(&self, reply: RespValue) -> Result<FullresyncArguments, HandshakeError> {
        if let RespValue::SimpleString(line) = &reply {
            if let Some(start) = line.find("FULLRESYNC") {
                let resync = FullresyncArguments::parse(&line[start..]).unwrap_or_else(|err| {
                    warn!(line = %line, error = %err, "ignoring malformed FULLRESYNC fields");
                    FullresyncArguments {
                        replication_id: None,
                        offset: None,
                    }
                });

                return Ok(resync);
            }
        }

        Err(self.unexpected("FULLRESYNC", reply))
    }

    fn unexpected(&self, expected: &'static str, received: RespValue) -> HandshakeError {
        HandshakeError::UnexpectedReply {
            state: self.state,
            expected,
            received,
        }
    }

    fn advance(&mut self, next: HandshakeState) {
        debug!(master = %self.address, from = %self.state, to = %next, "handshake step");
        self.state = next;
    }
}

/// Opens a TCP connection to the master and runs the handshake over it.
pub async fn connect_to_master(
    host: &str,
    port: u16,
    listening_port: u16,
) -> Result<Synchronised<OwnedReadHalf>, HandshakeError> {
    let address = format!("{}:{}", host, port);
    debug!(master = %address, state = %HandshakeState::Disconnected, "connecting to master");

    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| HandshakeError::ConnectionFailed {
            address: address.clone(),
            source,
        })?;

    let (reader, writer) = stream.into_split();

    Handshake::new(address, reader, writer)
        .run(listening_port)
        .await
}
