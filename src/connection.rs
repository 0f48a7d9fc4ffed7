//! Per-connection loops.
//!
//! A client connection reads one frame at a time, runs it through the command
//! layer and writes the reply before reading the next frame. The replica's
//! link to its master uses the same pipeline but stays silent apart from
//! `REPLCONF` replies.

use std::{fmt, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream},
    net::TcpStream,
    sync::{watch, Mutex},
};
use tracing::{debug, info, warn};

use crate::{
    commands::{CommandHandler, CommandResult},
    input::{CommandReadError, RespReader},
    key_value_store::KeyValueStore,
    replication::handshake::MasterLink,
    resp::RespValue,
    state::ReplicationState,
};

/// Buffer size of in-memory connections.
const IN_MEMORY_BUFFER_SIZE: usize = 64 * 1024;

pub type ConnectionWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

/// The write side of a connection, shared between the connection's own loop
/// and, once it becomes a replica, its propagation forwarder.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub address: String,
    writer: ConnectionWriter,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    pub fn new<W>(address: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            address: address.into(),
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A handle whose bytes can be read back from the returned stream.
    pub fn in_memory(address: impl Into<String>) -> (Self, DuplexStream) {
        let (local, peer) = tokio::io::duplex(IN_MEMORY_BUFFER_SIZE);
        (Self::new(address, local), peer)
    }

    /// Writes and flushes `bytes` while holding the writer lock, so each call
    /// lands on the wire contiguously.
    pub async fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer_guard = self.writer.lock().await;
        writer_guard.write_all(bytes).await?;
        writer_guard.flush().await?;

        Ok(())
    }

    pub async fn write_value(&self, value: &RespValue) -> std::io::Result<()> {
        self.write_bytes(&value.encode()).await
    }
}

/// Serves a client over TCP until it disconnects or the server shuts down.
pub async fn handle_tcp_connection(
    stream: TcpStream,
    address: SocketAddr,
    store: Arc<KeyValueStore>,
    replication: Arc<ReplicationState>,
    shutdown: watch::Receiver<bool>,
) {
    let (reader, writer) = stream.into_split();
    let connection = ConnectionHandle::new(address.to_string(), writer);

    handle_client_connection(reader, connection, store, replication, shutdown).await;
}

/// Serves a client connection, as master or replica depending on the current
/// role.
///
/// Command errors are answered with an error reply and the loop continues. A
/// protocol error is answered and then the connection is closed, since the
/// stream can no longer be framed. If the client had registered as a replica
/// it is dropped from the registry on exit.
pub async fn handle_client_connection<R>(
    reader: R,
    connection: ConnectionHandle,
    store: Arc<KeyValueStore>,
    replication: Arc<ReplicationState>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = RespReader::new(reader);
    debug!(client = %connection.address, "client connected");

    loop {
        let frame = tokio::select! {
            frame = reader.read_frame() => frame,
            _ = shutdown.changed() => {
                debug!(client = %connection.address, "shutting down connection");
                break;
            }
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(CommandReadError::ConnectionClosed) => {
                debug!(client = %connection.address, "client disconnected");
                break;
            }
            Err(err @ CommandReadError::RespParseError(_)) => {
                warn!(client = %connection.address, error = %err, "protocol error");

                if let Err(err) = connection.write_bytes(err.as_string().as_bytes()).await {
                    warn!(client = %connection.address, error = %err, "failed to write reply");
                }

                break;
            }
            Err(err) => {
                warn!(client = %connection.address, error = %err, "failed to read from client");
                break;
            }
        };

        let command_result = match CommandHandler::new(frame.value) {
            Ok(command_handler) => {
                command_handler
                    .handle_command_for_client(&store, &replication, &connection)
                    .await
            }
            Err(err) => Err(err),
        };

        let reply = match command_result {
            Ok(CommandResult::NoResponse) => continue,
            Ok(CommandResult::Response(response)) => response,
            Err(err) => {
                debug!(client = %connection.address, error = %err, "command failed");
                err.as_resp()
            }
        };

        if let Err(err) = connection.write_value(&reply).await {
            warn!(client = %connection.address, error = %err, "failed to write reply");
            break;
        }
    }

    replication.replicas().remove(&connection.address);
}

/// Applies the command stream a master sends after the handshake.
///
/// Every frame's wire length is added to the replica's offset once the frame
/// has been handled, so a `GETACK` reports the bytes received before it.
pub async fn handle_master_connection<R>(
    link: MasterLink<R>,
    store: Arc<KeyValueStore>,
    replication: Arc<ReplicationState>,
    mut shutdown: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let MasterLink {
        mut reader,
        connection,
    } = link;

    info!(master = %connection.address, "streaming from master");

    loop {
        let frame = tokio::select! {
            frame = reader.read_frame() => frame,
            _ = shutdown.changed() => break,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(CommandReadError::ConnectionClosed) => {
                info!(master = %connection.address, "master closed the replication stream");
                break;
            }
            Err(err) => {
                warn!(master = %connection.address, error = %err, "replication stream failed");
                break;
            }
        };

        match CommandHandler::new(frame.value) {
            Ok(command_handler) => {
                match command_handler
                    .handle_command_for_replica_master_connection(&store, &replication, &connection)
                    .await
                {
                    Ok(CommandResult::NoResponse) => (),
                    Ok(CommandResult::Response(response)) => {
                        if let Err(err) = connection.write_value(&response).await {
                            warn!(master = %connection.address, error = %err, "failed to reply to master");
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(master = %connection.address, error = %err, "failed to apply command");
                    }
                }
            }
            Err(err) => {
                warn!(master = %connection.address, error = %err, "ignoring invalid command from master");
            }
        }

        let offset = replication.increment_offset(frame.length as u64);
        debug!(bytes = frame.length, offset, "replication offset advanced");
    }
}
