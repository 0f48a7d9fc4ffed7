use std::{net::SocketAddr, sync::Arc, time::Duration};

use redis_replication::{
    commands::{CommandError, CommandHandler, CommandResult},
    connection::{handle_client_connection, ConnectionHandle},
    input::RespReader,
    key_value_store::KeyValueStore,
    resp::RespValue,
    server::{RedisServer, ServerConfig},
    state::ReplicationState,
};
use tokio::{
    io::{AsyncWriteExt, DuplexStream},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{oneshot, watch},
    task::JoinHandle,
    time::timeout,
};

pub const MASTER_REPLICATION_ID: &str = "8371b4fb1155b71f4a04d3e1bc3e18c4a990aeeb";
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Test utilities for simplifying Redis command tests
pub struct TestUtils;

/// Test environment containing the store and replication state
pub struct TestEnv {
    pub store: Arc<KeyValueStore>,
    pub replication: Arc<ReplicationState>,
    shutdown: watch::Sender<bool>,
}

impl TestEnv {
    /// Create a new test environment with a master server
    pub fn new_master_server() -> Self {
        Self::with_replication(ReplicationState::with_replication_id(
            MASTER_REPLICATION_ID.to_string(),
        ))
    }

    /// Create a new test environment with a replica server
    pub fn new_replica_server() -> Self {
        Self::with_replication(ReplicationState::new_replica())
    }

    fn with_replication(replication: ReplicationState) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            store: Arc::new(KeyValueStore::new()),
            replication: Arc::new(replication),
            shutdown,
        }
    }

    /// Execute a command as a client connected from `client_address`
    pub async fn exec_command(
        &self,
        command: RespValue,
        client_address: &str,
    ) -> Result<CommandResult, CommandError> {
        let (connection, _peer) = ConnectionHandle::in_memory(client_address);
        let command_handler = CommandHandler::new(command)?;

        command_handler
            .handle_command_for_client(&self.store, &self.replication, &connection)
            .await
    }

    /// Execute a command and assert it succeeds with expected result
    pub async fn exec_command_success_response(
        &self,
        command: RespValue,
        client_address: &str,
        expected_response: RespValue,
    ) {
        let result = self.exec_command(command, client_address).await;

        assert_eq!(result, Ok(CommandResult::Response(expected_response)));
    }

    /// Execute a command and assert it fails
    pub async fn exec_command_error_response(
        &self,
        command: RespValue,
        client_address: &str,
        expected_error: CommandError,
    ) {
        let result = self.exec_command(command, client_address).await;

        assert_eq!(result, Err(expected_error));
    }

    /// Connect an in-memory client served by the connection loop
    pub fn connect(&self, client_address: &str) -> TestClient {
        let (connection, replies) = ConnectionHandle::in_memory(client_address);
        let (requests, reader) = tokio::io::duplex(64 * 1024);

        let task = tokio::spawn(handle_client_connection(
            reader,
            connection,
            Arc::clone(&self.store),
            Arc::clone(&self.replication),
            self.shutdown.subscribe(),
        ));

        TestClient {
            writer: requests,
            reader: RespReader::new(replies),
            task,
        }
    }

    /// Stop every connection spawned through `connect`
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

/// A client talking to an in-memory connection loop
pub struct TestClient {
    pub writer: DuplexStream,
    pub reader: RespReader<DuplexStream>,
    pub task: JoinHandle<()>,
}

impl TestClient {
    pub async fn send(&mut self, command: RespValue) {
        self.send_raw(&command.encode()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.unwrap();
    }

    pub async fn read_value(&mut self) -> RespValue {
        TestUtils::read_value(&mut self.reader).await
    }

    pub async fn request(&mut self, command: RespValue) -> RespValue {
        self.send(command).await;
        self.read_value().await
    }
}

/// A server listening on an ephemeral localhost port
pub struct TestServer {
    pub address: SocketAddr,
    pub store: Arc<KeyValueStore>,
    pub replication: Arc<ReplicationState>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start_master() -> Self {
        Self::start(ServerConfig {
            port: 0,
            replica_of: None,
        })
        .await
        .unwrap()
    }

    pub async fn start_replica_of(master: SocketAddr) -> anyhow::Result<Self> {
        Self::start(ServerConfig {
            port: 0,
            replica_of: Some((master.ip().to_string(), master.port())),
        })
        .await
    }

    pub async fn start(config: ServerConfig) -> anyhow::Result<Self> {
        let server = RedisServer::start(&config).await?;
        let address = server.local_addr()?;
        let store = server.store();
        let replication = server.replication();
        let (stop, stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(server.run_until(async move {
            let _ = stopped.await;
        }));

        Ok(Self {
            address,
            store,
            replication,
            stop: Some(stop),
            task,
        })
    }

    pub async fn connect(&self) -> TcpClient {
        TcpClient::connect(self.address).await
    }

    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }

        self.task.await.unwrap().unwrap();
    }
}

/// A RESP client over TCP
pub struct TcpClient {
    pub reader: RespReader<OwnedReadHalf>,
    pub writer: OwnedWriteHalf,
}

impl TcpClient {
    pub async fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.unwrap();
        let (reader, writer) = stream.into_split();

        Self {
            reader: RespReader::new(reader),
            writer,
        }
    }

    pub async fn send(&mut self, command: RespValue) {
        self.writer.write_all(&command.encode()).await.unwrap();
    }

    pub async fn read_value(&mut self) -> RespValue {
        TestUtils::read_value(&mut self.reader).await
    }

    pub async fn request(&mut self, command: RespValue) -> RespValue {
        self.send(command).await;
        self.read_value().await
    }
}

impl TestUtils {
    /// Read one value, failing the test if none arrives in time
    pub async fn read_value<R>(reader: &mut RespReader<R>) -> RespValue
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        timeout(REPLY_TIMEOUT, reader.read_frame())
            .await
            .expect("timed out waiting for a reply")
            .unwrap()
            .value
    }

    /// Poll `check` until it holds, failing the test after the reply timeout
    pub async fn eventually<F>(mut check: F)
    where
        F: FnMut() -> bool,
    {
        timeout(REPLY_TIMEOUT, async {
            while !check() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Create a PING command
    pub fn ping_command() -> RespValue {
        RespValue::command(&["PING"])
    }

    /// Create an ECHO command
    pub fn echo_command(message: &str) -> RespValue {
        RespValue::command(&["ECHO", message])
    }

    /// Create a GET command
    pub fn get_command(key: &str) -> RespValue {
        RespValue::command(&["GET", key])
    }

    /// Create a SET command
    pub fn set_command(key: &str, value: &str) -> RespValue {
        RespValue::command(&["SET", key, value])
    }

    /// Create a SET command with expiration
    pub fn set_command_with_expiration(key: &str, value: &str, expiration_ms: u64) -> RespValue {
        RespValue::command(&["SET", key, value, "px", &expiration_ms.to_string()])
    }

    /// Create an INFO command
    pub fn info_command(section: &str) -> RespValue {
        RespValue::command(&["INFO", section])
    }

    /// Create a REPLCONF GETACK command
    pub fn replconf_getack_command() -> RespValue {
        RespValue::command(&["REPLCONF", "GETACK", "*"])
    }

    /// Create a PSYNC command requesting a full resync
    pub fn psync_command() -> RespValue {
        RespValue::command(&["PSYNC", "?", "-1"])
    }

    /// The INFO body of a master with the test replication id
    pub fn master_info(connected_slaves: usize, offset: u64) -> RespValue {
        RespValue::bulk_string(format!(
            "role:master\r\nconnected_slaves:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}",
            connected_slaves, MASTER_REPLICATION_ID, offset
        ))
    }
}
