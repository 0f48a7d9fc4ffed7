//! Server configuration and the accept loop.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser};
use thiserror::Error;
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    select,
    sync::watch,
};
use tracing::{info, warn};

use crate::{
    connection::handle_tcp_connection,
    key_value_store::KeyValueStore,
    replication::start_replication,
    state::{RedisRole, ReplicationState},
};

pub const DEFAULT_PORT: u16 = 6379;

#[derive(Error, Debug, PartialEq)]
pub enum CliError {
    #[error("Invalid command line flag")]
    InvalidCommandLineFlag,
    #[error("Invalid command line flag value")]
    InvalidCommandLineFlagValue,
    /// `--help` or `--version` was passed. Carries the rendered text.
    #[error("{0}")]
    DisplayRequested(String),
}

#[derive(Parser, Debug)]
#[command(name = "redis-replication", version, about = "Redis server with master/replica replication")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Run as a replica of the given master, written as "<host> <port>".
    #[arg(long, value_name = "HOST PORT")]
    replicaof: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub replica_of: Option<(String, u16)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            replica_of: None,
        }
    }
}

impl ServerConfig {
    /// Parses command line arguments, program name first.
    ///
    /// # Returns
    ///
    /// * `Ok(ServerConfig)` - Successfully parsed configuration
    /// * `Err(CliError::InvalidCommandLineFlag)` - An unknown flag or argument was given
    /// * `Err(CliError::InvalidCommandLineFlagValue)` - A flag is missing its value, or the value is invalid
    /// * `Err(CliError::DisplayRequested)` - Help or version output was requested
    pub fn from_args<I, T>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|err| match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                CliError::DisplayRequested(err.to_string())
            }
            ErrorKind::UnknownArgument => CliError::InvalidCommandLineFlag,
            _ => CliError::InvalidCommandLineFlagValue,
        })?;

        if cli.port == 0 {
            return Err(CliError::InvalidCommandLineFlagValue);
        }

        let replica_of = cli.replicaof.as_deref().map(parse_replica_of).transpose()?;

        Ok(Self {
            port: cli.port,
            replica_of,
        })
    }

    pub fn role(&self) -> RedisRole {
        match self.replica_of {
            Some(_) => RedisRole::Replica,
            None => RedisRole::Master,
        }
    }
}

fn parse_replica_of(value: &str) -> Result<(String, u16), CliError> {
    let mut parts = value.split_whitespace();

    let (Some(host), Some(port), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CliError::InvalidCommandLineFlagValue);
    };

    let port = port
        .parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or(CliError::InvalidCommandLineFlagValue)?;

    Ok((host.to_string(), port))
}

/// A bound listener plus the state shared with every connection it accepts.
#[derive(Debug)]
pub struct RedisServer {
    listener: TcpListener,
    store: Arc<KeyValueStore>,
    replication: Arc<ReplicationState>,
    shutdown: watch::Sender<bool>,
}

impl RedisServer {
    pub async fn bind<A: ToSocketAddrs>(
        address: A,
        store: Arc<KeyValueStore>,
        replication: Arc<ReplicationState>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .context("failed to bind listener")?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            listener,
            store,
            replication,
            shutdown,
        })
    }

    /// Binds on localhost and, for a replica, completes the handshake with
    /// the master before returning. A failed handshake is fatal.
    pub async fn start(config: &ServerConfig) -> Result<Self> {
        let store = Arc::new(KeyValueStore::new());
        let replication = Arc::new(match config.role() {
            RedisRole::Master => ReplicationState::new_master(),
            RedisRole::Replica => ReplicationState::new_replica(),
        });

        let server = Self::bind(("127.0.0.1", config.port), store, replication).await?;
        let listening_port = server.local_addr()?.port();

        if let Some((host, port)) = &config.replica_of {
            start_replication(
                host,
                *port,
                listening_port,
                Arc::clone(&server.store),
                Arc::clone(&server.replication),
                server.shutdown.subscribe(),
            )
            .await
            .with_context(|| format!("replication handshake with {}:{} failed", host, port))?;
        }

        Ok(server)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn store(&self) -> Arc<KeyValueStore> {
        Arc::clone(&self.store)
    }

    pub fn replication(&self) -> Arc<ReplicationState> {
        Arc::clone(&self.replication)
    }

    /// Accepts connections until `shutdown` resolves, then tells every
    /// connection task to stop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let address = self.local_addr()?;
        info!(%address, role = self.replication.role().as_string(), "server listening");

        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("shutting down");
                    break;
                }
                accept_result = self.listener.accept() => match accept_result {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_tcp_connection(
                            stream,
                            peer,
                            Arc::clone(&self.store),
                            Arc::clone(&self.replication),
                            self.shutdown.subscribe(),
                        ));
                    }
                    Err(err) => warn!(error = %err, "failed to accept connection"),
                }
            }
        }

        self.shutdown.send_replace(true);
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
