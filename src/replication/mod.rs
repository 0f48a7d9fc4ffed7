//! Master/replica replication.
//!
//! On a master, [`ReplicaSet`] tracks the connections that issued PSYNC and
//! streams every write to them. On a replica, [`start_replication`] runs the
//! handshake against the configured master and then applies the master's
//! command stream in a background task.

pub mod handshake;
mod replicas;

use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

pub use replicas::ReplicaSet;

use crate::{
    connection::handle_master_connection, key_value_store::KeyValueStore,
    state::ReplicationState,
};
use handshake::{connect_to_master, HandshakeError};

/// Connects to the master, completes the handshake and spawns the ingestion
/// loop. Returns once the replica is streaming.
pub async fn start_replication(
    host: &str,
    port: u16,
    listening_port: u16,
    store: Arc<KeyValueStore>,
    replication: Arc<ReplicationState>,
    shutdown: watch::Receiver<bool>,
) -> Result<JoinHandle<()>, HandshakeError> {
    let synchronised = connect_to_master(host, port, listening_port).await?;

    Ok(tokio::spawn(handle_master_connection(
        synchronised.link,
        store,
        replication,
        shutdown,
    )))
}
