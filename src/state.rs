//! Process-wide replication identity.
//!
//! One [`ReplicationState`] is built at startup and shared through an `Arc`
//! with every connection, the command layer and the replication tasks.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use parking_lot::RwLock;
use rand::{distributions::Alphanumeric, Rng};
use tracing::debug;

use crate::replication::ReplicaSet;
use crate::resp::RespValue;

pub const REPLICATION_ID_LENGTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisRole {
    Master,
    Replica,
}

impl RedisRole {
    pub fn as_string(&self) -> &'static str {
        match self {
            RedisRole::Master => "master",
            RedisRole::Replica => "slave",
        }
    }
}

#[derive(Debug)]
pub struct ReplicationState {
    role: RwLock<RedisRole>,
    repl_id: RwLock<Option<String>>,
    /// Master: bytes of write commands propagated so far.
    /// Replica: bytes received from the master since the handshake.
    repl_offset: AtomicU64,
    replicas: ReplicaSet,
}

impl ReplicationState {
    pub fn new_master() -> Self {
        Self::with_replication_id(generate_replication_id())
    }

    /// Master state with a known replication id.
    pub fn with_replication_id(repl_id: String) -> Self {
        Self {
            role: RwLock::new(RedisRole::Master),
            repl_id: RwLock::new(Some(repl_id)),
            repl_offset: AtomicU64::new(0),
            replicas: ReplicaSet::new(),
        }
    }

    pub fn new_replica() -> Self {
        Self {
            role: RwLock::new(RedisRole::Replica),
            repl_id: RwLock::new(None),
            repl_offset: AtomicU64::new(0),
            replicas: ReplicaSet::new(),
        }
    }

    pub fn role(&self) -> RedisRole {
        *self.role.read()
    }

    pub fn is_master(&self) -> bool {
        self.role() == RedisRole::Master
    }

    pub fn is_replica(&self) -> bool {
        self.role() == RedisRole::Replica
    }

    /// Switches role. Becoming master mints a fresh replication id and
    /// resets the offset; becoming a replica drops the id.
    pub fn set_role(&self, role: RedisRole) {
        let mut current = self.role.write();

        if *current == role {
            return;
        }

        match role {
            RedisRole::Master => {
                *self.repl_id.write() = Some(generate_replication_id());
                self.repl_offset.store(0, Ordering::SeqCst);
            }
            RedisRole::Replica => {
                *self.repl_id.write() = None;
            }
        }

        debug!(from = current.as_string(), to = role.as_string(), "role changed");
        *current = role;
    }

    pub fn replication_id(&self) -> Option<String> {
        self.repl_id.read().clone()
    }

    pub fn offset(&self) -> u64 {
        self.repl_offset.load(Ordering::SeqCst)
    }

    /// Adds `bytes` to the offset and returns the new value.
    pub fn increment_offset(&self, bytes: u64) -> u64 {
        self.repl_offset.fetch_add(bytes, Ordering::SeqCst) + bytes
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    /// Sends the exact encoding of a write command to every registered
    /// replica and advances the offset once by the encoded length.
    pub fn propagate(&self, command: &RespValue) {
        let encoded: Bytes = command.encode();
        let length = encoded.len() as u64;

        let delivered = self.replicas.propagate(encoded);
        let offset = self.increment_offset(length);

        debug!(bytes = length, replicas = delivered, offset, "propagated write command");
    }

    /// Replication section rendered by INFO, in display order.
    pub fn info_fields(&self) -> Vec<(&'static str, String)> {
        let role = self.role();
        let mut fields = vec![("role", role.as_string().to_string())];

        if role == RedisRole::Master {
            fields.push(("connected_slaves", self.replicas.len().to_string()));

            if let Some(repl_id) = self.replication_id() {
                fields.push(("master_replid", repl_id));
            }

            fields.push(("master_repl_offset", self.offset().to_string()));
        }

        fields
    }
}

pub fn generate_replication_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REPLICATION_ID_LENGTH)
        .map(char::from)
        .collect::<String>()
        .to_lowercase()
}
