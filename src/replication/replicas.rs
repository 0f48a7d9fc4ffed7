use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;

#[derive(Debug)]
struct Replica {
    sender: mpsc::UnboundedSender<Bytes>,
    acknowledged_offset: u64,
}

/// Registry of downstream replica connections on a master.
///
/// Every replica gets its own forwarder task fed by an unbounded channel, so
/// a slow or dead replica only ever delays its own stream. A replica whose
/// forwarder has stopped is pruned the next time a write fails to reach it.
#[derive(Debug, Default)]
pub struct ReplicaSet {
    replicas: DashMap<String, Replica>,
}

impl ReplicaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `connection` as a replica and starts forwarding propagated
    /// commands to its writer. Must be called from within a Tokio runtime.
    pub fn register(&self, connection: &ConnectionHandle) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Bytes>();
        let address = connection.address.clone();
        let forwarder = connection.clone();

        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                if let Err(err) = forwarder.write_bytes(&command).await {
                    warn!(replica = %forwarder.address, error = %err, "failed to propagate command");
                    break;
                }
            }

            debug!(replica = %forwarder.address, "replica forwarder stopped");
        });

        info!(replica = %address, "replica registered");
        self.replicas.insert(
            address,
            Replica {
                sender,
                acknowledged_offset: 0,
            },
        );
    }

    pub fn remove(&self, address: &str) -> bool {
        let removed = self.replicas.remove(address).is_some();

        if removed {
            info!(replica = %address, "replica removed");
        }

        removed
    }

    pub fn contains(&self, address: &str) -> bool {
        self.replicas.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Records the offset a replica reported through `REPLCONF ACK`.
    pub fn acknowledge(&self, address: &str, offset: u64) {
        if let Some(mut replica) = self.replicas.get_mut(address) {
            replica.acknowledged_offset = offset;
        }
    }

    pub fn acknowledged_offset(&self, address: &str) -> Option<u64> {
        self.replicas
            .get(address)
            .map(|replica| replica.acknowledged_offset)
    }

    /// Queues `command` for every registered replica and returns how many
    /// accepted it.
    pub fn propagate(&self, command: Bytes) -> usize {
        let targets: Vec<(String, mpsc::UnboundedSender<Bytes>)> = self
            .replicas
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().sender.clone()))
            .collect();

        let mut delivered = 0;

        for (address, sender) in targets {
            match sender.send(command.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    if self.prune(&address, &sender) {
                        warn!(replica = %address, "replica stream closed, dropping replica");
                    }
                }
            }
        }

        delivered
    }

    /// Removes the replica at `address` only if it is still fed by `sender`.
    /// A replica that re-registered under the same address keeps its entry.
    fn prune(&self, address: &str, sender: &mpsc::UnboundedSender<Bytes>) -> bool {
        self.replicas
            .remove_if(address, |_, replica| replica.sender.same_channel(sender))
            .is_some()
    }
}
