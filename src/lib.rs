//! A Redis-compatible server with master/replica replication.
//!
//! Supports ECHO, PING, GET, SET (with PX expiry) and INFO over the Redis
//! Serialization Protocol. A server started with `--replicaof` performs the
//! replication handshake against its master and then applies the master's
//! write stream. A master streams every write to the replicas that issued
//! PSYNC.

pub mod commands;
pub mod connection;
pub mod input;
pub mod key_value_store;
pub mod rdb;
pub mod replication;
pub mod resp;
pub mod server;
pub mod state;
