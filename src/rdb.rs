//! The snapshot a master streams after `+FULLRESYNC`.
//!
//! Snapshots are never persisted, so every full resync ships the same empty
//! RDB file.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::{connection::ConnectionHandle, resp::RespValue};

/// An RDB version 11 file holding no keys.
pub const EMPTY_RDB: &[u8] = &[
    0x52, 0x45, 0x44, 0x49, 0x53, 0x30, 0x30, 0x31, 0x31, 0xfa, 0x09, 0x72, 0x65, 0x64, 0x69, 0x73,
    0x2d, 0x76, 0x65, 0x72, 0x05, 0x37, 0x2e, 0x32, 0x2e, 0x30, 0xfa, 0x0a, 0x72, 0x65, 0x64, 0x69,
    0x73, 0x2d, 0x62, 0x69, 0x74, 0x73, 0xc0, 0x40, 0xfa, 0x05, 0x63, 0x74, 0x69, 0x6d, 0x65, 0xc2,
    0x6d, 0x08, 0xbc, 0x65, 0xfa, 0x08, 0x75, 0x73, 0x65, 0x64, 0x2d, 0x6d, 0x65, 0x6d, 0xc2, 0xb0,
    0xc4, 0x10, 0x00, 0xfa, 0x08, 0x61, 0x6f, 0x66, 0x2d, 0x62, 0x61, 0x73, 0x65, 0xc0, 0x00, 0xff,
    0xf0, 0x6e, 0x3b, 0xfe, 0xc0, 0xff, 0x5a, 0xa2,
];

/// Encodes `+FULLRESYNC <id> <offset>\r\n` followed by the empty snapshot.
pub fn full_resync_reply(replication_id: &str, offset: u64) -> Bytes {
    let mut reply = BytesMut::new();
    reply.extend_from_slice(
        &RespValue::simple_string(format!("FULLRESYNC {} {}", replication_id, offset)).encode(),
    );
    reply.extend_from_slice(&RespValue::RdbPayload(Bytes::from_static(EMPTY_RDB)).encode());
    reply.freeze()
}

/// Writes the full resync reply in one locked write so nothing else can be
/// interleaved between the status line and the snapshot.
pub async fn send_full_resync(
    connection: &ConnectionHandle,
    replication_id: &str,
    offset: u64,
) -> std::io::Result<()> {
    let reply = full_resync_reply(replication_id, offset);
    connection.write_bytes(&reply).await?;

    debug!(
        client = %connection.address,
        rdb_bytes = EMPTY_RDB.len(),
        "full resync sent"
    );

    Ok(())
}
