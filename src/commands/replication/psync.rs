use bytes::Bytes;
use tracing::info;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    connection::ConnectionHandle,
    rdb::send_full_resync,
    state::ReplicationState,
};

/// Represents the parsed arguments for PSYNC command.
///
/// Partial resynchronisation is not supported, so both values are accepted
/// and ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct PsyncArguments {
    pub replication_id: Bytes,
    pub offset: Bytes,
}

impl PsyncArguments {
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        let [replication_id, offset]: [Bytes; 2] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidPsyncCommand)?;

        Ok(Self {
            replication_id,
            offset,
        })
    }
}

/// Handles the Redis PSYNC command.
///
/// Always performs a full resync: writes `+FULLRESYNC <id> <offset>` and the
/// empty snapshot straight to the connection, then registers the connection
/// as a replica so later writes are streamed to it. The reply has already
/// been written, so the caller is told no response is owed.
///
/// # Returns
///
/// * `Ok(CommandResult::NoResponse)` - The full resync was written and the replica registered
/// * `Err(CommandError::PsyncOnReplica)` - This server is not a master
/// * `Err(CommandError::ConnectionWriteError)` - The reply could not be written
pub async fn psync(
    replication: &ReplicationState,
    connection: &ConnectionHandle,
    _arguments: &PsyncArguments,
) -> Result<CommandResult, CommandError> {
    if !replication.is_master() {
        return Err(CommandError::PsyncOnReplica);
    }

    let Some(replication_id) = replication.replication_id() else {
        return Err(CommandError::PsyncOnReplica);
    };

    send_full_resync(connection, &replication_id, replication.offset())
        .await
        .map_err(|err| CommandError::ConnectionWriteError(err.to_string()))?;

    replication.replicas().register(connection);
    info!(replica = %connection.address, "replica synchronised");

    Ok(CommandResult::NoResponse)
}
