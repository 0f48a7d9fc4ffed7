use bytes::Bytes;
use tracing::debug;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    connection::ConnectionHandle,
    resp::RespValue,
    state::ReplicationState,
};

/// Represents the parsed arguments for REPLCONF command
#[derive(Debug, Clone, PartialEq)]
pub enum ReplconfArguments {
    /// `REPLCONF GETACK *`, a master asking for the replica's offset
    GetAck,
    /// `REPLCONF ACK <offset>`, a replica reporting its offset
    Ack(u64),
    /// `listening-port`, `capa` and anything else, acknowledged as-is
    Configuration(Vec<Bytes>),
}

impl ReplconfArguments {
    /// Parses command arguments into a ReplconfArguments value.
    ///
    /// Never fails: anything that is not `GETACK *` or `ACK <offset>` is
    /// treated as configuration and acknowledged generically.
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        if let [subcommand, value] = arguments.as_slice() {
            if subcommand.eq_ignore_ascii_case(b"getack") && &value[..] == b"*" {
                return Ok(Self::GetAck);
            }

            if subcommand.eq_ignore_ascii_case(b"ack") {
                if let Some(offset) = parse_offset(value) {
                    return Ok(Self::Ack(offset));
                }
            }
        }

        Ok(Self::Configuration(arguments))
    }
}

fn parse_offset(value: &[u8]) -> Option<u64> {
    std::str::from_utf8(value).ok()?.parse::<u64>().ok()
}

/// Handles the Redis REPLCONF command.
///
/// `GETACK *` answers `REPLCONF ACK <offset>` with the current replication
/// offset. An `ACK` from a replica is recorded against its connection and
/// answered with nothing. Every other form answers `+OK`.
pub fn replconf(
    replication: &ReplicationState,
    connection: &ConnectionHandle,
    arguments: &ReplconfArguments,
) -> CommandResult {
    match arguments {
        ReplconfArguments::GetAck => {
            let offset = replication.offset();
            debug!(offset, "answering GETACK");

            CommandResult::Response(RespValue::array(vec![
                RespValue::bulk_string("REPLCONF"),
                RespValue::bulk_string("ACK"),
                RespValue::bulk_string(offset.to_string()),
            ]))
        }
        ReplconfArguments::Ack(offset) => {
            replication
                .replicas()
                .acknowledge(&connection.address, *offset);

            CommandResult::NoResponse
        }
        ReplconfArguments::Configuration(_) => {
            CommandResult::Response(RespValue::simple_string("OK"))
        }
    }
}
