use tracing::debug;

use crate::commands::{command_error::CommandError, command_handler::CommandResult};

/// The fields of a `+FULLRESYNC <replid> <offset>` status line.
#[derive(Debug, Clone, PartialEq)]
pub struct FullresyncArguments {
    pub replication_id: Option<String>,
    pub offset: Option<u64>,
}

impl FullresyncArguments {
    /// Splits the status line on whitespace. Both fields are optional but an
    /// offset, when present, must be a valid u64.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some(keyword) if keyword.eq_ignore_ascii_case("FULLRESYNC") => {}
            _ => return Err(CommandError::InvalidFullresyncCommand),
        }

        let replication_id = parts.next().map(str::to_string);
        let offset = parts
            .next()
            .map(|offset| {
                offset
                    .parse::<u64>()
                    .map_err(|_| CommandError::InvalidFullresyncCommand)
            })
            .transpose()?;

        Ok(Self {
            replication_id,
            offset,
        })
    }
}

/// A FULLRESYNC line is only meaningful during the handshake. Anywhere else
/// it is consumed without a reply.
pub fn fullresync(arguments: &FullresyncArguments) -> CommandResult {
    debug!(
        replication_id = ?arguments.replication_id,
        offset = ?arguments.offset,
        "ignoring FULLRESYNC outside of handshake"
    );

    CommandResult::NoResponse
}
