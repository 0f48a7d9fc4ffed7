use bytes::Bytes;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
    state::ReplicationState,
};

/// Represents the parsed arguments for INFO command
#[derive(Debug, Clone, PartialEq)]
pub struct InfoArguments {
    /// Requested section. Only the replication section exists, so any name
    /// renders it.
    pub section: Bytes,
}

impl InfoArguments {
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        let [section]: [Bytes; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidInfoCommand)?;

        Ok(Self { section })
    }
}

/// Handles the Redis INFO command.
///
/// Answers with one bulk string of `field:value` lines joined by CRLF. A
/// master reports its role, replica count, replication id and offset; a
/// replica only reports `role:slave`.
pub fn info(replication: &ReplicationState, _arguments: &InfoArguments) -> CommandResult {
    let body = replication
        .info_fields()
        .into_iter()
        .map(|(field, value)| format!("{}:{}", field, value))
        .collect::<Vec<_>>()
        .join("\r\n");

    CommandResult::Response(RespValue::bulk_string(body))
}
