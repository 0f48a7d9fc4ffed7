use bytes::Bytes;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    resp::RespValue,
};

/// Represents the parsed arguments for ECHO command
#[derive(Debug, Clone, PartialEq)]
pub struct EchoArguments {
    /// The payload sent back to the client
    message: Bytes,
}

impl EchoArguments {
    /// Parses command arguments into an EchoArguments structure.
    ///
    /// # Returns
    ///
    /// * `Ok(EchoArguments)` - Exactly one argument was given
    /// * `Err(CommandError::InvalidEchoCommand)` - Any other number of arguments
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        let [message]: [Bytes; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidEchoCommand)?;

        Ok(Self { message })
    }
}

/// Handles the Redis ECHO command.
///
/// Returns the argument unchanged as a bulk string.
///
/// # Examples
///
/// ```ignore
/// // ECHO "hello world"
/// let result = echo(&EchoArguments::parse(vec![Bytes::from("hello world")])?);
/// // Returns: Response($11\r\nhello world\r\n)
/// ```
pub fn echo(arguments: &EchoArguments) -> CommandResult {
    CommandResult::Response(RespValue::bulk_string(arguments.message.clone()))
}
