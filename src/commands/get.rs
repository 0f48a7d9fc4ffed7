use bytes::Bytes;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Represents the parsed arguments for GET command
#[derive(Debug, Clone, PartialEq)]
pub struct GetArguments {
    /// The key name to retrieve from the store
    key: Bytes,
}

impl GetArguments {
    /// Parses command arguments into a GetArguments structure.
    ///
    /// # Returns
    ///
    /// * `Ok(GetArguments)` - Exactly one key was given
    /// * `Err(CommandError::InvalidGetCommand)` - Any other number of arguments
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        let [key]: [Bytes; 1] = arguments
            .try_into()
            .map_err(|_| CommandError::InvalidGetCommand)?;

        Ok(Self { key })
    }
}

/// Handles the Redis GET command.
///
/// Retrieves the value stored under the key. Missing and expired keys both
/// answer with the null bulk string `$-1\r\n`.
///
/// # Examples
///
/// ```ignore
/// // SET foo bar
/// // GET foo
/// // Returns: Response($3\r\nbar\r\n)
///
/// // GET missing
/// // Returns: Response($-1\r\n)
/// ```
pub fn get(store: &KeyValueStore, arguments: &GetArguments) -> CommandResult {
    match store.get(&arguments.key) {
        Some(data) => CommandResult::Response(RespValue::bulk_string(data)),
        None => CommandResult::Response(RespValue::null_bulk_string()),
    }
}
