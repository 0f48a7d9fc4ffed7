use std::time::Duration;

use bytes::Bytes;

use crate::{
    commands::{command_error::CommandError, command_handler::CommandResult},
    key_value_store::KeyValueStore,
    resp::RespValue,
};

/// Represents the parsed arguments for SET command
#[derive(Debug, Clone, PartialEq)]
pub struct SetArguments {
    /// The key name under which the value is stored
    key: Bytes,
    /// The value to be stored under the given key
    value: Bytes,
    /// Time to live, counted from the moment the command executes
    time_to_live: Option<Duration>,
}

impl SetArguments {
    /// Parses command arguments into a SetArguments structure.
    ///
    /// Two formats are accepted:
    ///   - `[key, value]` for permanent storage
    ///   - `[key, value, "PX", milliseconds]` for expiring storage
    ///
    /// # Returns
    ///
    /// * `Ok(SetArguments)` - Successfully parsed arguments
    /// * `Err(CommandError::InvalidSetCommand)` - If the number of arguments is not 2 or 4
    /// * `Err(CommandError::InvalidSetCommandArgument)` - If the option is not `PX` (case-insensitive)
    /// * `Err(CommandError::InvalidSetCommandExpiration)` - If the milliseconds are not a valid u64
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // SET mykey hello PX 1000
    /// let result = SetArguments::parse(vec![
    ///     Bytes::from("mykey"),
    ///     Bytes::from("hello"),
    ///     Bytes::from("PX"),
    ///     Bytes::from("1000"),
    /// ]);
    /// // Returns: Ok(SetArguments { key: "mykey", value: "hello", time_to_live: Some(1s) })
    /// ```
    pub fn parse(arguments: Vec<Bytes>) -> Result<Self, CommandError> {
        if arguments.len() != 2 && arguments.len() != 4 {
            return Err(CommandError::InvalidSetCommand);
        }

        let mut time_to_live = None;

        if arguments.len() == 4 {
            if !arguments[2].eq_ignore_ascii_case(b"px") {
                return Err(CommandError::InvalidSetCommandArgument);
            }

            let milliseconds = std::str::from_utf8(&arguments[3])
                .ok()
                .and_then(|text| text.parse::<u64>().ok())
                .ok_or(CommandError::InvalidSetCommandExpiration)?;

            time_to_live = Some(Duration::from_millis(milliseconds));
        }

        Ok(Self {
            key: arguments[0].clone(),
            value: arguments[1].clone(),
            time_to_live,
        })
    }
}

/// Handles the Redis SET command.
///
/// Stores the key value pair, overwriting any previous value, and answers
/// `+OK`. With `PX` the key expires that many milliseconds after this call.
pub fn set(store: &KeyValueStore, arguments: &SetArguments) -> CommandResult {
    store.set(
        arguments.key.clone(),
        arguments.value.clone(),
        arguments.time_to_live,
    );

    CommandResult::Response(RespValue::simple_string("OK"))
}
