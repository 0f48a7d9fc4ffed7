use crate::{commands::command_handler::CommandResult, resp::RespValue};

/// PING accepts any arguments and ignores them.
#[derive(Debug, Clone, PartialEq)]
pub struct PingArguments;

impl PingArguments {
    /// Takes the raw elements, since arguments of any RESP type are ignored
    /// rather than validated.
    pub fn parse(_arguments: &[RespValue]) -> Self {
        Self
    }
}

/// Handles the Redis PING command. Always answers `+PONG`.
pub fn ping() -> CommandResult {
    CommandResult::Response(RespValue::simple_string("PONG"))
}
