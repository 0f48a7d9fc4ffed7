use thiserror::Error;

use crate::resp::RespValue;

#[derive(Error, Debug, PartialEq)]
pub enum CommandError {
    #[error("invalid command")]
    InvalidCommand,
    #[error("invalid command argument")]
    InvalidCommandArgument,
    #[error("unknown command '{0}'")]
    UnsupportedCommand(String),
    #[error("invalid ECHO command")]
    InvalidEchoCommand,
    #[error("invalid GET command")]
    InvalidGetCommand,
    #[error("invalid SET command")]
    InvalidSetCommand,
    #[error("invalid SET command argument")]
    InvalidSetCommandArgument,
    #[error("invalid SET command expiration")]
    InvalidSetCommandExpiration,
    #[error("invalid INFO command")]
    InvalidInfoCommand,
    #[error("invalid PSYNC command")]
    InvalidPsyncCommand,
    #[error("invalid FULLRESYNC reply")]
    InvalidFullresyncCommand,
    #[error("PSYNC is only served by a master")]
    PsyncOnReplica,
    #[error("replica can only process read commands from clients")]
    ReplicaReadOnlyCommands,
    #[error("failed to write to connection: {0}")]
    ConnectionWriteError(String),
}

impl CommandError {
    pub fn as_resp(&self) -> RespValue {
        match self {
            CommandError::InvalidCommand => RespValue::Error("ERR Invalid command".to_string()),
            CommandError::InvalidCommandArgument => {
                RespValue::Error("ERR Invalid command argument".to_string())
            }
            CommandError::UnsupportedCommand(name) => {
                RespValue::Error(format!("ERR unknown command '{}'", name))
            }
            CommandError::InvalidEchoCommand => {
                RespValue::Error("ERR wrong number of arguments for 'echo' command".to_string())
            }
            CommandError::InvalidGetCommand => {
                RespValue::Error("ERR wrong number of arguments for 'get' command".to_string())
            }
            CommandError::InvalidSetCommand => {
                RespValue::Error("ERR wrong number of arguments for 'set' command".to_string())
            }
            CommandError::InvalidSetCommandArgument => {
                RespValue::Error("ERR syntax error".to_string())
            }
            CommandError::InvalidSetCommandExpiration => {
                RespValue::Error("ERR value is not an integer or out of range".to_string())
            }
            CommandError::InvalidInfoCommand => {
                RespValue::Error("ERR wrong number of arguments for 'info' command".to_string())
            }
            CommandError::InvalidPsyncCommand => {
                RespValue::Error("ERR wrong number of arguments for 'psync' command".to_string())
            }
            CommandError::InvalidFullresyncCommand => {
                RespValue::Error("ERR Invalid FULLRESYNC reply".to_string())
            }
            CommandError::PsyncOnReplica => RespValue::Error(
                "ERR PSYNC command should not be handled by replica server".to_string(),
            ),
            CommandError::ReplicaReadOnlyCommands => RespValue::Error(
                "READONLY You can't write against a read only replica.".to_string(),
            ),
            CommandError::ConnectionWriteError(err) => RespValue::Error(format!("ERR {}", err)),
        }
    }

    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.as_resp().encode()).into_owned()
    }
}
