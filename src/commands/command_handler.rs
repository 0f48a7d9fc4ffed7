use bytes::Bytes;

use crate::{
    commands::{
        command_error::CommandError,
        echo::{echo, EchoArguments},
        get::{get, GetArguments},
        info::{info, InfoArguments},
        ping::{ping, PingArguments},
        replication::{
            fullresync, psync, replconf, FullresyncArguments, PsyncArguments, ReplconfArguments,
        },
        set::{set, SetArguments},
    },
    connection::ConnectionHandle,
    key_value_store::KeyValueStore,
    resp::RespValue,
    state::ReplicationState,
};

/// What a connection owes its peer after a command ran.
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Nothing more is written. PSYNC has already streamed its own reply.
    NoResponse,
    Response(RespValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Echo,
    Ping,
    Get,
    Set,
    Info,
    Replconf,
    Psync,
    Fullresync,
    Unsupported,
}

impl CommandKind {
    /// Derives the kind from the first element of an array (case-insensitive)
    /// or, for `FULLRESYNC`, from the prefix of a simple string.
    pub fn classify(value: &RespValue) -> CommandKind {
        match value {
            RespValue::Array(Some(elements)) => match elements.first().and_then(|e| e.as_text()) {
                Some(name) => Self::from_name(name),
                None => CommandKind::Unsupported,
            },
            RespValue::SimpleString(line) if starts_with_ignore_case(line, "FULLRESYNC") => {
                CommandKind::Fullresync
            }
            _ => CommandKind::Unsupported,
        }
    }

    fn from_name(name: &str) -> CommandKind {
        match name.to_uppercase().as_str() {
            "ECHO" => CommandKind::Echo,
            "PING" => CommandKind::Ping,
            "GET" => CommandKind::Get,
            "SET" => CommandKind::Set,
            "INFO" => CommandKind::Info,
            "REPLCONF" => CommandKind::Replconf,
            "PSYNC" => CommandKind::Psync,
            _ => CommandKind::Unsupported,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, CommandKind::Set)
    }
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    let (text, prefix) = (text.as_bytes(), prefix.as_bytes());
    text.len() >= prefix.len() && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// A command validated against its argument grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Echo(EchoArguments),
    Ping(PingArguments),
    Get(GetArguments),
    Set(SetArguments),
    Info(InfoArguments),
    Replconf(ReplconfArguments),
    Psync(PsyncArguments),
    Fullresync(FullresyncArguments),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandHandler {
    pub kind: CommandKind,
    pub command: Command,
    /// The value exactly as it was decoded, re-encoded verbatim on propagation.
    pub input: RespValue,
}

impl CommandHandler {
    pub fn new(input: RespValue) -> Result<Self, CommandError> {
        let kind = CommandKind::classify(&input);

        let command = match kind {
            CommandKind::Fullresync => {
                let RespValue::SimpleString(line) = &input else {
                    return Err(CommandError::InvalidFullresyncCommand);
                };

                Command::Fullresync(FullresyncArguments::parse(line)?)
            }
            CommandKind::Unsupported => return Err(unsupported(&input)),
            CommandKind::Ping => Command::Ping(PingArguments::parse(raw_arguments(&input))),
            _ => {
                let arguments = command_arguments(&input)?;

                match kind {
                    CommandKind::Echo => Command::Echo(EchoArguments::parse(arguments)?),
                    CommandKind::Get => Command::Get(GetArguments::parse(arguments)?),
                    CommandKind::Set => Command::Set(SetArguments::parse(arguments)?),
                    CommandKind::Info => Command::Info(InfoArguments::parse(arguments)?),
                    CommandKind::Replconf => {
                        Command::Replconf(ReplconfArguments::parse(arguments)?)
                    }
                    CommandKind::Psync => Command::Psync(PsyncArguments::parse(arguments)?),
                    CommandKind::Ping | CommandKind::Fullresync | CommandKind::Unsupported => {
                        return Err(unsupported(&input))
                    }
                }
            }
        };

        Ok(Self {
            kind,
            command,
            input,
        })
    }

    pub fn is_write(&self) -> bool {
        self.kind.is_write()
    }

    async fn handle_command(
        &self,
        store: &KeyValueStore,
        replication: &ReplicationState,
        connection: &ConnectionHandle,
    ) -> Result<CommandResult, CommandError> {
        match &self.command {
            Command::Echo(arguments) => Ok(echo(arguments)),
            Command::Ping(_) => Ok(ping()),
            Command::Get(arguments) => Ok(get(store, arguments)),
            Command::Set(arguments) => Ok(set(store, arguments)),
            Command::Info(arguments) => Ok(info(replication, arguments)),
            Command::Replconf(arguments) => Ok(replconf(replication, connection, arguments)),
            Command::Psync(arguments) => psync(replication, connection, arguments).await,
            Command::Fullresync(arguments) => Ok(fullresync(arguments)),
        }
    }

    /// Runs a client command on a master and fans writes out to replicas.
    pub async fn handle_command_for_master_server(
        &self,
        store: &KeyValueStore,
        replication: &ReplicationState,
        connection: &ConnectionHandle,
    ) -> Result<CommandResult, CommandError> {
        let command_result = self.handle_command(store, replication, connection).await?;

        if self.is_write() {
            replication.propagate(&self.input);
        }

        Ok(command_result)
    }

    /// Runs a client command on a replica, which only serves reads.
    pub async fn handle_command_for_replica_server(
        &self,
        store: &KeyValueStore,
        replication: &ReplicationState,
        connection: &ConnectionHandle,
    ) -> Result<CommandResult, CommandError> {
        match self.kind {
            CommandKind::Psync => Err(CommandError::PsyncOnReplica),
            kind if kind.is_write() => Err(CommandError::ReplicaReadOnlyCommands),
            _ => self.handle_command(store, replication, connection).await,
        }
    }

    /// Applies a command streamed from the master. Only the `GETACK` reply is
    /// sent back; everything else is applied silently.
    pub async fn handle_command_for_replica_master_connection(
        &self,
        store: &KeyValueStore,
        replication: &ReplicationState,
        connection: &ConnectionHandle,
    ) -> Result<CommandResult, CommandError> {
        if self.kind == CommandKind::Psync {
            return Err(CommandError::PsyncOnReplica);
        }

        let command_result = self.handle_command(store, replication, connection).await?;

        match (&self.command, command_result) {
            (Command::Replconf(ReplconfArguments::GetAck), CommandResult::Response(response)) => {
                Ok(CommandResult::Response(response))
            }
            _ => Ok(CommandResult::NoResponse),
        }
    }

    /// Picks the master or replica flavour from the current role.
    pub async fn handle_command_for_client(
        &self,
        store: &KeyValueStore,
        replication: &ReplicationState,
        connection: &ConnectionHandle,
    ) -> Result<CommandResult, CommandError> {
        if replication.is_master() {
            self.handle_command_for_master_server(store, replication, connection)
                .await
        } else {
            self.handle_command_for_replica_server(store, replication, connection)
                .await
        }
    }
}

fn command_arguments(input: &RespValue) -> Result<Vec<Bytes>, CommandError> {
    let RespValue::Array(Some(elements)) = input else {
        return Err(CommandError::InvalidCommand);
    };

    elements
        .iter()
        .skip(1)
        .map(|element| match element {
            RespValue::BulkString(Some(data)) => Ok(data.clone()),
            RespValue::SimpleString(text) => Ok(Bytes::from(text.clone())),
            _ => Err(CommandError::InvalidCommandArgument),
        })
        .collect()
}

fn raw_arguments(input: &RespValue) -> &[RespValue] {
    match input {
        RespValue::Array(Some(elements)) => elements.get(1..).unwrap_or_default(),
        _ => &[],
    }
}

fn unsupported(input: &RespValue) -> CommandError {
    match input {
        RespValue::Array(Some(elements)) => match elements.first().and_then(|e| e.as_text()) {
            Some(name) => CommandError::UnsupportedCommand(name.to_string()),
            None => CommandError::InvalidCommand,
        },
        _ => CommandError::InvalidCommand,
    }
}
