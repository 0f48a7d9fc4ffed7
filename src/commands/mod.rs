mod command_error;
mod command_handler;
mod echo;
mod get;
mod info;
mod ping;
pub mod replication;
mod set;

pub use command_error::CommandError;
pub use command_handler::{Command, CommandHandler, CommandKind, CommandResult};
pub use echo::EchoArguments;
pub use get::GetArguments;
pub use info::InfoArguments;
pub use ping::PingArguments;
pub use set::SetArguments;
