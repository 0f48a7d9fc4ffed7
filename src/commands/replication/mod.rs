//! Commands that drive master/replica synchronisation.

mod fullresync;
mod psync;
mod replconf;

pub use fullresync::{fullresync, FullresyncArguments};
pub use psync::{psync, PsyncArguments};
pub use replconf::{replconf, ReplconfArguments};
