use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by the builtins themselves.
///
/// Apart from [`BuiltinError::UnknownCommand`], none of these end the shell:
/// the dispatcher prints them as `<command>: <message>` on the command's
/// output stream and carries on.
#[derive(Debug, Error)]
pub enum BuiltinError {
    /// A name outside the builtin set reached name resolution.
    #[error("unknown builtin command {0:?}")]
    UnknownCommand(String),

    /// A required positional argument was not given.
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),

    /// `chdir` refused the target; the working directory is unchanged.
    #[error("cannot change directory to {}: {reason}", .path.display())]
    DirectoryChange {
        path: PathBuf,
        #[source]
        reason: io::Error,
    },

    /// The working directory could not be read back after a change.
    #[error("cannot determine current directory: {0}")]
    CurrentDirUnavailable(#[source] io::Error),

    /// The memory summary was unreadable or did not hold five integers.
    #[error("memory information unavailable: {0}")]
    MemoryInfoUnavailable(String),

    /// The process registry directory itself could not be listed.
    #[error("cannot open process registry {}: {source}", .path.display())]
    RegistryUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The scan produced no samples to divide by.
    #[error("no process activity to report")]
    NoProcessActivity,

    /// More live processes than a single scan may track.
    #[error("too many processes: more than {limit} tracked in one scan")]
    TooManyProcesses { limit: usize },

    /// A setting from the environment or the command line did not parse.
    #[error("invalid setting {key}={value:?}")]
    Config { key: &'static str, value: String },

    /// Writing the report failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Why a single registry entry was left out of a scan.
///
/// These never abort the scan; they are logged and counted.
#[derive(Debug, Error)]
pub enum EntryError {
    /// The record vanished or could not be read, e.g. the process exited mid-scan.
    #[error("record for pid {pid} unreadable: {source}")]
    Unreadable {
        pid: u32,
        #[source]
        source: io::Error,
    },

    #[error("record for pid {pid} has no field {index}")]
    MissingField { pid: u32, index: usize },

    #[error("record for pid {pid} has a bad tick count {value:?}")]
    BadTicks { pid: u32, value: String },
}

/// Errors from placing a builtin into a process.
///
/// These are surfaced to the caller of [`crate::Dispatcher::dispatch`]
/// instead of being printed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("inline builtins cannot be wired into a pipeline")]
    InlineWithWiring,

    #[error("fork failed: {0}")]
    Fork(#[source] nix::Error),
}
