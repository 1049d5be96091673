//! Error types for the server core.
//!
//! Runtime errors follow the hand-rolled enum-with-manual-`Display` style:
//! command errors map directly onto the `-ERR ...` / `-WRONGTYPE ...` reply
//! strings clients expect, so `Display` IS the wire format here, not just a
//! debugging aid.

use std::error::Error as StdError;
use std::fmt;
use std::io;

/// Top-level error type for the server core.
#[derive(Debug)]
pub enum ServerError {
    /// Protocol-related errors (RESP parsing, serialization).
    Protocol(String),

    /// Command execution errors.
    Command(CommandError),

    /// Storage engine errors.
    Storage(StorageError),

    /// Network/IO errors.
    Io(String),

    /// Configuration errors.
    Config(String),

    /// Client connection errors.
    Connection(String),
}

/// Command-specific errors that map to reply strings.
#[derive(Debug, Clone)]
pub enum CommandError {
    /// Wrong number of arguments for command.
    WrongNumberOfArgs(String),

    /// Operation against wrong type.
    WrongType,

    /// Value is not an integer or out of range.
    NotInteger,

    /// Write rejected because the connection is not the master link.
    ReadOnlyReplica,

    /// Generic command error with message.
    Generic(String),
}

/// Storage-related errors.
#[derive(Debug)]
pub enum StorageError {
    /// Snapshot file is present but malformed.
    CorruptSnapshot(String),
}

/// Result alias used throughout the server core.
pub type Result<T> = std::result::Result<T, ServerError>;

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            ServerError::Command(err) => write!(f, "{}", err),
            ServerError::Storage(err) => write!(f, "{}", err),
            ServerError::Io(msg) => write!(f, "I/O error: {}", msg),
            ServerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ServerError::Connection(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::WrongNumberOfArgs(cmd) => {
                write!(f, "ERR wrong number of arguments for '{}' command", cmd)
            }
            CommandError::WrongType => write!(
                f,
                "WRONGTYPE Operation against a key holding the wrong kind of value"
            ),
            CommandError::NotInteger => {
                write!(f, "ERR value is not an integer or out of range")
            }
            CommandError::ReadOnlyReplica => {
                write!(f, "ERR Cannot write to replica")
            }
            CommandError::Generic(msg) => write!(f, "ERR {}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::CorruptSnapshot(msg) => write!(f, "corrupt snapshot: {}", msg),
        }
    }
}

impl StdError for ServerError {}
impl StdError for CommandError {}
impl StdError for StorageError {}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Io(err.to_string())
    }
}

impl From<CommandError> for ServerError {
    fn from(err: CommandError) -> Self {
        ServerError::Command(err)
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        ServerError::Storage(err)
    }
}
