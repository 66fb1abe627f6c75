//! Error types for redirs
//!
//! This module defines all error types used throughout the crate.
//! We follow Redis's error conventions where applicable, but the exact
//! message strings are not part of the contract.

use thiserror::Error;

/// Main error type for redirs operations
#[derive(Debug, Error)]
pub enum RedirsError {
    /// Command execution errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Script IR ill-formed at registration, or invalid JSON at the boundary
    #[error("parse error: {0}")]
    Parse(String),

    /// User-originated error during script execution
    #[error("script error: {0}")]
    Script(String),

    /// External backend transport failure
    #[error("connection error: {0}")]
    Connection(String),

    /// Command not supported on the selected backend
    #[error("not implemented on this backend: {0}")]
    NotImplemented(String),
}

/// Command-level errors that map to Redis error replies
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// Operation against a key holding an incompatible type
    #[error("WRONGTYPE Operation against a key holding the wrong kind of value")]
    WrongType,

    /// Wrong number or shape of arguments for a command or script call
    #[error("wrong number of arguments for '{0}'")]
    WrongNumberOfArgs(String),

    /// Stored value is not an integer
    #[error("value is not an integer or out of range")]
    NotInteger,

    /// Argument is not a valid float
    #[error("value is not a valid float")]
    NotFloat,

    /// Command name not in the dispatch table
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// Malformed command arguments
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// Type alias for Results throughout redirs
pub type Result<T> = std::result::Result<T, RedirsError>;

impl From<serde_json::Error> for RedirsError {
    fn from(err: serde_json::Error) -> Self {
        RedirsError::Parse(err.to_string())
    }
}

impl From<redis::RedisError> for RedirsError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
            RedirsError::Connection(err.to_string())
        } else {
            RedirsError::Script(err.to_string())
        }
    }
}
