//! Error types for dchmod
//!
//! This module defines the error hierarchy that covers:
//! - Mode expression compilation errors
//! - Configuration and CLI errors
//! - Catalog errors (walking and the SQLite cache)
//! - Group lookup errors
//! - Worker thread errors
//!
//! Per-entry chown/chmod failures are deliberately absent: they are logged
//! and counted by the mutator, never propagated.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for a dchmod run
#[derive(Error, Debug)]
pub enum ChmodError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Group resolution errors
    #[error("Group error: {0}")]
    Group(#[from] GroupError),

    /// A worker thread died
    #[error("Worker {id} panicked: {message}")]
    Worker { id: usize, message: String },

    /// A worker thread could not be started
    #[error("Failed to start worker {id}: {source}")]
    Spawn {
        id: usize,
        #[source]
        source: std::io::Error,
    },

    /// The run stopped before this worker joined the group
    #[error("Run aborted before the worker group was complete")]
    Aborted,
}

/// Mode expression compilation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    /// Nothing to compile
    #[error("empty mode expression")]
    Empty,

    /// Octal literal does not fit in the 12 permission bits
    #[error("octal mode '{literal}' exceeds 0o7777")]
    OctalOutOfRange { literal: String },

    /// Clause between commas is empty
    #[error("empty clause at position {index} in '{expr}'")]
    EmptyClause { expr: String, index: usize },

    /// Clause has no u/g/a target letters
    #[error("clause '{clause}' names no target (expected one or more of u, g, a)")]
    MissingTarget { clause: String },

    /// Clause has no +, - or = after its targets
    #[error("clause '{clause}' is missing an operator (expected +, - or =)")]
    MissingOperator { clause: String },

    /// + or - with nothing after it
    #[error("clause '{clause}' adds or removes no permissions")]
    MissingPerms { clause: String },

    /// = must be followed by exactly one class letter
    #[error("clause '{clause}' must copy from exactly one of u, g, a")]
    InvalidSource { clause: String },

    /// Unrecognized character
    #[error("unexpected character '{found}' in clause '{clause}'")]
    UnexpectedChar { clause: String, found: char },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Bad mode expression on the command line
    #[error("invalid mode string '{expr}': {source}")]
    InvalidMode {
        expr: String,
        #[source]
        source: ModeError,
    },

    /// Regex failed to compile
    #[error("invalid regular expression '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Invalid worker count
    #[error("invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Both a cache file and walk paths were given
    #[error("cannot read an input list and walk paths at the same time")]
    ConflictingInput,

    /// Neither a cache file nor walk paths were given
    #[error("no paths to walk and no input list given")]
    MissingInput,

    /// --output without a walk
    #[error("--output is only valid when walking paths")]
    OutputWithoutWalk,

    /// Output path error
    #[error("invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Catalog errors from the walker and the SQLite cache
#[derive(Error, Debug)]
pub enum CatalogError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Walk root does not exist or cannot be stat'ed
    #[error("cannot access walk root '{path}': {reason}")]
    RootNotFound { path: PathBuf, reason: String },

    /// Cache file does not exist
    #[error("cache file '{path}' does not exist")]
    CacheNotFound { path: PathBuf },

    /// Cache file is not one we wrote, or from another schema version
    #[error("invalid cache file '{path}': {reason}")]
    InvalidCache { path: PathBuf, reason: String },

    /// Failed to create the cache file
    #[error("failed to create cache at '{path}': {reason}")]
    CreateFailed { path: PathBuf, reason: String },

    /// A walker thread died
    #[error("walker thread panicked")]
    WalkerPanicked,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Group resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// The group database has no such group
    #[error("group '{name}' not found")]
    NotFound { name: String },

    /// The group database lookup itself failed
    #[error("failed to look up group '{name}': {reason}")]
    LookupFailed { name: String, reason: String },
}

/// Result type alias for ChmodError
pub type Result<T> = std::result::Result<T, ChmodError>;

/// Result type alias for CatalogError
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let config_err = ConfigError::InvalidWorkerCount { count: 0, max: 512 };
        let err: ChmodError = config_err.into();
        assert!(matches!(err, ChmodError::Config(_)));

        let group_err = GroupError::NotFound {
            name: "nobody-here".into(),
        };
        let err: ChmodError = group_err.into();
        assert!(err.to_string().contains("nobody-here"));
    }

    #[test]
    fn test_config_error_keeps_source() {
        use std::error::Error as _;

        let err = ConfigError::InvalidMode {
            expr: "q+r".into(),
            source: ModeError::UnexpectedChar {
                clause: "q+r".into(),
                found: 'q',
            },
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("q+r"));
    }
}
