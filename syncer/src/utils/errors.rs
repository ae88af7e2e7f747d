//! Custom error types for the syncer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported location type \"{scheme}\" for location {location}")]
    UnsupportedScheme { scheme: String, location: String },

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Refusing to run non-interactively without --assume-yes")]
    NonInteractive,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to list {root}: {message}")]
    Listing { root: String, message: String },

    #[error("{op} failed for {key}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("Unhandled {op} event for {}", path.display())]
    UnhandledEvent { op: String, path: PathBuf },

    #[error("Refusing to watch destination location {root}")]
    WrongRole { root: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Reconciliation finished with {failed} failed key(s), first: {first}")]
    Reconcile { failed: usize, first: String },

    #[error("Configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SyncError {
    pub(crate) fn backend(op: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Backend {
            op,
            key: key.into(),
            message: message.to_string(),
        }
    }
}

impl From<notify::Error> for SyncError {
    fn from(err: notify::Error) -> Self {
        SyncError::Watch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
