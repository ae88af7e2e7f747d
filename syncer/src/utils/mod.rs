//! Utility modules for the syncer.

pub mod errors;
pub mod logger;

pub use errors::{Result, SyncError};
