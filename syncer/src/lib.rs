//! Syncer Library
//!
//! Mirrors a source location (local directory or S3 prefix) into a
//! destination location, then keeps the destination current by watching
//! the source for changes.

pub mod backend;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod location;
pub mod manifest;
pub mod reconcile;
pub mod run;
pub mod utils;
pub mod watch;

// Re-export commonly used types
pub use config::{Config, SyncOptions};
pub use location::{Location, LocationSpec, Role, SyncPair};
pub use utils::errors::{Result, SyncError};
