//! Process lifecycle.

pub mod shutdown;

pub use shutdown::{wait_for_signal, ShutdownSignal};
