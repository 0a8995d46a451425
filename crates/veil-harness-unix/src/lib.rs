//! Unix backend for the veil harness: spawning the daemon and delivering
//! SIGINT/SIGTERM to it.

mod daemon_handle;

pub use daemon_handle::{UnixProxyHandle, spawn};
