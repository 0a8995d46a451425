//! Windows backend for the veil harness. There is no interrupt signal
//! here, so the gentle shutdown path is skipped and close always goes
//! straight to forceful termination.

mod daemon_handle;

pub use daemon_handle::{WindowsProxyHandle, spawn};
