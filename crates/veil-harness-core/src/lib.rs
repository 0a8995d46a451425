//! Platform-independent pieces of the veil test harness.
//!
//! This crate holds the configuration models, the error type, and the
//! process-handle trait that the platform crates implement. Everything here
//! is plain types; spawning and signalling live in `veil-harness-unix` and
//! `veil-harness-windows`, and orchestration lives in `veil-harness`.

mod config;
mod error;
mod process;

pub use config::*;
pub use error::*;
pub use process::*;
