//! Integration-test harness for the veil proxy daemon.
//!
//! The harness launches a real daemon binary (`veil proxy -c <config>`),
//! polls its RPC control endpoint until a connection attempt succeeds, runs
//! test cases against the live daemon, and shuts it down with an
//! interrupt-then-terminate escalation so a test run never leaks processes.
//!
//! The pieces compose like this: [`VeilHarness`] materializes the daemon's
//! configuration and owns one [`ProxyProcess`]; [`wait_until_ready`] performs
//! the bounded readiness poll against a caller-supplied connection attempt;
//! [`run_suite`] executes named cases while guarding daemon liveness.

mod harness;
mod readiness;
mod suite;
mod supervisor;

pub use harness::VeilHarness;
pub use readiness::wait_until_ready;
pub use suite::{CaseFuture, SuiteCase, SuiteReport, run_suite};
pub use supervisor::ProxyProcess;

// Re-export the core types so callers only need this crate.
pub use veil_harness_core::*;

/// Spawn a daemon handle using the backend for the current platform.
pub fn spawn_daemon(spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>, HarnessError> {
    #[cfg(unix)]
    {
        Ok(Box::new(veil_harness_unix::spawn(spec)?))
    }
    #[cfg(windows)]
    {
        Ok(Box::new(veil_harness_windows::spawn(spec)?))
    }
}

/// Name of the platform backend compiled into this build.
pub fn platform_name() -> &'static str {
    #[cfg(unix)]
    {
        "unix"
    }
    #[cfg(windows)]
    {
        "windows"
    }
}
