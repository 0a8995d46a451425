use tokio::time::timeout;
use tracing::{info, warn};

use crate::{HarnessError, LaunchSpec, ProcessHandle, platform_name, spawn_daemon};

/// Supervises the lifecycle of exactly one daemon process.
///
/// A `ProxyProcess` is created empty, populated by [`start`](Self::start),
/// and cleared again once [`close`](Self::close) has seen the process exit.
/// A cleared instance cannot be restarted; create a fresh one instead.
///
/// Dropping a `ProxyProcess` that still holds a live process terminates it
/// as a fallback, so a panicking test cannot leak a daemon that would hold
/// on to ports and socket files needed by the next run.
pub struct ProxyProcess {
    spec: LaunchSpec,
    handle: Option<Box<dyn ProcessHandle>>,
    started: bool,
}

impl ProxyProcess {
    pub fn new(spec: LaunchSpec) -> Self {
        Self {
            spec,
            handle: None,
            started: false,
        }
    }

    /// Spawn the daemon described by the launch spec.
    ///
    /// Fails with [`HarnessError::Spawn`] if the binary cannot be executed
    /// and with [`HarnessError::AlreadyStarted`] on any second call.
    pub fn start(&mut self) -> Result<(), HarnessError> {
        if self.started {
            return Err(HarnessError::AlreadyStarted);
        }
        let handle = spawn_daemon(&self.spec)?;
        info!(
            pid = ?handle.pid(),
            platform = platform_name(),
            "proxy process started"
        );
        self.handle = Some(handle);
        self.started = true;
        Ok(())
    }

    /// OS process id of the daemon, if it is currently held.
    pub fn pid(&self) -> Option<u32> {
        self.handle.as_ref().and_then(|handle| handle.pid())
    }

    /// Non-blocking liveness check.
    ///
    /// False before [`start`](Self::start) and after a successful
    /// [`close`](Self::close); otherwise true iff the process has not
    /// exited yet.
    pub fn is_running(&mut self) -> bool {
        match self.handle.as_mut() {
            None => false,
            Some(handle) => matches!(handle.try_wait(), Ok(None)),
        }
    }

    /// Shut the daemon down and wait for it to exit.
    ///
    /// With `gently` set (and a platform that can deliver interrupts), the
    /// daemon first gets an interrupt and the configured grace period to
    /// exit on its own; only if it overstays is the terminate signal sent.
    /// Without `gently`, or without interrupt support, terminate is sent
    /// immediately. Every path then waits up to the configured final wait
    /// for the exit status before clearing the handle.
    ///
    /// Calling `close` again after it has succeeded is a no-op; no second
    /// signal is delivered. If the process outlives the final wait the
    /// handle is kept, the error is surfaced, and the drop fallback still
    /// applies.
    pub async fn close(&mut self, gently: bool) -> Result<(), HarnessError> {
        let grace_period = self.spec.shutdown.grace_period();
        let final_wait = self.spec.shutdown.final_wait();
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        let pid = handle.pid();

        if gently && handle.supports_interrupt() {
            handle.send_interrupt()?;
            if timeout(grace_period, handle.wait()).await.is_err() {
                warn!(?pid, "proxy ignored interrupt; sending terminate");
                handle.send_terminate()?;
            }
        } else {
            handle.send_terminate()?;
        }

        match timeout(final_wait, handle.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(?pid, %status, "proxy process exited");
                self.handle = None;
                Ok(())
            }
            Err(_) => Err(HarnessError::ShutdownTimeout {
                pid,
                waited: final_wait,
            }),
        }
    }
}

impl Drop for ProxyProcess {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if matches!(handle.try_wait(), Ok(None)) {
                warn!(
                    pid = ?handle.pid(),
                    "proxy process still running on drop; terminating"
                );
                if let Err(error) = handle.send_terminate() {
                    warn!(%error, "terminate on drop failed");
                }
            }
        }
    }
}
