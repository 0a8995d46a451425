#[cfg(unix)]
mod unix_impl {
    use async_trait::async_trait;
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    use std::process::{ExitStatus, Stdio};
    use tokio::process::{Child, Command};
    use tracing::{debug, info};
    use veil_harness_core::{HarnessError, LaunchSpec, ProcessHandle};

    /// Handle to a daemon process spawned on a unix target.
    #[derive(Debug)]
    pub struct UnixProxyHandle {
        child: Child,
    }

    /// Spawn the daemon described by `spec` as a direct child process.
    ///
    /// Stdout and stderr stay attached to the parent's, so the daemon's own
    /// logs end up interleaved with the test output.
    /// TODO: capture the daemon's output instead of inheriting it.
    pub fn spawn(spec: &LaunchSpec) -> Result<UnixProxyHandle, HarnessError> {
        let mut command = Command::new(&spec.binary);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());
        // Last-resort leak protection if the handle is dropped while live.
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|source| HarnessError::Spawn {
            binary: spec.binary.clone(),
            source,
        })?;
        info!(
            pid = ?child.id(),
            binary = %spec.binary.display(),
            "spawned daemon process"
        );
        Ok(UnixProxyHandle { child })
    }

    impl UnixProxyHandle {
        fn signal(&self, signal: Signal) -> Result<(), HarnessError> {
            let Some(pid) = self.child.id() else {
                // Already reaped, nothing left to signal.
                return Ok(());
            };
            match signal::kill(Pid::from_raw(pid as i32), signal) {
                Ok(()) => {
                    debug!(pid, %signal, "delivered signal");
                    Ok(())
                }
                Err(Errno::ESRCH) => {
                    debug!(pid, %signal, "process already gone");
                    Ok(())
                }
                Err(errno) => Err(std::io::Error::from_raw_os_error(errno as i32).into()),
            }
        }
    }

    #[async_trait]
    impl ProcessHandle for UnixProxyHandle {
        fn pid(&self) -> Option<u32> {
            self.child.id()
        }

        fn supports_interrupt(&self) -> bool {
            true
        }

        fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
            self.child.try_wait()
        }

        fn send_interrupt(&mut self) -> Result<(), HarnessError> {
            self.signal(Signal::SIGINT)
        }

        fn send_terminate(&mut self) -> Result<(), HarnessError> {
            self.signal(Signal::SIGTERM)
        }

        async fn wait(&mut self) -> std::io::Result<ExitStatus> {
            self.child.wait().await
        }
    }
}

#[cfg(unix)]
pub use unix_impl::{UnixProxyHandle, spawn};

// Stubs so the crate still compiles when the workspace is built on other
// targets; nothing constructs them there.
#[cfg(not(unix))]
pub struct UnixProxyHandle;

#[cfg(not(unix))]
pub fn spawn(
    _spec: &veil_harness_core::LaunchSpec,
) -> Result<UnixProxyHandle, veil_harness_core::HarnessError> {
    Err(veil_harness_core::HarnessError::Config(
        "unix daemon handles are only available on unix targets".to_string(),
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use veil_harness_core::{LaunchSpec, ProcessHandle};

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let spec = LaunchSpec::builder()
            .binary("echo")
            .args(["hello"])
            .build()
            .unwrap();
        let mut handle = spawn(&spec).expect("spawn echo");
        assert!(handle.supports_interrupt());
        let status = handle.wait().await.expect("wait for echo");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_signal_after_exit() {
        let spec = LaunchSpec::builder()
            .binary("echo")
            .args(["done"])
            .build()
            .unwrap();
        let mut handle = spawn(&spec).expect("spawn echo");
        handle.wait().await.expect("wait for echo");
        handle.send_interrupt().expect("interrupt after exit");
        handle.send_terminate().expect("terminate after exit");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = LaunchSpec::builder()
            .binary("/nonexistent/veil-daemon")
            .build()
            .unwrap();
        let error = spawn(&spec).expect_err("binary does not exist");
        assert!(format!("{error}").contains("/nonexistent/veil-daemon"));
    }
}
