#[cfg(windows)]
mod windows_impl {
    use async_trait::async_trait;
    use std::process::{ExitStatus, Stdio};
    use tokio::process::{Child, Command};
    use tracing::{debug, info};
    use veil_harness_core::{HarnessError, LaunchSpec, ProcessHandle};

    /// Keeps the daemon from popping up a console window of its own.
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    /// Handle to a daemon process spawned on a windows target.
    #[derive(Debug)]
    pub struct WindowsProxyHandle {
        child: Child,
    }

    /// Spawn the daemon described by `spec` as a direct child process.
    pub fn spawn(spec: &LaunchSpec) -> Result<WindowsProxyHandle, HarnessError> {
        let mut command = Command::new(&spec.binary);
        command.args(&spec.args);
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        command.stdout(Stdio::inherit());
        command.stderr(Stdio::inherit());
        command.creation_flags(CREATE_NO_WINDOW);
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
        Ok(WindowsProxyHandle { child })
    }

    #[async_trait]
    impl ProcessHandle for WindowsProxyHandle {
        fn pid(&self) -> Option<u32> {
            self.child.id()
        }

        fn supports_interrupt(&self) -> bool {
            // No SIGINT equivalent for a detached child here; the gentle
            // shutdown path is skipped entirely on this platform.
            false
        }

        fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
            self.child.try_wait()
        }

        fn send_interrupt(&mut self) -> Result<(), HarnessError> {
            Err(HarnessError::InterruptUnsupported)
        }

        fn send_terminate(&mut self) -> Result<(), HarnessError> {
            match self.child.start_kill() {
                Ok(()) => {
                    debug!(pid = ?self.child.id(), "terminated daemon process");
                    Ok(())
                }
                // Raised when the child was already reaped.
                Err(error) if error.kind() == std::io::ErrorKind::InvalidInput => {
                    debug!("process already gone");
                    Ok(())
                }
                Err(error) => Err(error.into()),
            }
        }

        async fn wait(&mut self) -> std::io::Result<ExitStatus> {
            self.child.wait().await
        }
    }
}

#[cfg(windows)]
pub use windows_impl::{WindowsProxyHandle, spawn};

// Stubs so the crate still compiles when the workspace is built on other
// targets; nothing constructs them there.
#[cfg(not(windows))]
pub struct WindowsProxyHandle;

#[cfg(not(windows))]
pub fn spawn(
    _spec: &veil_harness_core::LaunchSpec,
) -> Result<WindowsProxyHandle, veil_harness_core::HarnessError> {
    Err(veil_harness_core::HarnessError::Config(
        "windows daemon handles are only available on windows targets".to_string(),
    ))
}

#[cfg(all(test, windows))]
mod tests {
    use super::*;
    use veil_harness_core::{LaunchSpec, ProcessHandle};

    #[tokio::test]
    async fn test_spawn_and_wait() {
        let spec = LaunchSpec::builder()
            .binary("cmd")
            .args(["/C", "echo hello"])
            .build()
            .unwrap();
        let mut handle = spawn(&spec).expect("spawn cmd");
        assert!(!handle.supports_interrupt());
        let status = handle.wait().await.expect("wait for cmd");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_terminate_after_exit() {
        let spec = LaunchSpec::builder()
            .binary("cmd")
            .args(["/C", "echo done"])
            .build()
            .unwrap();
        let mut handle = spawn(&spec).expect("spawn cmd");
        handle.wait().await.expect("wait for cmd");
        handle.send_terminate().expect("terminate after exit");
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let spec = LaunchSpec::builder()
            .binary("Z:\\nonexistent\\veil-daemon.exe")
            .build()
            .unwrap();
        let error = spawn(&spec).expect_err("binary does not exist");
        assert!(format!("{error}").contains("veil-daemon.exe"));
    }
}
