use async_trait::async_trait;
use derive_builder::Builder;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitStatus;

use crate::config::ShutdownConfig;
use crate::error::HarnessError;

/// Everything needed to start the daemon once, plus the shutdown policy
/// applied when it is closed.
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct LaunchSpec {
    /// Path to the binary to spawn.
    pub binary: PathBuf,
    #[builder(default)]
    #[builder(setter(custom))]
    pub args: Vec<String>,
    #[builder(default)]
    #[builder(setter(custom))]
    pub env: HashMap<String, String>,
    #[builder(default)]
    pub shutdown: ShutdownConfig,
}

impl LaunchSpec {
    pub fn builder() -> LaunchSpecBuilder {
        LaunchSpecBuilder::default()
    }
}

impl LaunchSpecBuilder {
    pub fn args<S: ToString, I: IntoIterator<Item = S>>(&mut self, iter: I) -> &mut Self {
        let args: Vec<String> = iter.into_iter().map(|s| s.to_string()).collect();
        self.args = Some(args);
        self
    }

    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Handle to a spawned daemon process, implemented once per platform.
///
/// The supervisor drives shutdown through this surface; implementations
/// deliver signals and report exit status, they do not decide policy.
/// Signal delivery to a process that already exited is a quiet no-op, so
/// the supervisor never races its own escalation.
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, or None once the process has been reaped.
    fn pid(&self) -> Option<u32>;

    /// Whether this platform can deliver an interrupt for a gentle shutdown.
    fn supports_interrupt(&self) -> bool;

    /// Non-blocking exit-status poll.
    fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>>;

    /// Ask the process to wind down voluntarily (SIGINT where supported).
    fn send_interrupt(&mut self) -> Result<(), HarnessError>;

    /// Tell the process to exit now (SIGTERM, or the platform equivalent).
    fn send_terminate(&mut self) -> Result<(), HarnessError>;

    /// Wait until the process exits and return its status.
    async fn wait(&mut self) -> std::io::Result<ExitStatus>;
}
