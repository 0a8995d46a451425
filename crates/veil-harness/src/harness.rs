use std::fmt::Display;
use std::fs;
use std::future::Future;
use std::path::Path;
use tracing::{error, info, warn};

use crate::{
    ConnectPoint, HarnessConfig, HarnessError, HarnessPaths, LaunchSpec, ProxyConfig, ProxyProcess,
    wait_until_ready,
};

/// One self-contained run of the daemon under test.
///
/// Construction materializes the run directory: the daemon's config file,
/// the two connect-point descriptor files, and the cache and state paths,
/// all under one disposable root. [`VeilHarness::launch`] then starts the
/// daemon and polls its control endpoint until it is reachable.
pub struct VeilHarness {
    config: HarnessConfig,
    paths: HarnessPaths,
    proxy: Option<ProxyProcess>,
}

impl VeilHarness {
    /// Materialize the run directory and connection files for `config`.
    ///
    /// The daemon is not started; call [`VeilHarness::launch`] for that.
    pub fn new(config: HarnessConfig) -> Result<Self, HarnessError> {
        config.readiness.validate()?;
        config.shutdown.validate()?;

        let root = std::path::absolute(&config.root_dir)?;
        let paths = HarnessPaths::under(root);
        fs::create_dir_all(&paths.root)?;

        let unix_point = ConnectPoint::unix(&paths.control_socket);
        fs::write(&paths.unix_point_file, unix_point.to_toml()?)?;

        let tcp_point = ConnectPoint::tcp(config.control_port, &paths.cookie_file);
        fs::write(&paths.tcp_point_file, tcp_point.to_toml()?)?;

        let daemon_config = ProxyConfig::for_harness(&paths, config.proxy_port, cfg!(unix));
        fs::write(&paths.conf_file, daemon_config.to_toml()?)?;
        info!(root = %paths.root.display(), "materialized harness run directory");

        Ok(Self {
            config,
            paths,
            proxy: None,
        })
    }

    /// Start the daemon and wait until `attempt_connection` succeeds once.
    ///
    /// The connection's success value is returned. On a readiness timeout the
    /// daemon is force-closed before the error is surfaced, so a failed
    /// launch never leaks a process.
    pub async fn launch<T, E, F, Fut>(&mut self, attempt_connection: F) -> Result<T, HarnessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self.proxy.is_some() {
            return Err(HarnessError::AlreadyStarted);
        }

        let conf = self.paths.conf_file.display().to_string();
        let spec = LaunchSpec::builder()
            .binary(self.config.binary.clone())
            .args(["proxy", "-c", conf.as_str()])
            .env_multi(self.config.extra_env.clone())
            .shutdown(self.config.shutdown.clone())
            .build()
            .map_err(|e| HarnessError::Config(e.to_string()))?;

        let mut proxy = ProxyProcess::new(spec);
        proxy.start()?;

        match wait_until_ready(&self.config.readiness, attempt_connection).await {
            Ok(value) => {
                self.proxy = Some(proxy);
                Ok(value)
            }
            Err(err) => {
                if proxy.is_running() {
                    error!("daemon is alive but its control endpoint never became reachable");
                } else {
                    error!("daemon exited before its control endpoint became reachable");
                }
                if let Err(close_err) = proxy.close(false).await {
                    warn!(error = %close_err, "failed to close the daemon after a failed launch");
                }
                Err(err)
            }
        }
    }

    /// Whether a launched daemon is currently alive.
    pub fn proxy_is_running(&mut self) -> bool {
        self.proxy.as_mut().is_some_and(|proxy| proxy.is_running())
    }

    /// OS process id of the launched daemon, if one is held.
    pub fn proxy_pid(&self) -> Option<u32> {
        self.proxy.as_ref().and_then(|proxy| proxy.pid())
    }

    /// Close the daemon if one is held.
    ///
    /// Delegates to [`ProxyProcess::close`]; without a live daemon this is
    /// a no-op, so cleanup paths can always call it.
    pub async fn shutdown(&mut self, gently: bool) -> Result<(), HarnessError> {
        if let Some(proxy) = self.proxy.as_mut() {
            proxy.close(gently).await?;
            self.proxy = None;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.paths.root
    }

    pub fn conf_file(&self) -> &Path {
        &self.paths.conf_file
    }

    pub fn control_socket(&self) -> &Path {
        &self.paths.control_socket
    }

    /// Unix connect-point descriptor, on platforms that have one.
    pub fn unix_point_file(&self) -> Option<&Path> {
        if cfg!(unix) {
            Some(&self.paths.unix_point_file)
        } else {
            None
        }
    }

    pub fn tcp_point_file(&self) -> &Path {
        &self.paths.tcp_point_file
    }

    pub fn cookie_file(&self) -> &Path {
        &self.paths.cookie_file
    }

    pub fn control_port(&self) -> u16 {
        self.config.control_port
    }

    pub fn proxy_port(&self) -> u16 {
        self.config.proxy_port
    }
}
