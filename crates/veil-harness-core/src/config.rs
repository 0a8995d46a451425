use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HarnessError;

/// Default port of the daemon's cookie-authenticated TCP control endpoint.
pub const DEFAULT_CONTROL_PORT: u16 = 18929;

/// Default port the daemon serves proxied client traffic on.
pub const DEFAULT_PROXY_PORT: u16 = 15986;

/// How long to poll the control endpoint for, and how often.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessConfig {
    /// Total time to wait for the control endpoint (in milliseconds)
    #[serde(default = "default_readiness_timeout_ms")]
    pub timeout_ms: u64,

    /// Fixed delay between connection attempts (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_readiness_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl ReadinessConfig {
    /// Validate the configuration and return an error if it is degenerate
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.timeout_ms == 0 {
            return Err(HarnessError::Config(
                "readiness timeout must be positive".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "poll interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the total timeout as a Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Number of connection attempts the timeout allows.
    ///
    /// Rounds up, so a timeout that is not a whole multiple of the poll
    /// interval still covers the full window. Returns 0 for an invalid
    /// (zero-interval) configuration; `validate` rejects that case.
    pub fn max_attempts(&self) -> u64 {
        if self.poll_interval_ms == 0 {
            return 0;
        }
        self.timeout_ms.div_ceil(self.poll_interval_ms)
    }
}

/// Grace and final-wait windows applied while closing the daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShutdownConfig {
    /// How long the daemon gets to exit voluntarily after an interrupt
    /// (in milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// How long to wait for the exit status after the last signal
    /// (in milliseconds)
    #[serde(default = "default_final_wait_ms")]
    pub final_wait_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            final_wait_ms: default_final_wait_ms(),
        }
    }
}

impl ShutdownConfig {
    /// Validate the configuration and return an error if it is degenerate
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.grace_period_ms == 0 {
            return Err(HarnessError::Config(
                "shutdown grace period must be positive".to_string(),
            ));
        }
        if self.final_wait_ms == 0 {
            return Err(HarnessError::Config(
                "shutdown final wait must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the grace period as a Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Get the final wait as a Duration
    pub fn final_wait(&self) -> Duration {
        Duration::from_millis(self.final_wait_ms)
    }
}

/// Caller-facing configuration for one harness run.
#[derive(Default, Debug, Clone, PartialEq, Builder)]
#[builder(setter(into, strip_option))]
pub struct HarnessConfig {
    /// Path to the daemon binary under test.
    pub binary: PathBuf,
    /// Directory that will hold every file of this run.
    pub root_dir: PathBuf,
    #[builder(default = "DEFAULT_CONTROL_PORT")]
    pub control_port: u16,
    #[builder(default = "DEFAULT_PROXY_PORT")]
    pub proxy_port: u16,
    #[builder(default)]
    pub readiness: ReadinessConfig,
    #[builder(default)]
    pub shutdown: ShutdownConfig,
    /// Extra environment passed through to the daemon process.
    #[builder(default)]
    #[builder(setter(custom))]
    pub extra_env: HashMap<String, String>,
}

impl HarnessConfig {
    pub fn builder() -> HarnessConfigBuilder {
        HarnessConfigBuilder::default()
    }
}

impl HarnessConfigBuilder {
    pub fn env<T: ToString>(&mut self, key: T, value: T) -> &mut Self {
        let map = self.extra_env.get_or_insert_with(HashMap::new);
        map.insert(key.to_string(), value.to_string());
        self
    }

    pub fn env_multi<T: ToString, I: IntoIterator<Item = (T, T)>>(&mut self, iter: I) -> &mut Self {
        let env = self.extra_env.get_or_insert_with(HashMap::new);
        for (key, value) in iter {
            env.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// Filesystem layout of a single harness run.
///
/// Everything lives under one root directory so a run can be thrown away
/// wholesale; nothing is shared across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct HarnessPaths {
    pub root: PathBuf,
    pub conf_file: PathBuf,
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
    pub control_socket: PathBuf,
    pub unix_point_file: PathBuf,
    pub tcp_point_file: PathBuf,
    pub cookie_file: PathBuf,
}

impl HarnessPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            conf_file: root.join("veil.toml"),
            cache_dir: root.join("cache"),
            state_dir: root.join("state"),
            control_socket: root.join("control.socket"),
            unix_point_file: root.join("control-unix.toml"),
            tcp_point_file: root.join("control-tcp.toml"),
            cookie_file: root.join("control-cookie.secret"),
            root,
        }
    }
}

/// On-disk configuration the daemon is launched with.
///
/// The schema is the daemon's own contract; this model mirrors it so the
/// harness can write it and the mock daemon can read it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxyConfig {
    pub rpc: RpcSection,
    pub storage: StorageSection,
    pub proxy: ProxySection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcSection {
    pub enable: bool,
    pub listen: ListenSection,
}

/// The daemon's control-endpoint listeners, keyed the way its config
/// file spells them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenSection {
    #[serde(rename = "user-default")]
    pub user_default: ListenPoint,
    #[serde(rename = "system-default")]
    pub system_default: ListenPoint,
    #[serde(rename = "unix-point")]
    pub unix_point: ListenPoint,
    #[serde(rename = "tcp-point")]
    pub tcp_point: ListenPoint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListenPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageSection {
    pub cache_dir: PathBuf,
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProxySection {
    pub socks_listen: u16,
}

impl ProxyConfig {
    /// Build the configuration the harness writes for one run.
    ///
    /// The built-in listeners are disabled and replaced with the two
    /// descriptor files the harness controls; `unix_listen` decides whether
    /// the unix-socket endpoint is enabled on this platform.
    pub fn for_harness(paths: &HarnessPaths, proxy_port: u16, unix_listen: bool) -> Self {
        Self {
            rpc: RpcSection {
                enable: true,
                listen: ListenSection {
                    user_default: ListenPoint {
                        enable: Some(false),
                        file: None,
                    },
                    system_default: ListenPoint {
                        enable: Some(false),
                        file: None,
                    },
                    unix_point: ListenPoint {
                        enable: Some(unix_listen),
                        file: Some(paths.unix_point_file.clone()),
                    },
                    tcp_point: ListenPoint {
                        enable: None,
                        file: Some(paths.tcp_point_file.clone()),
                    },
                },
            },
            storage: StorageSection {
                cache_dir: paths.cache_dir.clone(),
                state_dir: paths.state_dir.clone(),
            },
            proxy: ProxySection {
                socks_listen: proxy_port,
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, HarnessError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, HarnessError> {
        Ok(toml::from_str(content)?)
    }
}

/// A connect-point descriptor file naming one control endpoint.
///
/// Two shapes exist: a unix-socket endpoint with no authentication, and a
/// TCP endpoint authenticated by a cookie file the daemon writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectPoint {
    pub connect: ConnectTarget,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectTarget {
    /// Socket address with a scheme prefix, `unix:<path>` or `inet:<addr>`.
    pub socket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<ConnectAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConnectAuth {
    /// A bare mode string, currently only `"none"`.
    Mode(String),
    /// Cookie-file authentication.
    Cookie { cookie: CookiePath },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CookiePath {
    pub path: PathBuf,
}

impl ConnectPoint {
    /// Descriptor for the unauthenticated unix-socket endpoint.
    pub fn unix(socket_path: &Path) -> Self {
        Self {
            connect: ConnectTarget {
                socket: format!("unix:{}", socket_path.display()),
                auth: Some(ConnectAuth::Mode("none".to_string())),
            },
        }
    }

    /// Descriptor for the cookie-authenticated TCP endpoint on localhost.
    pub fn tcp(port: u16, cookie_file: &Path) -> Self {
        Self {
            connect: ConnectTarget {
                socket: format!("inet:127.0.0.1:{port}"),
                auth: Some(ConnectAuth::Cookie {
                    cookie: CookiePath {
                        path: cookie_file.to_path_buf(),
                    },
                }),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String, HarnessError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, HarnessError> {
        Ok(toml::from_str(content)?)
    }

    /// Socket path, if this is a unix endpoint.
    pub fn unix_path(&self) -> Option<PathBuf> {
        self.connect
            .socket
            .strip_prefix("unix:")
            .map(PathBuf::from)
    }

    /// `host:port` address, if this is an inet endpoint.
    pub fn inet_addr(&self) -> Option<&str> {
        self.connect.socket.strip_prefix("inet:")
    }

    /// Cookie file path, if this endpoint uses cookie authentication.
    pub fn cookie_path(&self) -> Option<&Path> {
        match &self.connect.auth {
            Some(ConnectAuth::Cookie { cookie }) => Some(&cookie.path),
            _ => None,
        }
    }
}

// Default value functions for serde
fn default_readiness_timeout_ms() -> u64 {
    3_000
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_grace_period_ms() -> u64 {
    10_000
}
fn default_final_wait_ms() -> u64 {
    10_000
}
