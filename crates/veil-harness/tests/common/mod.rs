//! Shared helpers for the integration tests.
//!
//! The tests drive the real `mock-veil` binary, so the workspace has to be
//! built before they run.

#![allow(dead_code)]

use std::env;
use std::future::Future;
use std::net::TcpListener as StdTcpListener;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

use veil_harness::{
    HarnessConfig, LaunchSpec, LaunchSpecBuilder, ReadinessConfig, VeilHarness, wait_until_ready,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Locate the `mock-veil` binary next to the test executable.
pub fn mock_veil_path() -> PathBuf {
    let mut path = env::current_exe()
        .expect("current test executable path")
        .parent()
        .expect("test executable directory")
        .to_path_buf();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(format!("mock-veil{}", env::consts::EXE_SUFFIX));
    assert!(
        path.is_file(),
        "mock-veil binary not found at {}; build it with `cargo build -p mock-veil`",
        path.display()
    );
    path
}

/// Reserve an ephemeral localhost port. The reserving listener is dropped
/// before the port is handed out; each test takes a fresh one.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").expect("bind an ephemeral port");
    let port = listener.local_addr().expect("listener address").port();
    drop(listener);
    port
}

/// Repeatable connection attempt against the mock daemon's TCP control endpoint.
pub fn tcp_connector(
    port: u16,
) -> impl FnMut() -> Pin<Box<dyn Future<Output = std::io::Result<TcpStream>> + Send>> {
    move || Box::pin(TcpStream::connect(("127.0.0.1", port)))
}

/// Harness configuration pointing at the mock daemon, with fast polling.
pub fn harness_config(root: &Path, control_port: u16) -> HarnessConfig {
    HarnessConfig::builder()
        .binary(mock_veil_path())
        .root_dir(root)
        .control_port(control_port)
        .proxy_port(free_port())
        .readiness(ReadinessConfig {
            timeout_ms: 3_000,
            poll_interval_ms: 100,
        })
        .build()
        .expect("harness config")
}

/// Materialize a run directory for direct `ProxyProcess` tests and return
/// the daemon config path inside it.
pub fn materialize_conf(root: &Path, control_port: u16) -> PathBuf {
    let harness =
        VeilHarness::new(harness_config(root, control_port)).expect("materialize run directory");
    harness.conf_file().to_path_buf()
}

/// Launch-spec builder preloaded with the mock daemon invocation.
pub fn mock_spec_builder(conf: &Path) -> LaunchSpecBuilder {
    let conf = conf.display().to_string();
    let mut builder = LaunchSpec::builder();
    builder
        .binary(mock_veil_path())
        .args(["proxy", "-c", conf.as_str()]);
    builder
}

/// Block until something accepts connections on `port`.
pub async fn wait_for_listening(port: u16) {
    let config = ReadinessConfig {
        timeout_ms: 5_000,
        poll_interval_ms: 50,
    };
    wait_until_ready(&config, tcp_connector(port))
        .await
        .expect("mock daemon should start listening");
}
