use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use veil_harness_core::{ConnectPoint, ProxyConfig};

/// Stand-in for the daemon the harness supervises, used by its integration
/// tests. Reads the config file it is handed with the core crate's own
/// models, writes the control cookie, listens on the control endpoints and
/// idles until signalled. `MOCK_VEIL_*` environment variables bend it into
/// the failure scenarios the tests need.
#[derive(Parser, Debug)]
#[command(name = "mock-veil")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy daemon against a configuration file.
    Proxy {
        #[arg(short = 'c', long = "config")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Proxy { config } => run_proxy(config).await,
    }
}

async fn run_proxy(config_path: PathBuf) -> anyhow::Result<()> {
    // Signal handling goes in before anything slow happens. Once the
    // control endpoint is seen listening, the ignore knobs are in force.
    let shutdown = Shutdown::install()?;

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("reading config file {}", config_path.display()))?;
    let config = ProxyConfig::from_toml(&raw).context("parsing config file")?;
    info!(config = %config_path.display(), pid = std::process::id(), "mock daemon starting");

    std::fs::create_dir_all(&config.storage.cache_dir).context("creating cache dir")?;
    std::fs::create_dir_all(&config.storage.state_dir).context("creating state dir")?;

    if let Some(delay) = env_ms("MOCK_VEIL_LISTEN_DELAY_MS") {
        info!(?delay, "delaying listener startup");
        sleep(delay).await;
    }

    if env_flag("MOCK_VEIL_SKIP_LISTEN") {
        warn!("skipping the control listeners as instructed");
    } else {
        bind_control_endpoints(&config).await?;
    }

    shutdown.run(env_ms("MOCK_VEIL_EXIT_AFTER_MS")).await
}

async fn bind_control_endpoints(config: &ProxyConfig) -> anyhow::Result<()> {
    let tcp_point_file = config
        .rpc
        .listen
        .tcp_point
        .file
        .as_ref()
        .context("config names no tcp connect-point file")?;
    let raw = std::fs::read_to_string(tcp_point_file)
        .with_context(|| format!("reading connect point {}", tcp_point_file.display()))?;
    let point = ConnectPoint::from_toml(&raw)?;
    let addr: SocketAddr = point
        .inet_addr()
        .context("tcp connect point is not an inet endpoint")?
        .parse()
        .context("parsing control endpoint address")?;

    let cookie = point
        .cookie_path()
        .context("tcp connect point names no cookie file")?;
    std::fs::write(cookie, b"mock-veil-cookie\n")
        .with_context(|| format!("writing cookie file {}", cookie.display()))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding control endpoint {addr}"))?;
    info!(%addr, "control endpoint listening");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((_stream, peer)) => debug!(%peer, "control connection accepted"),
                Err(error) => {
                    warn!(%error, "control endpoint accept failed");
                    return;
                }
            }
        }
    });

    #[cfg(unix)]
    if config.rpc.listen.unix_point.enable.unwrap_or(false) {
        bind_unix_endpoint(config).await?;
    }

    Ok(())
}

#[cfg(unix)]
async fn bind_unix_endpoint(config: &ProxyConfig) -> anyhow::Result<()> {
    use tokio::net::UnixListener;

    let point_file = config
        .rpc
        .listen
        .unix_point
        .file
        .as_ref()
        .context("config names no unix connect-point file")?;
    let raw = std::fs::read_to_string(point_file)
        .with_context(|| format!("reading connect point {}", point_file.display()))?;
    let socket_path = ConnectPoint::from_toml(&raw)?
        .unix_path()
        .context("unix connect point is not a unix endpoint")?;

    // A previous run may have left the socket file behind.
    let _ = std::fs::remove_file(&socket_path);

    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding control socket {}", socket_path.display()))?;
    info!(socket = %socket_path.display(), "control socket listening");
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((_stream, _addr)) => debug!("control socket connection accepted"),
                Err(error) => {
                    warn!(%error, "control socket accept failed");
                    return;
                }
            }
        }
    });
    Ok(())
}

#[cfg(unix)]
struct Shutdown {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Shutdown {
    fn install() -> anyhow::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("installing SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("installing SIGTERM handler")?,
        })
    }

    async fn run(mut self, exit_after: Option<Duration>) -> anyhow::Result<()> {
        let ignore_interrupt = env_flag("MOCK_VEIL_IGNORE_INTERRUPT");
        let ignore_terminate = env_flag("MOCK_VEIL_IGNORE_TERMINATE");
        let marker = std::env::var_os("MOCK_VEIL_TERMINATE_MARKER").map(PathBuf::from);

        let deadline = exit_after.map(|after| tokio::time::Instant::now() + after);
        loop {
            tokio::select! {
                _ = self.interrupt.recv() => {
                    if ignore_interrupt {
                        warn!("ignoring SIGINT as instructed");
                        continue;
                    }
                    if let Some(delay) = env_ms("MOCK_VEIL_INTERRUPT_EXIT_DELAY_MS") {
                        info!(?delay, "winding down after SIGINT");
                        sleep(delay).await;
                    }
                    info!("exiting on SIGINT");
                    return Ok(());
                }
                _ = self.terminate.recv() => {
                    if let Some(path) = &marker {
                        if let Err(error) = std::fs::write(path, b"terminated\n") {
                            warn!(%error, "could not write the terminate marker");
                        }
                    }
                    if ignore_terminate {
                        warn!("ignoring SIGTERM as instructed");
                        continue;
                    }
                    info!("exiting on SIGTERM");
                    return Ok(());
                }
                _ = wait_until(deadline) => {
                    info!("self-exit timer fired");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(not(unix))]
struct Shutdown;

#[cfg(not(unix))]
impl Shutdown {
    fn install() -> anyhow::Result<Self> {
        Ok(Self)
    }

    async fn run(self, exit_after: Option<Duration>) -> anyhow::Result<()> {
        let deadline = exit_after.map(|after| tokio::time::Instant::now() + after);
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("listening for ctrl-c")?;
                info!("exiting on ctrl-c");
            }
            _ = wait_until(deadline) => {
                info!("self-exit timer fired");
            }
        }
        Ok(())
    }
}

async fn wait_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn env_ms(name: &str) -> Option<Duration> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(%name, %raw, "ignoring unparseable duration knob");
            None
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| !value.is_empty() && value != "0")
}
