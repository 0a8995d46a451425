use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Error type shared by every crate in the harness workspace.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("failed to spawn proxy process `{binary}`: {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("control endpoint not reachable within {timeout:?}")]
    ReadinessTimeout { timeout: Duration },

    #[error("proxy process {pid:?} still alive {waited:?} after terminate signal")]
    ShutdownTimeout { pid: Option<u32>, waited: Duration },

    #[error("proxy process already started; create a new ProxyProcess to relaunch")]
    AlreadyStarted,

    #[error("proxy process is not running ({0})")]
    ProxyNotRunning(String),

    #[error("interrupt signals are not supported on this platform")]
    InterruptUnsupported,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to render configuration: {0}")]
    ConfigRender(#[from] toml::ser::Error),

    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_display() {
        let error = HarnessError::Spawn {
            binary: PathBuf::from("/missing/veil"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        let display = format!("{error}");
        assert!(display.contains("/missing/veil"));
        assert!(display.contains("failed to spawn"));
    }

    #[test]
    fn test_readiness_timeout_display() {
        let error = HarnessError::ReadinessTimeout {
            timeout: Duration::from_secs(3),
        };
        assert!(format!("{error}").contains("3s"));
    }

    #[test]
    fn test_shutdown_timeout_display() {
        let error = HarnessError::ShutdownTimeout {
            pid: Some(4242),
            waited: Duration::from_secs(10),
        };
        let display = format!("{error}");
        assert!(display.contains("4242"));
        assert!(display.contains("10s"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        let error: HarnessError = io.into();
        assert!(matches!(error, HarnessError::Io(_)));
    }

    #[test]
    fn test_error_debug_format() {
        let error = HarnessError::AlreadyStarted;
        assert!(format!("{error:?}").contains("AlreadyStarted"));
    }
}
