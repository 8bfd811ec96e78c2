//! Tracing initialisation for perfci binaries.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable, ANSI colours disabled (CI consoles rarely render them).
    Plain,
    /// Newline-delimited JSON for log collectors.
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Plain
        }
    }
}

/// Install the global subscriber writing to stderr. `RUST_LOG` takes
/// precedence over `level`.
///
/// Returns `false` when a subscriber was already installed; the global
/// subscriber can only be set once per process.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false).json())
            .try_init(),
        LogFormat::Plain => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(false),
            )
            .try_init(),
    };
    installed.is_ok()
}
