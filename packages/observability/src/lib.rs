//! # Observability
//!
//! Centralized logging setup for the acourse sync layer.
//!
//! Crates in the workspace are **log producers** only. They use the standard
//! `tracing` macros and never decide where output goes. The binary calls
//! [`init_with_config`] once at startup.
//!
//! ## Output
//!
//! - Structured JSONL appended to `~/.acourse/logs/sync.jsonl` (or
//!   [`LogConfig::log_path`]), one object per event.
//! - Optionally a compact human-readable stream on stderr.
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "acourse-sync".into(),
//!         default_level: "debug".into(),
//!         also_stderr: true,
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod writer;

use std::io;
use std::path::PathBuf;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use json_layer::{JsonLayer, LogEntry};
pub use writer::{AppendLogWriter, WriterFactory};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, included in every log line.
    pub service_name: String,

    /// Default filter (e.g. "debug", "info,realtime_multiplexer=trace").
    /// `RUST_LOG` takes precedence when set.
    pub default_level: String,

    /// Custom JSONL log file path.
    /// Defaults to `~/.acourse/logs/sync.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr.
    pub also_stderr: bool,

    /// Disable the JSONL file sink entirely (stderr only).
    pub file_disabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            file_disabled: false,
        }
    }
}

/// Default central log file location.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".acourse").join("logs").join("sync.jsonl"))
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the logging system with default settings for a service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the logging system with custom configuration.
///
/// Falls back to stderr-only output when the log file cannot be opened, so a
/// read-only home directory never prevents startup. Calling this twice is a
/// no-op for the second call.
pub fn init_with_config(config: LogConfig) {
    let log_path = if config.file_disabled {
        None
    } else {
        config.log_path.clone().or_else(default_log_path)
    };

    let mut open_error = None;
    let json_layer = log_path.as_ref().and_then(|path| {
        match AppendLogWriter::new(path) {
            Ok(writer) => Some(
                JsonLayer::new(config.service_name.clone(), WriterFactory::new(writer))
                    .with_filter(env_filter(&config.default_level)),
            ),
            Err(e) => {
                open_error = Some(format!("{}: {}", path.display(), e));
                None
            }
        }
    });

    let stderr_enabled = config.also_stderr || json_layer.is_none();
    let stderr_layer = stderr_enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .compact()
            .with_writer(io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if !installed {
        return;
    }

    match (open_error, log_path) {
        (Some(error), _) => tracing::warn!(%error, "log file unavailable, logging to stderr"),
        (None, Some(path)) => tracing::info!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        (None, None) => tracing::info!(service = %config.service_name, "observability initialized"),
    }
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
