//! Logging initialization.
//!
//! Thin wrapper over the observability crate so binaries only need a level.

pub use observability::LogConfig;

/// Service name written into every log line.
const SERVICE_NAME: &str = "acourse-sync";

/// Initialize logging for the sync client.
///
/// JSONL goes to `~/.acourse/logs/sync.jsonl`, human-readable output to
/// stderr. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) {
    init_logging_for_service(SERVICE_NAME, level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: normalize_level(level),
        also_stderr: true,
        ..Default::default()
    });
}

/// Lower-cases a level name and maps unknown values to "info".
fn normalize_level(level: &str) -> String {
    parse_level(level).as_str().to_ascii_lowercase()
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
