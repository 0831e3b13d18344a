//! Configuration, paths, errors, and logging setup shared by the acourse sync crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_URL, DEFAULT_DATABASE_URL, DEFAULT_DETACH_DELAY_MS, DEFAULT_LOG_LEVEL,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
