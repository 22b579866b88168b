//! Subscriber installation for binaries. Library code only emits events.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "mxln_chat=info,chat_api=info,session_api=info,warn";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Picks the filter directive: `RUST_LOG`, then `configured`, then the default.
#[must_use]
pub fn resolve_filter(configured: Option<&str>) -> String {
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| {
            configured
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string())
}

/// Installs a stderr fmt subscriber filtered by [`resolve_filter`].
pub fn init_logging(configured: Option<&str>) -> Result<(), LoggingError> {
    let directive = resolve_filter(configured);
    let filter = EnvFilter::try_new(&directive).map_err(|source| LoggingError::InvalidFilter {
        filter: directive.clone(),
        source,
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInstalled)
}
