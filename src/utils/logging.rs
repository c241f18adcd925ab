//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level when it is set. Events go to
//! stderr; stdout carries only the one-shot grading result.

use crate::config::LoggingConfig;
use crate::error::{Result, ShimError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber.
///
/// - `json`: one JSON object per event, for log shippers.
/// - anything else: the human-readable `pretty` format.
///
/// Fails if the level string is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(&config.level)?,
    };

    let installed = match config.format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
    };

    installed.map_err(|e| ShimError::Internal(format!("failed to install logger: {}", e)))
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| ShimError::Config(format!("invalid logging.level '{}': {}", level, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_accepts_directives() {
        assert!(build_filter("info").is_ok());
        assert!(build_filter("warn,exampro_shim::script=debug").is_ok());
    }

    #[test]
    fn test_build_filter_rejects_garbage() {
        assert!(build_filter("info,exampro_shim=loudest").is_err());
    }
}
