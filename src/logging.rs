//! Tracing subscriber setup

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize structured logging
///
/// `RUST_LOG` takes precedence over the configured level. The `json` format
/// is meant for production log shipping, anything else prints human-readable
/// output. With `file_path` set, logs are appended to that file instead of
/// stdout.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},stream_relay={level}")));

    let registry = tracing_subscriber::registry().with(env_filter);

    let file = match &config.file_path {
        Some(path) => Some(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        ),
        None => None,
    };

    match (config.format.as_str(), file) {
        ("json", Some(file)) => registry
            .with(fmt::layer().json().with_current_span(true).with_writer(std::sync::Arc::new(file)))
            .try_init()?,
        ("json", None) => registry
            .with(fmt::layer().json().with_current_span(true))
            .try_init()?,
        (_, Some(file)) => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(std::sync::Arc::new(file)),
            )
            .try_init()?,
        (_, None) => registry.with(fmt::layer().with_target(true)).try_init()?,
    }

    Ok(())
}

/// Parse a log level name
fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_invalid_level_fails_before_init() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..Default::default()
        };

        assert!(init_logging(&config).is_err());
    }
}
