//! Logging setup via tracing-subscriber
//!
//! The filter comes from `RUST_LOG` when set, otherwise from
//! `logging.level`. Output goes to stdout as text or JSON, and optionally
//! to a plain-text log file as well.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingConfig;

pub fn init(config: &LoggingConfig) -> Result<()> {
    anyhow::ensure!(
        format_is_valid(&config.format),
        "Unsupported log format '{}' (expected text or json)",
        config.format
    );

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = match config.format.as_str() {
        "json" => fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed(),
        _ => fmt::layer().with_target(true).boxed(),
    };

    let file = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory {}", parent.display())
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to initialise logging")?;

    Ok(())
}

/// Whether `format` is a supported output format
pub fn format_is_valid(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_validation() {
        assert!(format_is_valid("text"));
        assert!(format_is_valid("json"));
        assert!(!format_is_valid("JSON"));
        assert!(!format_is_valid("xml"));
    }
}
