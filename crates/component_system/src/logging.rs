//! Logging system setup.
//!
//! The library itself only emits `tracing` events; hosts that want them on
//! stdout or in a file call [`setup_logging`] once at startup.

use crate::config::LoggingSettings;
use crate::error::ConfigError;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs a global tracing subscriber built from `config`.
///
/// `RUST_LOG` takes precedence over the configured level when set.
/// `json_format` forces JSON output regardless of the configuration.
/// With `file_path` set, output is appended to that file (created if
/// missing) without ANSI colours; otherwise it goes to stdout.
///
/// Fails with [`ConfigError::Io`] if the log file cannot be opened and with
/// [`ConfigError::Logging`] if a global subscriber is already set.
pub fn setup_logging(
    config: &LoggingSettings,
    json_format: bool,
) -> Result<(), ConfigError> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let (writer, ansi) = match &config.file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(ansi)
                    .with_writer(writer)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    };
    installed.map_err(|err| ConfigError::Logging(err.to_string()))?;

    match &config.file_path {
        Some(path) => info!("🔧 Logging initialized with level: {} -> {}", log_level, path),
        None => info!("🔧 Logging initialized with level: {}", log_level),
    }
    Ok(())
}
