//! Tracing setup: console output plus an optional rotating log file.

use crate::error::ConfigError;
use crate::settings::{LogRotation, Settings};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive when `RUST_LOG` is unset.
pub fn default_directive(settings: &Settings) -> &'static str {
    if settings.debug {
        "graph_rest=debug,tower_http=debug"
    } else {
        "graph_rest=info"
    }
}

/// Install the global subscriber. Keep the returned guard alive for the life of the process
/// so buffered file output is flushed.
pub fn init_tracing(settings: &Settings) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(settings)));

    let (file_layer, guard) = if settings.log.enabled {
        let log = &settings.log;
        std::fs::create_dir_all(&log.location)
            .map_err(|e| ConfigError::Logging(format!("create {}: {}", log.location.display(), e)))?;
        let mut builder = RollingFileAppender::builder()
            .rotation(rotation(log.rotation))
            .filename_prefix(log.filename.clone());
        if log.backup_count > 0 {
            builder = builder.max_log_files(log.backup_count);
        }
        let appender = builder
            .build(&log.location)
            .map_err(|e| ConfigError::Logging(e.to_string()))?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer().with_target(true).with_ansi(false).with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;
    Ok(guard)
}

fn rotation(r: LogRotation) -> Rotation {
    match r {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}
