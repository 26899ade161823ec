//! Tracing setup: console output, optional rolling file output, both
//! driven by [`LogSettings`].

use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::domain::settings::LogSettings;

/// Keeps the non-blocking file writer alive; dropping it flushes and
/// stops the background appender.
pub struct LoggingGuard {
    _guards: Vec<WorkerGuard>,
}

fn rotation_for(name: &str) -> Rotation {
    match name.to_lowercase().as_str() {
        "hourly" => Rotation::HOURLY,
        "minutely" => Rotation::MINUTELY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level when set.
pub fn init_logger(settings: &LogSettings) -> anyhow::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = settings.console_logging_enabled.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_thread_ids(settings.show_thread_ids)
            .with_target(settings.show_target)
            .with_ansi(settings.ansi_colors)
    });

    let mut guards = Vec::new();
    let file = if settings.file_logging_enabled {
        let appender = RollingFileAppender::new(
            rotation_for(&settings.rotation),
            &settings.log_dir,
            &settings.file_name_prefix,
        );
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(settings.show_thread_ids)
                .with_target(settings.show_target),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();

    tracing::info!("logging initialized");
    Ok(LoggingGuard { _guards: guards })
}
