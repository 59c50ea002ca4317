use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

const FILE_PREFIX: &str = "postwatch";
const FILE_SUFFIX: &str = "log";

/// Install the global subscriber: an optional console layer and an optional
/// hourly log file.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the life of the program.
pub fn init(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG wins over the configured console level
    let console = config.console.then(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        fmt::layer().with_filter(filter)
    });

    let (file, guard) = if config.file {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(config)?);
        let filter = EnvFilter::try_new(&config.file_level)
            .with_context(|| format!("Invalid logging.file_level: {}", config.file_level))?;
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(filter);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry().with(console).with(file).init();
    Ok(guard)
}

/// `{directory}/postwatch.yyyy-MM-dd-HH.log`, one file per hour.
fn file_appender(config: &LoggingConfig) -> anyhow::Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(FILE_PREFIX)
        .filename_suffix(FILE_SUFFIX)
        .build(&config.directory)
        .with_context(|| format!("Failed to open log directory {}", config.directory.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_appender_writes_hourly_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            ..Default::default()
        };

        let mut appender = file_appender(&config).unwrap();
        appender.write_all(b"hello\n").unwrap();
        appender.flush().unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("postwatch."));
        assert!(names[0].ends_with(".log"));
        // yyyy-MM-dd-HH between prefix and suffix
        assert_eq!(names[0].len(), "postwatch.".len() + 13 + ".log".len());
    }
}
