//! Structured logging setup (`SPEC_FULL.md` §10.1): `--log-format` picks a
//! compact colored formatter or a machine-parseable JSON one, `-v` maps onto
//! a `tracing::Level`, and `--log-file` layers a non-blocking file appender
//! alongside stderr.

use std::path::Path;

use clap::ValueEnum;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "UPPER")]
pub enum Verbosity {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    fn to_level_filter(self) -> LevelFilter {
        match self {
            Verbosity::Critical | Verbosity::Error => LevelFilter::ERROR,
            Verbosity::Warning => LevelFilter::WARN,
            Verbosity::Info => LevelFilter::INFO,
            Verbosity::Debug => LevelFilter::DEBUG,
            Verbosity::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Returns the file appender's guard, which
/// must be held for the process lifetime to flush buffered writes on exit.
pub fn init(
    format: LogFormat,
    verbosity: Verbosity,
    log_file: Option<&Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.to_level_filter().into())
        .from_env_lossy();

    let (file_writer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .unwrap_or_else(|e| panic!("failed to open log file {}: {e}", path.display()));
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            (Some(non_blocking), Some(guard))
        }
        None => (None, None),
    };

    let writer = match file_writer {
        Some(file) => std::io::stderr.and(file).boxed(),
        None => std::io::stderr.boxed(),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);

    match format {
        LogFormat::Human => builder.with_ansi(true).compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    guard
}
