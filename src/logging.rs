//! # Logging
//!
//! Structured logging via `tracing`, ported from the teacher's own
//! `logging.rs`: a detailed layer (file or stderr, uncolored) for complete
//! records, and an optional colorized stdout layer for clean human-facing
//! output. `init_tracing` returns the `tracing_appender` guard — it must be
//! held for the process lifetime or file logging stops as soon as it drops.

use colored::Colorize;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

/// Colors an entire event line by its severity level, with no timestamp or
/// level prefix — meant for the stdout-facing layer, not the detailed log.
pub struct ColorizedFormatter;

impl<S, N> FormatEvent<S, N> for ColorizedFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_output = match *event.metadata().level() {
            Level::INFO => buffer.white(),
            Level::WARN => buffer.yellow(),
            Level::ERROR => buffer.red(),
            Level::DEBUG => buffer.blue(),
            Level::TRACE => buffer.purple(),
        };
        writeln!(writer, "{colored_output}")
    }
}

/// Verbosity in number of `-v` flags, mapped to a `tracing` level filter.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Install the global subscriber: a detailed layer to `log_file` (or stderr
/// if `log_file` is `None`), plus a colorized stdout layer unless `quiet`.
/// Returns the non-blocking writer guard, which must be held by the caller.
pub fn init_tracing(
    verbose: u8,
    log_file: Option<&str>,
    quiet: bool,
) -> tracing_appender::non_blocking::WorkerGuard {
    let level = level_for_verbosity(verbose);

    let (writer, guard) = match log_file {
        Some(path) => {
            let log_path = std::path::Path::new(path);
            let dir = log_path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let name = log_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new("multio.log"));
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let detailed_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(log_file.is_none())
        .with_filter(level);

    let stdout_layer = if quiet {
        None
    } else {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .event_format(ColorizedFormatter)
                .with_filter(level),
        )
    };

    tracing_subscriber::registry()
        .with(detailed_layer)
        .with(stdout_layer)
        .init();

    guard
}
