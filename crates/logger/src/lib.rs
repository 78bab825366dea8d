// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Structured logger construction
//!
//! Builds JSON-line loggers on top of `tracing-subscriber` and hands them out as
//! [`Logger`] handles. A handle wraps its own [`Dispatch`], so several loggers can
//! coexist in one process (one per server, one per test) without fighting over the
//! global default.
//!
//! # Example
//!
//! ```no_run
//! let logger = logger::new_service_logger("info", "billing", "1.4.0")?;
//! logger.in_scope(|| tracing::info!(port = 8080, "service starting"));
//! # Ok::<(), logger::LoggerError>(())
//! ```

use std::{
    io,
    str::FromStr,
    sync::{Arc, Mutex},
};

use thiserror::Error;
use tracing::{Dispatch, Level, Span, dispatcher, level_filters::LevelFilter};
use tracing_subscriber::fmt::MakeWriter;

/// Errors raised while building or installing a logger
#[derive(Error, Debug)]
pub enum LoggerError {
    /// The level string is not one of `off`, `error`, `warn`, `info`, `debug`, `trace`
    #[error("invalid log level {level:?}: {message}")]
    InvalidLevel {
        /// Level string as supplied
        level: String,
        /// Parser message
        message: String,
    },

    /// A global default subscriber was already installed
    #[error("failed to install global logger: {source}")]
    Global {
        /// Underlying tracing error
        #[source]
        source: dispatcher::SetGlobalDefaultError,
    },
}

/// Result type for logger construction
pub type LoggerResult<T> = Result<T, LoggerError>;

/// Handle to a structured logger
///
/// Cloning is cheap; all clones write to the same sink.
#[derive(Debug, Clone)]
pub struct Logger {
    dispatch: Dispatch,
    span: Option<Span>,
}

impl Logger {
    /// A logger that drops every event
    pub fn nop() -> Self {
        Self {
            dispatch: Dispatch::none(),
            span: None,
        }
    }

    /// Run `f` with this logger as the default dispatcher
    ///
    /// Events emitted with the `tracing` macros inside `f` go to this logger. For a
    /// service logger they also carry the `service` and `version` fields.
    pub fn in_scope<R>(&self, f: impl FnOnce() -> R) -> R {
        dispatcher::with_default(&self.dispatch, || match &self.span {
            Some(span) => span.in_scope(f),
            None => f(),
        })
    }

    /// Underlying dispatcher
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Install this logger as the process-wide default
    ///
    /// Service fields are only attached inside [`Logger::in_scope`].
    pub fn init_global(&self) -> LoggerResult<()> {
        dispatcher::set_global_default(self.dispatch.clone())
            .map_err(|source| LoggerError::Global { source })
    }
}

/// Create a JSON logger writing to stdout at the given level
pub fn new_logger(level: &str) -> LoggerResult<Logger> {
    new_logger_with_writer(level, io::stdout)
}

/// Create a JSON logger writing to an arbitrary sink
pub fn new_logger_with_writer<W>(level: &str, writer: W) -> LoggerResult<Logger>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let level = parse_level(level)?;
    Ok(Logger {
        dispatch: build_dispatch(level, writer),
        span: None,
    })
}

/// Create a JSON logger whose events are tagged with the service name and version
pub fn new_service_logger(level: &str, service: &str, version: &str) -> LoggerResult<Logger> {
    new_service_logger_with_writer(level, service, version, io::stdout)
}

/// Service logger writing to an arbitrary sink
pub fn new_service_logger_with_writer<W>(
    level: &str,
    service: &str,
    version: &str,
    writer: W,
) -> LoggerResult<Logger>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let mut logger = new_logger_with_writer(level, writer)?;
    // ERROR-level span so the fields survive every filter short of `off`
    let span = dispatcher::with_default(&logger.dispatch, || {
        tracing::span!(Level::ERROR, "service", service = %service, version = %version)
    });
    logger.span = Some(span);
    Ok(logger)
}

fn parse_level(level: &str) -> LoggerResult<LevelFilter> {
    LevelFilter::from_str(level.trim()).map_err(|e| LoggerError::InvalidLevel {
        level: level.to_string(),
        message: e.to_string(),
    })
}

fn build_dispatch<W>(level: LevelFilter, writer: W) -> Dispatch
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(level)
        .with_current_span(true)
        .with_span_list(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(writer)
        .finish();

    Dispatch::new(subscriber)
}

/// In-memory log sink
///
/// Every clone appends to the same buffer. Handy for asserting on log output.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemoryWriter {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded as UTF-8
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .map(|buf| String::from_utf8_lossy(&buf).into_owned())
            .unwrap_or_default()
    }
}

impl io::Write for MemoryWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut buf = self
            .buffer
            .lock()
            .map_err(|_| io::Error::other("log buffer poisoned"))?;
        buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'w> MakeWriter<'w> for MemoryWriter {
    type Writer = MemoryWriter;

    fn make_writer(&'w self) -> Self::Writer {
        self.clone()
    }
}
