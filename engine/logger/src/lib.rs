//! Structured logging handle, following `ic-logger`'s `ReplicaLogger` shape:
//! a thin wrapper around [`slog::Logger`] with a no-op default so components
//! can be constructed without wiring up a logging backend in tests.

use slog::Drain;
use std::sync::Mutex;

/// Re-export slog's leveled logging macros so call sites read `info!(logger, "...")`
/// exactly as in the teacher crate, without every downstream crate depending on
/// `slog` directly for the macro names.
pub use slog::{debug, error, info, o, warn};

/// The logger handle threaded through every client/server constructor.
#[derive(Clone)]
pub struct EngineLogger(slog::Logger);

impl EngineLogger {
    pub fn new(drain: slog::Logger) -> Self {
        EngineLogger(drain)
    }

    /// A logger that discards everything, used as the default in tests and
    /// wherever the caller does not wire up a real sink.
    pub fn no_op() -> Self {
        EngineLogger(slog::Logger::root(slog::Discard, slog::o!()))
    }

    /// A logger writing human-readable lines to stderr, asynchronously.
    pub fn terminal() -> Self {
        let decorator = slog_term::TermDecorator::new().build();
        let drain = slog_term::FullFormat::new(decorator).build().fuse();
        let drain = Mutex::new(drain).fuse();
        let drain = slog_async::Async::new(drain).build().fuse();
        EngineLogger(slog::Logger::root(drain, slog::o!()))
    }
}

impl std::ops::Deref for EngineLogger {
    type Target = slog::Logger;

    fn deref(&self) -> &slog::Logger {
        &self.0
    }
}

/// Matches `ic_logger::replica_logger::no_op_logger()` call sites in the teacher.
pub fn no_op_logger() -> EngineLogger {
    EngineLogger::no_op()
}
