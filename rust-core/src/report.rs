//! User-facing error reporting
//!
//! The core never shows UI itself; failures go to an `ErrorReporter`
//! supplied by the host application.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        f.write_str(label)
    }
}

/// Sink for human-readable failure messages
pub trait ErrorReporter: Send + Sync {
    fn report(&self, title: &str, message: &str, severity: Severity);
}

/// Forwards reports to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, title: &str, message: &str, severity: Severity) {
        match severity {
            Severity::Info => log::info!("{}: {}", title, message),
            Severity::Warning => log::warn!("{}: {}", title, message),
            Severity::Critical => log::error!("{}: {}", title, message),
        }
    }
}
