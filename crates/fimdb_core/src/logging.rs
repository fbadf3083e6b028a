//! Bridge between the core's diagnostics and the host's log callback.
//!
//! Every message goes to `tracing`. When the host registered a
//! [`LogCallback`] at init, the message is also handed to it with the
//! matching [`LogLevel`].

use std::fmt;
use std::sync::Arc;

/// Severity passed to the host's log callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something unexpected that the core recovered from.
    Warning,
    /// An operation failed.
    Error,
    /// A failure the host is expected to treat as fatal.
    ErrorExit,
}

impl LogLevel {
    /// Lowercase name of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::ErrorExit => "error-exit",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-supplied sink for log messages.
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Forwards messages to `tracing` and, if present, the host callback.
#[derive(Clone, Default)]
pub struct Logger {
    callback: Option<LogCallback>,
}

impl Logger {
    /// Creates a logger around an optional host callback.
    #[must_use]
    pub fn new(callback: Option<LogCallback>) -> Self {
        Self { callback }
    }

    /// Whether a host callback is attached.
    #[must_use]
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Logs `message` at `level`.
    pub fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error | LogLevel::ErrorExit => tracing::error!(%level, "{message}"),
        }
        if let Some(callback) = &self.callback {
            callback(level, message);
        }
    }

    /// Logs at [`LogLevel::Warning`].
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Logs at [`LogLevel::Error`].
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}
