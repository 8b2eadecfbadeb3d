//! Logging system for the Ember engine
//!
//! This module provides a flexible logging system with:
//! - Customizable logger via Logger trait
//! - Severity levels (Trace, Debug, Info, Warn, Error)
//! - Colored console output by default
//! - An explicit, cloneable `LogSink` handed to every component
//! - File and line information for detailed ERROR logs
//!
//! There is no process-wide logger. The application creates a `LogSink`
//! and threads it through the constructors of the objects it builds.

use colored::*;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use chrono::{DateTime, Local};

use crate::error::Error;

/// Logger trait for custom logging implementations
///
/// Implement this trait to create custom loggers (file logging, network logging, etc.)
///
/// # Example
///
/// ```no_run
/// use ember_engine::ember::log::{Logger, LogEntry, LogSink};
///
/// struct FileLogger {
///     file: std::fs::File,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Write to file...
///     }
/// }
///
/// let file = std::fs::File::create("ember.log").unwrap();
/// let sink = LogSink::new(FileLogger { file });
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    ///
    /// # Arguments
    ///
    /// * `entry` - The log entry to process
    fn log(&self, entry: &LogEntry);
}

/// Log entry containing all information about a log message
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level (Trace, Debug, Info, Warn, Error)
    pub severity: LogSeverity,

    /// Timestamp when the log was created
    pub timestamp: SystemTime,

    /// Source component (e.g., "ember::RenderTarget", "ember::vulkan::Swapchain")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for detailed ERROR logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed ERROR logs)
    pub line: Option<u32>,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    /// Very verbose per-frame information
    Trace,

    /// Development/debugging information
    Debug,

    /// Important informational messages
    Info,

    /// Warning messages (potential issues)
    Warn,

    /// Error messages (critical issues with file:line details)
    Error,
}

/// Default logger implementation using colored console output
///
/// Colors:
/// - Trace: bright black
/// - Debug: cyan
/// - Info: green
/// - Warn: yellow
/// - Error: red + bold
///
/// Format:
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Error: `[timestamp] [ERROR] [source] message (file:line)`
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        };

        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp,
                severity_str,
                source,
                entry.message,
                file,
                line
            );
        } else {
            println!(
                "[{}] [{}] [{}] {}",
                timestamp,
                severity_str,
                source,
                entry.message
            );
        }
    }
}

// ===== LOG SINK =====

/// Explicit logging capability passed to engine components
///
/// Cheap to clone (shares the underlying logger). Entries below
/// `min_severity` are dropped before formatting.
#[derive(Clone)]
pub struct LogSink {
    logger: Arc<dyn Logger>,
    min_severity: LogSeverity,
}

impl LogSink {
    /// Create a sink forwarding to `logger`, accepting every severity
    pub fn new<L: Logger + 'static>(logger: L) -> Self {
        Self::from_arc(Arc::new(logger))
    }

    /// Create a sink around an already shared logger
    pub fn from_arc(logger: Arc<dyn Logger>) -> Self {
        Self {
            logger,
            min_severity: LogSeverity::Trace,
        }
    }

    /// Return a copy of this sink that drops entries below `severity`
    pub fn with_min_severity(mut self, severity: LogSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    /// Lowest severity this sink forwards
    pub fn min_severity(&self) -> LogSeverity {
        self.min_severity
    }

    /// Whether an entry of `severity` would be forwarded
    #[inline]
    pub fn enabled(&self, severity: LogSeverity) -> bool {
        severity >= self.min_severity
    }

    /// Log a message without file:line information
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(&self, severity: LogSeverity, source: &str, message: String) {
        if !self.enabled(severity) {
            return;
        }
        self.logger.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        });
    }

    /// Log a message with file:line information (used by engine_error!)
    pub fn log_detailed(
        &self,
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        if !self.enabled(severity) {
            return;
        }
        self.logger.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }

    /// Log `error` at ERROR severity and hand it back for propagation
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use ember_engine::ember::{Error, Result, log::LogSink};
    /// # fn check(sink: &LogSink) -> Result<()> {
    /// return Err(sink.report("ember::Example", Error::WindowClosed));
    /// # }
    /// ```
    pub fn report(&self, source: &str, error: Error) -> Error {
        self.log(LogSeverity::Error, source, error.to_string());
        error
    }
}

impl Default for LogSink {
    /// Colored console output, INFO and above
    fn default() -> Self {
        Self::new(DefaultLogger).with_min_severity(LogSeverity::Info)
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("min_severity", &self.min_severity)
            .finish_non_exhaustive()
    }
}

// ===== LOGGING MACROS =====

/// Log a TRACE message (very verbose, per frame)
///
/// # Example
///
/// ```ignore
/// engine_trace!(self.log, "ember::RenderTarget", "Frame {} started", index);
/// ```
#[macro_export]
macro_rules! engine_trace {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let sink: &$crate::ember::log::LogSink = &$log;
        if sink.enabled($crate::ember::log::LogSeverity::Trace) {
            sink.log($crate::ember::log::LogSeverity::Trace, $source, format!($($arg)*));
        }
    }};
}

/// Log a DEBUG message (development information)
///
/// # Example
///
/// ```ignore
/// engine_debug!(self.log, "ember::FrameSync", "Created with {} slots", count);
/// ```
#[macro_export]
macro_rules! engine_debug {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let sink: &$crate::ember::log::LogSink = &$log;
        if sink.enabled($crate::ember::log::LogSeverity::Debug) {
            sink.log($crate::ember::log::LogSeverity::Debug, $source, format!($($arg)*));
        }
    }};
}

/// Log an INFO message (important events)
///
/// # Example
///
/// ```ignore
/// engine_info!(self.log, "ember::RenderTarget", "Resized to {}x{}", width, height);
/// ```
#[macro_export]
macro_rules! engine_info {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let sink: &$crate::ember::log::LogSink = &$log;
        if sink.enabled($crate::ember::log::LogSeverity::Info) {
            sink.log($crate::ember::log::LogSeverity::Info, $source, format!($($arg)*));
        }
    }};
}

/// Log a WARN message (potential issues)
///
/// # Example
///
/// ```ignore
/// engine_warn!(self.log, "ember::FrameLoop", "Skipping target {}", index);
/// ```
#[macro_export]
macro_rules! engine_warn {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let sink: &$crate::ember::log::LogSink = &$log;
        if sink.enabled($crate::ember::log::LogSeverity::Warn) {
            sink.log($crate::ember::log::LogSeverity::Warn, $source, format!($($arg)*));
        }
    }};
}

/// Log an ERROR message with file:line information
///
/// # Example
///
/// ```ignore
/// engine_error!(self.log, "ember::ImageBuffer", "Failed to create image: {}", error);
/// ```
#[macro_export]
macro_rules! engine_error {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let sink: &$crate::ember::log::LogSink = &$log;
        sink.log_detailed(
            $crate::ember::log::LogSeverity::Error,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        );
    }};
}

/// Log an ERROR message and evaluate to `Error::BackendError` with the same text
///
/// # Example
///
/// ```ignore
/// .map_err(|e| engine_err!(self.log, "ember::vulkan", "vkQueueSubmit failed: {:?}", e))?;
/// ```
#[macro_export]
macro_rules! engine_err {
    ($log:expr, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        let sink: &$crate::ember::log::LogSink = &$log;
        sink.log_detailed(
            $crate::ember::log::LogSeverity::Error,
            $source,
            message.clone(),
            file!(),
            line!()
        );
        $crate::ember::Error::BackendError(message)
    }};
}

/// Log an ERROR message and return `Err(Error::BackendError)` from the enclosing function
///
/// # Example
///
/// ```ignore
/// engine_bail!(self.log, "ember::vulkan", "Frame index {} out of range", index);
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($log:expr, $source:expr, $($arg:tt)*) => {
        return Err($crate::engine_err!($log, $source, $($arg)*))
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
