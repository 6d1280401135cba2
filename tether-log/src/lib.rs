//! Tether Logging
//!
//! A small leveled logger: every line carries a level label (optionally
//! colorized), and may be preceded by a fixed prefix, the process id and a
//! microsecond timestamp.
//!
//! # Features
//!
//! - **Leveled**: `Debug < Info < Warn < Error < Fatal`, adjustable at runtime
//! - **Colorized labels**: `[DBG]`, `[INF]`, `[WRN]`, `[ERR]`, `[FTL]`
//! - **`log` facade**: install a `Logger` as the global `log` backend
//! - **`tracing` bridge**: forward `tracing` events into a `Logger` (feature `tracing`)
//!
//! # Usage
//!
//! ```rust
//! use tether_log::{info, debug, LogConfig, Level, Logger};
//!
//! let logger = Logger::new(LogConfig::default().with_level(Level::Debug));
//!
//! info!(logger, "server started on port {}", 8080);
//! debug!(logger, "matching route: {}", "/api/users");
//! ```
//!
//! # Environment Variables
//!
//! - `TETHER_LOG_LEVEL=debug|info|warn|error|fatal` - Set log level
//! - `TETHER_LOG_PREFIX=<text>` - Fixed line prefix
//! - `TETHER_LOG_COLOR=1|0` - Enable/disable colored labels
//! - `TETHER_LOG_TIMESTAMPS=1|0` - Enable/disable timestamps
//! - `TETHER_LOG_PID=1|0` - Enable/disable the `[pid] ` prefix

use std::env;
use std::fmt;
use std::io::{self, IsTerminal, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Timestamp layout, local time with microseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

// ============================================================================
// Log Levels
// ============================================================================

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    /// Debug level (most verbose)
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level
    Error = 4,
    /// Fatal level, runs the exit hook after logging
    Fatal = 5,
}

impl Level {
    /// All levels, most verbose first.
    pub const ALL: [Level; 5] = [
        Level::Debug,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
        }
    }

    /// Three letter label printed on each line.
    pub fn label(&self) -> &'static str {
        match self {
            Level::Debug => "DBG",
            Level::Info => "INF",
            Level::Warn => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FTL",
        }
    }

    /// Label color.
    #[cfg(feature = "color")]
    pub fn color(&self) -> colored::Color {
        use colored::Color;
        match self {
            Level::Debug => Color::Cyan,
            Level::Info => Color::Green,
            Level::Warn => Color::Yellow,
            Level::Error => Color::Red,
            Level::Fatal => Color::Magenta,
        }
    }

    /// Matching `log` crate filter. `Trace` records fold into `Debug`.
    pub fn to_filter(&self) -> log::LevelFilter {
        match self {
            Level::Debug => log::LevelFilter::Trace,
            Level::Info => log::LevelFilter::Info,
            Level::Warn => log::LevelFilter::Warn,
            Level::Error | Level::Fatal => log::LevelFilter::Error,
        }
    }

    /// Filter directive understood by `EnvFilter`.
    pub fn directive(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error | Level::Fatal => "error",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 | 1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            _ => Level::Fatal,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a level name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log-level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl From<log::Level> for Level {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace | log::Level::Debug => Level::Debug,
            log::Level::Info => Level::Info,
            log::Level::Warn => Level::Warn,
            log::Level::Error => Level::Error,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logger configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Text written at the start of every line
    pub prefix: String,
    /// Minimum level
    pub level: Level,
    /// Whether to include timestamps
    pub timestamps: bool,
    /// Whether labels are colorized
    pub colors: bool,
    /// Whether to add a `[pid] ` prefix
    pub pid: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            level: Level::Info,
            timestamps: true,
            colors: false,
            pid: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables.
    ///
    /// Colors default to on when stderr is a terminal, the pid prefix
    /// defaults to on when no prefix is configured.
    pub fn from_env() -> Result<Self, ParseLevelError> {
        let prefix = env::var("TETHER_LOG_PREFIX").unwrap_or_default();

        let level = match env::var("TETHER_LOG_LEVEL") {
            Ok(s) => s.parse()?,
            Err(_) => Level::Info,
        };

        let colors = env_flag("TETHER_LOG_COLOR").unwrap_or_else(stderr_supports_color);
        let timestamps = env_flag("TETHER_LOG_TIMESTAMPS").unwrap_or(true);
        let pid = env_flag("TETHER_LOG_PID").unwrap_or(prefix.is_empty());

        Ok(Self {
            prefix,
            level,
            timestamps,
            colors,
            pid,
        })
    }

    /// Set the line prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Enable or disable timestamps
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Enable or disable colored labels
    pub fn with_colors(mut self, enabled: bool) -> Self {
        self.colors = enabled;
        self
    }

    /// Enable or disable the pid prefix
    pub fn with_pid(mut self, enabled: bool) -> Self {
        self.pid = enabled;
        self
    }
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Whether stderr is a terminal and `NO_COLOR` is unset.
pub fn stderr_supports_color() -> bool {
    env::var_os("NO_COLOR").is_none() && io::stderr().is_terminal()
}

fn pid_prefix() -> String {
    format!("[{}] ", std::process::id())
}

// ============================================================================
// Labels
// ============================================================================

#[derive(Debug, Clone)]
struct Labels([String; 5]);

impl Labels {
    fn new(colors: bool) -> Self {
        Self(Level::ALL.map(|level| render_label(level, colors)))
    }

    fn get(&self, level: Level) -> &str {
        &self.0[level as usize - 1]
    }
}

fn render_label(level: Level, colors: bool) -> String {
    #[cfg(feature = "color")]
    if colors {
        return format!("[\x1b[{}m{}\x1b[0m] ", level.color().to_fg_str(), level.label());
    }

    #[cfg(not(feature = "color"))]
    let _ = colors;

    format!("[{}] ", level.label())
}

// ============================================================================
// Logger
// ============================================================================

/// Hook run after a fatal line is written.
pub type ExitHook = Box<dyn Fn() + Send + Sync>;

/// Leveled logger writing one line per message to a byte sink.
pub struct Logger {
    prefix: String,
    level: AtomicU8,
    /// Installed as the global `log` backend
    bridged: AtomicBool,
    timestamps: bool,
    labels: Labels,
    sink: Mutex<Box<dyn Write + Send>>,
    on_fatal: Option<ExitHook>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("prefix", &self.prefix)
            .field("level", &self.level())
            .field("timestamps", &self.timestamps)
            .finish_non_exhaustive()
    }
}

impl Logger {
    /// Create a logger writing to stderr.
    pub fn new(config: LogConfig) -> Self {
        Self::with_writer(config, io::stderr())
    }

    /// Create a logger writing to an arbitrary sink.
    pub fn with_writer<W: Write + Send + 'static>(config: LogConfig, writer: W) -> Self {
        let mut prefix = config.prefix;
        if config.pid {
            prefix.push_str(&pid_prefix());
        }

        Self {
            prefix,
            level: AtomicU8::new(config.level as u8),
            bridged: AtomicBool::new(false),
            timestamps: config.timestamps,
            labels: Labels::new(config.colors),
            sink: Mutex::new(Box::new(writer)),
            on_fatal: None,
        }
    }

    /// Create the common stderr logger from a level name.
    ///
    /// Timestamps are on, colors follow the terminal, and the pid is added
    /// when `prefix` is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tether_log::Logger;
    ///
    /// let logger = Logger::from_level_str("api: ", "warn").unwrap();
    /// assert!(Logger::from_level_str("", "loud").is_err());
    /// ```
    pub fn from_level_str(prefix: &str, level: &str) -> Result<Self, ParseLevelError> {
        let config = LogConfig {
            prefix: prefix.to_string(),
            level: level.parse()?,
            timestamps: true,
            colors: stderr_supports_color(),
            pid: prefix.is_empty(),
        };
        Ok(Self::new(config))
    }

    /// Create a stderr logger from `TETHER_LOG_*` variables.
    pub fn from_env() -> Result<Self, ParseLevelError> {
        LogConfig::from_env().map(Self::new)
    }

    /// Replace the fatal hook (the default exits the process with status 1).
    pub fn on_fatal(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_fatal = Some(Box::new(hook));
        self
    }

    /// Get current level.
    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Set level at runtime.
    ///
    /// Also moves `log`'s max level when this logger is the `log` backend.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::SeqCst);
        if self.bridged.load(Ordering::Acquire) {
            log::set_max_level(level.to_filter());
        }
    }

    /// Check if a level is enabled.
    #[inline]
    pub fn is_enabled(&self, level: Level) -> bool {
        level as u8 >= self.level.load(Ordering::Relaxed)
    }

    /// Log a message with the given level.
    pub fn logf(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.is_enabled(level) {
            return;
        }

        self.write_line(level, args);

        if level == Level::Fatal {
            match &self.on_fatal {
                Some(hook) => hook(),
                None => std::process::exit(1),
            }
        }
    }

    /// Log a debug message.
    pub fn debugf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Debug, args);
    }

    /// Log an info message.
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Info, args);
    }

    /// Log a warning message.
    pub fn warnf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Warn, args);
    }

    /// Log an error message.
    pub fn errorf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Error, args);
    }

    /// Log a fatal message, then run the exit hook.
    pub fn fatalf(&self, args: fmt::Arguments<'_>) {
        self.logf(Level::Fatal, args);
    }

    /// Flush the underlying sink.
    pub fn flush(&self) {
        let _ = self.lock_sink().flush();
    }

    /// Install this logger as the global `log` backend.
    ///
    /// `log` records at `Trace` are written as debug lines. Later
    /// [`set_level`](Self::set_level) calls keep `log`'s max level in step.
    pub fn install(logger: Arc<Logger>) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(LogBridge(logger.clone())))?;
        logger.bridged.store(true, Ordering::Release);
        log::set_max_level(logger.level().to_filter());
        Ok(())
    }

    fn write_line(&self, level: Level, args: fmt::Arguments<'_>) {
        use std::fmt::Write as _;

        let mut line = String::with_capacity(64);
        line.push_str(&self.prefix);

        if self.timestamps {
            let now = chrono::Local::now();
            let _ = write!(line, "{} ", now.format(TIMESTAMP_FORMAT));
        }

        line.push_str(self.labels.get(level));
        let _ = line.write_fmt(args);

        if !line.ends_with('\n') {
            line.push('\n');
        }

        let _ = self.lock_sink().write_all(line.as_bytes());
    }

    fn lock_sink(&self) -> std::sync::MutexGuard<'_, Box<dyn Write + Send>> {
        self.sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct LogBridge(Arc<Logger>);

impl log::Log for LogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.0.is_enabled(metadata.level().into())
    }

    fn log(&self, record: &log::Record<'_>) {
        let level = Level::from(record.level());
        if self.0.is_enabled(level) {
            self.0.write_line(level, *record.args());
        }
    }

    fn flush(&self) {
        self.0.flush();
    }
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {{
        let logger = &$logger;
        if logger.is_enabled($level) {
            logger.logf($level, ::std::format_args!($($arg)+));
        }
    }};
}

/// Log a debug message.
///
/// Arguments are not formatted when debug lines are disabled.
///
/// # Example
///
/// ```rust
/// use tether_log::{debug, LogConfig, Logger};
///
/// let logger = Logger::new(LogConfig::default());
/// let username = "alice";
/// debug!(logger, "user {} logged in", username);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::Level::Debug, $($arg)+)
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::Level::Info, $($arg)+)
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::Level::Warn, $($arg)+)
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::Level::Error, $($arg)+)
    };
}

/// Log a fatal message and run the logger's exit hook.
#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::__log!($logger, $crate::Level::Fatal, $($arg)+)
    };
}

// ============================================================================
// Tracing Integration
// ============================================================================

#[cfg(feature = "tracing")]
pub mod tracing_compat {
    //! Tracing compatibility layer.
    //!
    //! Forwards `tracing` events into a [`Logger`], so libraries that emit
    //! `tracing` events share the same output as code using the logger
    //! directly.

    use super::{Level, Logger};
    use std::fmt::{self, Write as _};
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer};
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    /// Layer writing every event through a [`Logger`].
    pub struct LoggerLayer {
        logger: Arc<Logger>,
    }

    impl LoggerLayer {
        /// Create a new layer
        pub fn new(logger: Arc<Logger>) -> Self {
            Self { logger }
        }
    }

    fn level_of(level: &tracing::Level) -> Level {
        if *level == tracing::Level::ERROR {
            Level::Error
        } else if *level == tracing::Level::WARN {
            Level::Warn
        } else if *level == tracing::Level::INFO {
            Level::Info
        } else {
            Level::Debug
        }
    }

    #[derive(Default)]
    struct MessageVisitor {
        message: String,
        fields: String,
    }

    impl Visit for MessageVisitor {
        fn record_str(&mut self, field: &Field, value: &str) {
            if field.name() == "message" {
                self.message.push_str(value);
            } else {
                let _ = write!(self.fields, " {}={}", field.name(), value);
            }
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                let _ = write!(self.message, "{:?}", value);
            } else {
                let _ = write!(self.fields, " {}={:?}", field.name(), value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for LoggerLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let level = level_of(event.metadata().level());
            if !self.logger.is_enabled(level) {
                return;
            }

            let mut visitor = MessageVisitor::default();
            event.record(&mut visitor);

            self.logger
                .write_line(level, format_args!("{}{}", visitor.message, visitor.fields));
        }
    }

    /// Create a tracing subscriber that writes through `logger`.
    ///
    /// `RUST_LOG` takes precedence over the logger's own level.
    pub fn subscriber(logger: Arc<Logger>) -> impl Subscriber + Send + Sync {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(logger.level().directive()));

        tracing_subscriber::registry()
            .with(filter)
            .with(LoggerLayer::new(logger))
    }

    /// Install [`subscriber`] as the global default.
    pub fn init(logger: Arc<Logger>) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
        tracing::subscriber::set_global_default(subscriber(logger))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn plain(level: Level) -> LogConfig {
        LogConfig::default().with_level(level).with_timestamps(false)
    }

    fn capture(config: LogConfig) -> (Logger, SharedBuf) {
        let buf = SharedBuf::default();
        (Logger::with_writer(config, buf.clone()), buf)
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Fatal);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!("debug".parse::<Level>(), Ok(Level::Debug));
        assert_eq!("INFO".parse::<Level>(), Ok(Level::Info));
        assert_eq!("Warn".parse::<Level>(), Ok(Level::Warn));
        assert_eq!("error".parse::<Level>(), Ok(Level::Error));
        assert_eq!("fatal".parse::<Level>(), Ok(Level::Fatal));

        let err = "verbose".parse::<Level>().unwrap_err();
        assert_eq!(err.to_string(), "invalid log-level 'verbose'");
    }

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, Level::Info);
        assert!(config.timestamps);
        assert!(!config.colors);
        assert!(!config.pid);
    }

    #[test]
    fn test_info_line() {
        let (logger, buf) = capture(plain(Level::Info));
        logger.logf(Level::Info, format_args!("foo"));
        assert_eq!(buf.contents(), "[INF] foo\n");
    }

    #[cfg(feature = "color")]
    #[test]
    fn test_info_line_with_color() {
        let (logger, buf) = capture(plain(Level::Info).with_colors(true));
        logger.logf(Level::Info, format_args!("foo"));
        assert_eq!(buf.contents(), "[\x1b[32mINF\x1b[0m] foo\n");
    }

    #[cfg(feature = "color")]
    #[test]
    fn test_colored_label_codes() {
        let labels = Labels::new(true);
        assert_eq!(labels.get(Level::Debug), "[\x1b[36mDBG\x1b[0m] ");
        assert_eq!(labels.get(Level::Warn), "[\x1b[33mWRN\x1b[0m] ");
        assert_eq!(labels.get(Level::Error), "[\x1b[31mERR\x1b[0m] ");
        assert_eq!(labels.get(Level::Fatal), "[\x1b[35mFTL\x1b[0m] ");
    }

    #[test]
    fn test_debug_line_with_args() {
        let (logger, buf) = capture(plain(Level::Debug));
        debug!(logger, "foo {}", "bar");
        assert_eq!(buf.contents(), "[DBG] foo bar\n");
    }

    #[test]
    fn test_debug_suppressed_at_info() {
        let (logger, buf) = capture(plain(Level::Info));
        logger.logf(Level::Debug, format_args!("foo"));
        assert_eq!(buf.contents(), "");
    }

    #[test]
    fn test_disabled_macro_skips_formatting() {
        struct Counted<'a>(&'a AtomicUsize);

        impl fmt::Display for Counted<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fetch_add(1, Ordering::SeqCst);
                f.write_str("counted")
            }
        }

        let calls = AtomicUsize::new(0);
        let (logger, buf) = capture(plain(Level::Warn));

        info!(logger, "{}", Counted(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        warn!(logger, "{}", Counted(&calls));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(buf.contents(), "[WRN] counted\n");
    }

    #[test]
    fn test_timestamp_layout() {
        let (logger, buf) = capture(LogConfig::default());
        info!(logger, "foo");

        let re = regex::Regex::new(
            r"^\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}\.\d{6} \[INF\] foo\n$",
        )
        .unwrap();
        assert!(re.is_match(&buf.contents()), "got {:?}", buf.contents());
    }

    #[test]
    fn test_prefix_and_pid() {
        let (logger, buf) = capture(plain(Level::Info).with_prefix("api: ").with_pid(true));
        warn!(logger, "careful");
        assert_eq!(
            buf.contents(),
            format!("api: [{}] [WRN] careful\n", std::process::id())
        );
    }

    #[test]
    fn test_trailing_newline_not_doubled() {
        let (logger, buf) = capture(plain(Level::Info));
        error!(logger, "boom\n");
        error!(logger, "");
        assert_eq!(buf.contents(), "[ERR] boom\n[ERR] \n");
    }

    #[test]
    fn test_fatal_runs_hook() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();

        let (logger, buf) = capture(plain(Level::Error));
        let logger = logger.on_fatal(move || flag.store(true, Ordering::SeqCst));

        fatal!(logger, "giving up: {}", 3);
        assert!(exited.load(Ordering::SeqCst));
        assert_eq!(buf.contents(), "[FTL] giving up: 3\n");
    }

    #[test]
    fn test_set_level() {
        let (logger, buf) = capture(plain(Level::Error));
        assert_eq!(logger.level(), Level::Error);

        info!(logger, "hidden");
        logger.set_level(Level::Debug);
        assert_eq!(logger.level(), Level::Debug);
        info!(logger, "shown");

        assert_eq!(buf.contents(), "[INF] shown\n");
    }

    #[test]
    fn test_log_facade_bridge() {
        let buf = SharedBuf::default();
        let logger = Arc::new(Logger::with_writer(plain(Level::Debug), buf.clone()));

        Logger::install(logger).unwrap();
        log::info!("bridged {}", 7);
        log::trace!("traced");

        assert_eq!(buf.contents(), "[INF] bridged 7\n[DBG] traced\n");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn test_tracing_layer() {
        use tracing_subscriber::prelude::*;

        let buf = SharedBuf::default();
        let logger = Arc::new(Logger::with_writer(plain(Level::Info), buf.clone()));
        let subscriber =
            tracing_subscriber::registry().with(tracing_compat::LoggerLayer::new(logger));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("hidden");
            tracing::info!(lease = 7, "hello {}", "world");
        });

        assert_eq!(buf.contents(), "[INF] hello world lease=7\n");
    }
}
