//! Vexil Logging
//!
//! Structured logging for the Vexil feature flag engine, controlled by the
//! `VEXIL_DEBUG` and `VEXIL_LOG_*` environment variables.
//!
//! # Features
//!
//! - **Environment-controlled**: `VEXIL_DEBUG=1` enables debug logging
//! - **Cheap when disabled**: macros check an atomic level before formatting
//! - **Structured fields**: key-value pairs rendered into every format
//! - **Critical level**: reserved for operator-facing emergencies such as
//!   kill switch activation
//!
//! # Usage
//!
//! ```rust
//! use vexil_log::{critical, debug, info, warn};
//!
//! info!("Created feature flag: {}", "New UI");
//! debug!(target: "vexil::targeting", "bucket {} for {}", 42, "user-1");
//!
//! let key = "new_ui";
//! warn!(fields: { "flag" => key }, "Flag not found, returning false");
//! critical!(
//!     fields: { "flag" => key, "reason" => "latency spike" },
//!     "KILL SWITCH ACTIVATED"
//! );
//! ```
//!
//! # Environment Variables
//!
//! - `VEXIL_DEBUG=1` - Enable debug logging
//! - `VEXIL_LOG_LEVEL=trace|debug|info|warn|error|critical|off` - Set log level
//! - `VEXIL_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `VEXIL_LOG_TIMESTAMPS=1|0` - Include timestamps

use once_cell::sync::Lazy;
use std::env;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

// ============================================================================
// Log Levels
// ============================================================================

/// Log level for Vexil logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    /// Trace level (most verbose)
    Trace = 0,
    /// Debug level
    Debug = 1,
    /// Info level
    Info = 2,
    /// Warning level
    Warn = 3,
    /// Error level
    Error = 4,
    /// Critical level (emergencies that need an operator)
    Critical = 5,
    /// Off (no logging)
    Off = 6,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "critical" | "fatal" => Some(Level::Critical),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Get level name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Off => "OFF",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Level::Trace,
            1 => Level::Debug,
            2 => Level::Info,
            3 => Level::Warn,
            4 => Level::Error,
            5 => Level::Critical,
            _ => Level::Off,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human readable, one event per line with fields appended
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON lines for log shippers
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Global Configuration
// ============================================================================

static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

static LOG_LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether to include timestamps
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables and publish its level.
    pub fn from_env() -> Self {
        let config = Self::from_lookup(|name| env::var(name).ok());

        DEBUG_ENABLED.store(config.debug, Ordering::SeqCst);
        LOG_LEVEL.store(config.level as u8, Ordering::SeqCst);

        config
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Unknown or malformed values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |name: &str| {
            lookup(name).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        let debug = flag("VEXIL_DEBUG").unwrap_or(false);

        let level = lookup("VEXIL_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("VEXIL_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let timestamps = flag("VEXIL_LOG_TIMESTAMPS").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            timestamps,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Initialize the logging system.
///
/// Called lazily by the first emitted event; call it explicitly to read the
/// environment eagerly.
pub fn init() {
    Lazy::force(&CONFIG);
}

/// Check if debug logging is enabled.
#[inline]
pub fn is_debug_enabled() -> bool {
    init();
    DEBUG_ENABLED.load(Ordering::Relaxed)
}

/// Check if a log level is enabled.
///
/// The environment is read on first use, so `VEXIL_LOG_LEVEL=trace` takes
/// effect for the very first event.
#[inline]
pub fn is_level_enabled(level: Level) -> bool {
    init();
    level != Level::Off && level as u8 >= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Get current log level.
pub fn current_level() -> Level {
    init();
    Level::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level at runtime.
pub fn set_level(level: Level) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

/// Enable or disable debug mode at runtime.
pub fn set_debug(enabled: bool) {
    init();
    DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    if enabled && current_level() > Level::Debug {
        set_level(Level::Debug);
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Log Output
// ============================================================================

/// Log a message with no structured fields.
#[doc(hidden)]
pub fn log(level: Level, target: &str, message: &str) {
    log_fields(level, target, message, &[]);
}

/// Log a message with structured key-value fields.
#[doc(hidden)]
pub fn log_fields(level: Level, target: &str, message: &str, fields: &[(&str, String)]) {
    let config = config();

    if !is_level_enabled(level) {
        return;
    }

    let line = render(config, level, target, message, fields);
    let _ = writeln!(std::io::stderr().lock(), "{}", line);
}

/// Render one event in the configured format.
pub fn render(
    config: &LogConfig,
    level: Level,
    target: &str,
    message: &str,
    fields: &[(&str, String)],
) -> String {
    match config.format {
        Format::Pretty => render_pretty(config, level, target, message, fields),
        Format::Compact => render_compact(config, level, target, message, fields),
        Format::Json => render_json(level, target, message, fields),
    }
}

fn render_pretty(
    config: &LogConfig,
    level: Level,
    target: &str,
    message: &str,
    fields: &[(&str, String)],
) -> String {
    let mut out = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        out.push_str(&format!("{} ", now.format("%Y-%m-%d %H:%M:%S%.3f")));
    }

    out.push_str(&format!("{:8} ", level.as_str()));

    if !target.is_empty() {
        out.push_str(&format!("[{}] ", target));
    }

    out.push_str(message);

    for (key, value) in fields {
        out.push_str(&format!(" {}={}", key, value));
    }

    out
}

fn render_compact(
    config: &LogConfig,
    level: Level,
    target: &str,
    message: &str,
    fields: &[(&str, String)],
) -> String {
    let mut out = String::new();

    if config.timestamps {
        let now = chrono::Local::now();
        out.push_str(&format!("{} ", now.format("%H:%M:%S")));
    }

    out.push(level.as_str().chars().next().unwrap_or('?'));
    out.push(' ');

    if !target.is_empty() {
        out.push_str(&format!("{}: ", target));
    }

    out.push_str(message);

    if !fields.is_empty() {
        let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        out.push_str(&format!(" ({})", rendered.join(", ")));
    }

    out
}

#[cfg(feature = "json")]
fn render_json(level: Level, target: &str, message: &str, fields: &[(&str, String)]) -> String {
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    struct LogEntry<'a> {
        timestamp: String,
        level: &'a str,
        target: &'a str,
        message: &'a str,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<&'a str, &'a str>,
    }

    let entry = LogEntry {
        timestamp: chrono::Utc::now().to_rfc3339(),
        level: level.as_str(),
        target,
        message,
        fields: fields.iter().map(|(k, v)| (*k, v.as_str())).collect(),
    };

    serde_json::to_string(&entry).unwrap_or_else(|_| message.to_string())
}

#[cfg(not(feature = "json"))]
fn render_json(level: Level, target: &str, message: &str, fields: &[(&str, String)]) -> String {
    let mut out = format!(
        r#"{{"timestamp":"{}","level":"{}","target":"{}","message":"{}""#,
        chrono::Utc::now().to_rfc3339(),
        level.as_str(),
        escape_json(target),
        escape_json(message)
    );

    if !fields.is_empty() {
        let rendered: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!(r#""{}":"{}""#, escape_json(k), escape_json(v)))
            .collect();
        out.push_str(&format!(r#","fields":{{{}}}"#, rendered.join(",")));
    }

    out.push('}');
    out
}

#[cfg(not(feature = "json"))]
fn escape_json(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            c if c.is_control() => {
                result.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => result.push(c),
        }
    }
    result
}

// ============================================================================
// Macros
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __log {
    ($level:expr, target: $target:expr, fields: { $($key:literal => $value:expr),* $(,)? }, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::log_fields(
                $level,
                $target,
                &format!($($arg)+),
                &[$(($key, ($value).to_string())),*],
            );
        }
    };
    ($level:expr, target: $target:expr, $($arg:tt)+) => {
        if $crate::is_level_enabled($level) {
            $crate::log($level, $target, &format!($($arg)+));
        }
    };
    ($level:expr, fields: { $($key:literal => $value:expr),* $(,)? }, $($arg:tt)+) => {
        $crate::__log!($level, target: module_path!(), fields: { $($key => $value),* }, $($arg)+)
    };
    ($level:expr, $($arg:tt)+) => {
        $crate::__log!($level, target: module_path!(), $($arg)+)
    };
}

/// Log a trace message.
///
/// Per-evaluation decisions are logged here; enable with
/// `VEXIL_LOG_LEVEL=trace`.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Trace, $($arg)+)
    };
}

/// Log a debug message.
///
/// Enabled by `VEXIL_DEBUG=1` or `VEXIL_LOG_LEVEL=debug`.
///
/// # Example
///
/// ```rust
/// use vexil_log::debug;
///
/// let key = "checkout_v2";
/// debug!("Rolling out {}", key);
/// debug!(target: "vexil::registry", "flag {} updated", key);
/// ```
#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Debug, $($arg)+)
    };
}

/// Log an info message.
#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Info, $($arg)+)
    };
}

/// Log a warning message.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Warn, $($arg)+)
    };
}

/// Log an error message.
#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Error, $($arg)+)
    };
}

/// Log a critical message.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)+) => {
        $crate::__log!($crate::Level::Critical, $($arg)+)
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Critical);
        assert!(Level::Critical < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("critical"), Some(Level::Critical));
        assert_eq!(Level::parse("invalid"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("compact"), Some(Format::Compact));
        assert_eq!(Format::parse("JSON"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_config_from_lookup() {
        let config = LogConfig::from_lookup(lookup(&[
            ("VEXIL_LOG_LEVEL", "warn"),
            ("VEXIL_LOG_FORMAT", "compact"),
            ("VEXIL_LOG_TIMESTAMPS", "0"),
        ]));

        assert_eq!(config.level, Level::Warn);
        assert_eq!(config.format, Format::Compact);
        assert!(!config.timestamps);
        assert!(!config.debug);
    }

    #[test]
    fn test_debug_env_lowers_default_level() {
        let config = LogConfig::from_lookup(lookup(&[("VEXIL_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        let config = LogConfig::from_lookup(lookup(&[]));
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
    }

    #[test]
    fn test_render_pretty_includes_fields() {
        let config = LogConfig {
            format: Format::Pretty,
            timestamps: false,
            ..LogConfig::default()
        };

        let line = render(
            &config,
            Level::Critical,
            "vexil::kill_switch",
            "KILL SWITCH ACTIVATED",
            &[("flag", "new_ui".to_string())],
        );

        assert!(line.starts_with("CRITICAL"));
        assert!(line.contains("[vexil::kill_switch]"));
        assert!(line.ends_with("KILL SWITCH ACTIVATED flag=new_ui"));
    }

    #[test]
    fn test_render_compact() {
        let config = LogConfig {
            format: Format::Compact,
            timestamps: false,
            ..LogConfig::default()
        };

        let line = render(&config, Level::Warn, "t", "missing", &[("flag", "x".into())]);
        assert_eq!(line, "W t: missing (flag=x)");
    }

    #[cfg(feature = "json")]
    #[test]
    fn test_render_json_fields() {
        let config = LogConfig::default();
        let line = render(
            &config,
            Level::Info,
            "vexil",
            "Created feature flag",
            &[("flag", "new_ui".to_string())],
        );

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["level"], "INFO");
        assert_eq!(value["message"], "Created feature flag");
        assert_eq!(value["fields"]["flag"], "new_ui");
    }

    #[test]
    fn test_set_level() {
        init();
        let original = current_level();

        set_level(Level::Error);
        assert_eq!(current_level(), Level::Error);
        assert!(!is_level_enabled(Level::Warn));
        assert!(is_level_enabled(Level::Critical));

        set_level(original);
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!is_level_enabled(Level::Off));
    }

    #[test]
    fn test_macros_compile() {
        trace!("trace message");
        debug!("debug message");
        info!("info message");
        warn!("warn message");
        error!("error message");
        critical!("critical message");

        info!(target: "test", "with target");
        let key = "flag";
        warn!(fields: { "flag" => key }, "with fields {}", 1);
        critical!(target: "test", fields: { "flag" => key, "n" => 3 }, "both");
    }
}
