//! Logging setup for the binary and for embedders that want molprint's events.
//!
//! Library code only emits `tracing` events; nothing is printed until a
//! subscriber is installed with [`init`].
//!
//! # Environment Variables
//!
//! - `MOLPRINT_LOG` - log filter (takes precedence over `RUST_LOG`)
//! - `MOLPRINT_LOG_LEVEL` - error, warn, info, debug or trace
//! - `MOLPRINT_LOG_FORMAT` - pretty, compact or json
//! - `RUST_LOG` - standard filter, used when `MOLPRINT_LOG` is unset

use std::fmt;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt as sfmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human-readable
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "unknown log format '{s}' (expected pretty, compact or json)"
            )),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pretty => "pretty",
            Self::Compact => "compact",
            Self::Json => "json",
        })
    }
}

/// Subscriber settings. Build with the `with_*` methods, then pass to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base level, used when no filter is set (default: WARN)
    pub level: Level,
    pub format: LogFormat,
    /// `EnvFilter` directives; override `level` when set
    pub filter: Option<String>,
    /// Print the event target (module path) on each line
    pub show_target: bool,
    /// Print the worker thread name on each line
    pub show_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::default(),
            filter: None,
            show_target: false,
            show_thread_names: false,
        }
    }
}

impl LogConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.show_target = enabled;
        self
    }

    #[must_use]
    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    /// Apply environment overrides.
    ///
    /// A filter or level already set by the caller wins over the environment;
    /// the format variable always applies.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if self.filter.is_none() {
            self.filter = std::env::var("MOLPRINT_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .ok();
        }

        if self.filter.is_none()
            && let Ok(level) = std::env::var("MOLPRINT_LOG_LEVEL")
        {
            self.level = parse_level(&level).unwrap_or(self.level);
        }

        if let Ok(format) = std::env::var("MOLPRINT_LOG_FORMAT")
            && let Ok(format) = format.parse()
        {
            self.format = format;
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str().to_lowercase());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("warning: invalid log filter '{filter}', using {}", self.level);
                fallback()
            }),
            None => fallback(),
        }
    }
}

/// Parse a level name, case-insensitively.
#[must_use]
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Returns `false` if a subscriber was already installed, in which case
/// nothing changes.
pub fn init(config: LogConfig) -> bool {
    let filter = config.build_filter();
    let registry = tracing_subscriber::registry().with(filter);

    let result = match config.format {
        LogFormat::Json => registry
            .with(
                sfmt::layer()
                    .json()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                sfmt::layer()
                    .compact()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                sfmt::layer()
                    .pretty()
                    .with_target(config.show_target)
                    .with_thread_names(config.show_thread_names)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_round_trip_through_display() {
        for f in [LogFormat::Pretty, LogFormat::Compact, LogFormat::Json] {
            assert_eq!(f.to_string().parse::<LogFormat>(), Ok(f));
        }
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn levels_parse_case_insensitively() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn second_init_is_a_no_op() {
        init(LogConfig::default());
        assert!(!init(LogConfig::default()));
    }
}
