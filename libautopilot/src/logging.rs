//! Logging setup shared by the Autopilot binaries
//!
//! Structured logging via `tracing`, with text output for interactive use
//! and JSON for log collectors. Controlled by `AUTOPILOT_LOG_FORMAT` and
//! `AUTOPILOT_LOG_LEVEL`, or programmatically by the binaries' flags.

use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text to stderr
    Text,
    /// One JSON object per line, for collectors
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Initialize the subscriber. Call once, at binary startup.
pub fn init(format: LogFormat, level: &str, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .init();
        }
    }
}

/// Initialize from `AUTOPILOT_LOG_FORMAT` / `AUTOPILOT_LOG_LEVEL`,
/// defaulting to text at info level.
pub fn init_default() {
    let format = std::env::var("AUTOPILOT_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = std::env::var("AUTOPILOT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    init(format, &level, false);
}
