//! Tracing configuration.

use serde::{Deserialize, Serialize};

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Machine-readable JSON lines.
    Json,
    /// Multi-line human-readable output.
    Pretty,
    /// Single-line human-readable output.
    Compact,
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Env-filter directive string (e.g., "info,tplhost=debug").
    log_filter: String,
    /// Output format.
    log_format: LogFormat,
    /// Include file and line number in events.
    include_location: bool,
    /// Include the event target.
    include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            log_filter: "info".to_string(),
            log_format: LogFormat::Compact,
            include_location: false,
            include_target: true,
        }
    }
}

impl TracingConfig {
    /// Set the env-filter directive string.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Set the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Include file and line number in events.
    #[must_use]
    pub fn with_location(mut self, enabled: bool) -> Self {
        self.include_location = enabled;
        self
    }

    /// Include the event target.
    #[must_use]
    pub fn with_target(mut self, enabled: bool) -> Self {
        self.include_target = enabled;
        self
    }

    /// The env-filter directive string.
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// The output format.
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether events carry file and line number.
    pub fn include_location(&self) -> bool {
        self.include_location
    }

    /// Whether events carry the target.
    pub fn include_target(&self) -> bool {
        self.include_target
    }
}
