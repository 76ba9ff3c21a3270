//! Shared configuration for the tickbridge command server.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then
//! configuration files, then `TICKBRIDGE_*` environment variables, then
//! command-line flags where a binary owns its argument vector. The embedded
//! plugin never parses the host application's arguments, so it loads through
//! [`Config::load_without_cli`], which only honours files and the environment.
//!
//! Two environment variables drive start-up inside the host:
//! `TICKBRIDGE_PORT` overrides the listening port and `TICKBRIDGE_AUTO_START`
//! starts the service as soon as the plugin loads.

mod defaults;
mod endpoint;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BIND_HOST, DEFAULT_INTERPRETER, DEFAULT_LOG_FILTER, DEFAULT_MAX_FRAME_BYTES,
    DEFAULT_PARTIAL_FRAME_TIMEOUT_MS, DEFAULT_PORT, DEFAULT_TICK_INTERVAL_MS, default_bind_host,
    default_interpreter, default_log_filter, default_log_filter_string, default_log_format,
};
pub use endpoint::{Endpoint, EndpointParseError};
pub use logging::{LogFormat, LogFormatParseError};

/// Program name presented to the loader when no argument vector is parsed.
const PROGRAM_NAME: &str = "tickbridge";

/// Resolved configuration for the command server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TICKBRIDGE")]
pub struct Config {
    /// Address the listener binds to.
    #[ortho_config(default = default_bind_host())]
    pub bind_host: String,
    /// Port the listener binds to; `0` selects an ephemeral port.
    #[ortho_config(default = DEFAULT_PORT)]
    pub port: u16,
    /// Start the service as soon as the plugin loads.
    #[ortho_config(default = false)]
    pub auto_start: bool,
    /// Delay between scheduler ticks, in milliseconds.
    #[ortho_config(default = DEFAULT_TICK_INTERVAL_MS)]
    pub tick_interval_ms: u64,
    /// Time a truncated frame may wait for the rest of its bytes, in milliseconds.
    #[ortho_config(default = DEFAULT_PARTIAL_FRAME_TIMEOUT_MS)]
    pub partial_frame_timeout_ms: u64,
    /// Largest request, in bytes, buffered before it is rejected.
    #[ortho_config(default = DEFAULT_MAX_FRAME_BYTES)]
    pub max_frame_bytes: usize,
    /// Interpreter command used by the stock process executor.
    #[ortho_config(default = default_interpreter())]
    pub interpreter: String,
    /// `tracing` filter expression.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for log records.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: DEFAULT_PORT,
            auto_start: false,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            partial_frame_timeout_ms: DEFAULT_PARTIAL_FRAME_TIMEOUT_MS,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            interpreter: default_interpreter(),
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from files and the environment only.
    ///
    /// The plugin runs inside a host process whose arguments belong to the
    /// host, so no command-line flags are considered.
    ///
    /// # Errors
    ///
    /// Returns the loader error when a file or environment value is invalid.
    pub fn load_without_cli() -> Result<Self, Arc<OrthoError>> {
        Self::load_from_iter([OsString::from(PROGRAM_NAME)])
    }

    /// Endpoint the listener binds to.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::tcp(self.bind_host.clone(), self.port)
    }

    /// Delay between scheduler ticks.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Time a truncated frame may wait for more bytes.
    #[must_use]
    pub const fn partial_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.partial_frame_timeout_ms)
    }

    /// Configured `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Configured log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_loopback() {
        let config = Config::default();
        assert_eq!(config.endpoint().to_string(), "tcp://127.0.0.1:6688");
    }

    #[test]
    fn durations_follow_millisecond_fields() {
        let config = Config {
            tick_interval_ms: 5,
            partial_frame_timeout_ms: 250,
            ..Config::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(5));
        assert_eq!(config.partial_frame_timeout(), Duration::from_millis(250));
    }
}
