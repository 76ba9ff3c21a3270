use crate::logging::LogFormat;

/// Address the command listener binds to when none is configured.
pub const DEFAULT_BIND_HOST: &str = "127.0.0.1";

/// TCP port used by the command listener when none is configured.
pub const DEFAULT_PORT: u16 = 6688;

/// Delay between scheduler ticks, in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 20;

/// Time a truncated frame may wait for its remaining bytes, in milliseconds.
pub const DEFAULT_PARTIAL_FRAME_TIMEOUT_MS: u64 = 500;

/// Largest request accepted before the buffered bytes are rejected.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Interpreter command used by the stock process executor.
pub const DEFAULT_INTERPRETER: &str = "python3 -c";

/// Default log filter expression used by the plugin and the headless host.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Owned bind host used where allocation is required (e.g. serde).
#[must_use]
pub fn default_bind_host() -> String {
    DEFAULT_BIND_HOST.to_owned()
}

/// Owned interpreter command used where allocation is required.
#[must_use]
pub fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_owned()
}

/// Default log filter expression.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
