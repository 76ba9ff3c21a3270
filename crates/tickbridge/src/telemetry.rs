//! Structured telemetry initialisation for the command server.
//!
//! The plugin shares a process with its host. When the host has already
//! installed a global subscriber, the plugin's events flow through it and the
//! plugin's own filter and format are ignored.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use tickbridge_config::{Config, LogFormat};

const TELEMETRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::telemetry");

static SUBSCRIBER_OWNER: OnceCell<SubscriberOwner> = OnceCell::new();

/// Who installed the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberOwner {
    /// Installed by this crate from its configuration.
    Plugin,
    /// Already present when the plugin first initialised telemetry.
    Host,
}

/// Handle returned when telemetry has been initialised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryHandle {
    owner: SubscriberOwner,
}

impl TelemetryHandle {
    /// Reports whether the plugin or its host owns the subscriber.
    #[must_use]
    pub const fn owner(&self) -> SubscriberOwner {
        self.owner
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Failed to parse the configured log filter expression.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Filter expression as configured.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Installs the global tracing subscriber on first use.
///
/// The filter is validated on every call, so a plugin reload with a bad
/// filter still fails bootstrap. Only the first call touches global state;
/// later calls report the owner recorded then.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] when the configured filter is invalid.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    let filter = parse_filter(config.log_filter())?;
    let owner = *SUBSCRIBER_OWNER.get_or_init(|| install(filter, config.log_format()));
    Ok(TelemetryHandle { owner })
}

fn parse_filter(expression: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(expression).map_err(|error| TelemetryError::Filter {
        filter: expression.to_owned(),
        message: error.to_string(),
    })
}

fn install(filter: EnvFilter, format: LogFormat) -> SubscriberOwner {
    match tracing::subscriber::set_global_default(build_subscriber(filter, format)) {
        Ok(()) => SubscriberOwner::Plugin,
        Err(_) => {
            tracing::debug!(
                target: TELEMETRY_TARGET,
                "host subscriber already installed; plugin log settings ignored"
            );
            SubscriberOwner::Host
        }
    }
}

fn build_subscriber(filter: EnvFilter, format: LogFormat) -> Box<dyn Subscriber + Send + Sync> {
    let colour = format.allows_colour() && io::stderr().is_terminal();
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(io::stderr)
        .with_ansi(colour)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    match format {
        LogFormat::Json => Box::new(builder.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(builder.compact().finish()),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn invalid_filters_are_rejected() {
        let error = parse_filter("tickbridge=verbose").expect_err("filter is invalid");
        let TelemetryError::Filter { filter, .. } = &error;
        assert_eq!(filter, "tickbridge=verbose");
        assert!(error.to_string().contains("invalid log filter"), "{error}");
    }

    #[test]
    fn initialise_validates_the_filter_on_every_call() {
        let config = Config {
            log_filter: "tickbridge=verbose".to_owned(),
            ..Config::default()
        };
        assert!(initialise(&config).is_err());
    }

    #[test]
    fn repeated_initialisation_reports_the_same_owner() {
        let config = Config::default();
        let first = initialise(&config).expect("first initialisation");
        let second = initialise(&config).expect("second initialisation");
        assert_eq!(first.owner(), second.owner());
    }

    #[rstest]
    #[case(LogFormat::Json)]
    #[case(LogFormat::Compact)]
    fn subscribers_accept_events_in_each_format(#[case] format: LogFormat) {
        let filter = parse_filter("tickbridge=debug").expect("filter parses");
        let subscriber = build_subscriber(filter, format);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: TELEMETRY_TARGET, %format, "telemetry smoke event");
        });
    }
}
