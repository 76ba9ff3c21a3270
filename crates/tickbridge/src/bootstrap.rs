//! Service bootstrap orchestration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use tickbridge_config::Config;

use crate::executor::Executor;
use crate::health::HealthReporter;
use crate::scheduler::TickDriver;
use crate::service::Service;
use crate::telemetry::{self, TelemetryError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader {
    /// Loads the service configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads defaults, configuration files and `TICKBRIDGE_*`
/// environment variables, ignoring the host's command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load_without_cli()
    }
}

/// Loader that returns a pre-built configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
}

/// Loads configuration, installs telemetry and builds the service.
///
/// When `auto_start` is set the service is started before returning. A start
/// failure does not fail the bootstrap: it is reported through `reporter` and
/// the service is returned stopped so the embedding can retry.
///
/// # Errors
///
/// Returns [`BootstrapError`] when configuration or telemetry cannot be set
/// up.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    driver: Box<dyn TickDriver>,
    executor: Box<dyn Executor>,
) -> Result<Service, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    if let Err(source) = telemetry::initialise(&config) {
        let error = BootstrapError::Telemetry { source };
        reporter.bootstrap_failed(&error);
        return Err(error);
    }

    reporter.bootstrap_succeeded(&config);
    let mut service = Service::new(&config, driver, executor, reporter);
    if config.auto_start
        && let Err(error) = service.start()
    {
        tracing::warn!(
            target: concat!(env!("CARGO_PKG_NAME"), "::service"),
            error = %error,
            "auto start failed; service left stopped"
        );
    }
    Ok(service)
}
