//! Headless host process: serves commands through an external interpreter
//! until interrupted.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use ortho_config::OrthoConfig;
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use tickbridge::{
    HeadlessDriver, ProcessExecutor, Service, StaticConfigLoader, StructuredHealthReporter,
    bootstrap_with,
};
use tickbridge_config::Config;

const PUMP_BUDGET: Duration = Duration::from_millis(250);

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("tickbridged: {error}");
            return ExitCode::FAILURE;
        }
    };
    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(target: "tickbridged", error = %message, "exiting");
            eprintln!("tickbridged: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: Config) -> Result<(), String> {
    let executor = ProcessExecutor::from_config(&config).map_err(|error| error.to_string())?;
    let driver = HeadlessDriver::new(config.tick_interval());
    let mut service = bootstrap_with(
        &StaticConfigLoader::new(config),
        Arc::new(StructuredHealthReporter::new()),
        Box::new(driver),
        Box::new(executor),
    )
    .map_err(|error| error.to_string())?;

    if !service.is_running() {
        service.start().map_err(|error| error.to_string())?;
    }

    let terminate = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&terminate))
            .map_err(|error| format!("failed to install signal handler: {error}"))?;
    }

    serve_until(&mut service, &terminate);
    service.stop();
    Ok(())
}

fn serve_until(service: &mut Service, terminate: &AtomicBool) {
    while !terminate.load(Ordering::Relaxed) {
        if service.pump(PUMP_BUDGET).service_stopped {
            break;
        }
    }
    tracing::info!(target: "tickbridged", "shutdown requested");
}
