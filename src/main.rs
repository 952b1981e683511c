use std::process::ExitCode;

use clap::Parser;
use financeview::{
    config::{CliArgs, Config, LoggingConfig},
    graph::build_schema,
    server::{self, AppState},
    storage::open_store,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// A blocking Postgres client must not be dropped inside the async runtime,
// so the store outlives it.
fn main() -> ExitCode {
    let cli = CliArgs::parse();
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&config.logging);

    let addr = match config.listen_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Invalid server configuration");
            return ExitCode::FAILURE;
        }
    };

    let store = match open_store(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to set up storage");
            return ExitCode::FAILURE;
        }
    };

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    let state = AppState {
        schema: build_schema(store.clone()),
        store: store.clone(),
        metrics,
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(server::serve(addr, state));
    drop(runtime);
    drop(store);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
