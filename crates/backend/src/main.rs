//! Admin entry point: inspect, issue and reset sequential id counters.

use std::process::ExitCode;

use backend::Backend;
use backend::cli::Cli;
use backend::config::Config;
use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Parse the command line; usage errors exit here
    let cli = Cli::parse();
    let command = cli.selected_command();

    // 2. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    backend::telemetry::init_tracing(&config).expect("failed to initialize tracing");

    // 3. Install Prometheus metrics recorder
    let metrics_handle =
        backend::telemetry::install_metrics().expect("failed to install Prometheus recorder");

    // 4. Connect the store and run the command
    let result = match Backend::connect(&config).await {
        Ok(backend) => backend.execute(command).await,
        Err(e) => Err(e),
    };

    let code = match result {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, ?command, "command failed");
            ExitCode::FAILURE
        }
    };

    if cli.metrics {
        println!("{}", metrics_handle.render());
    }
    code
}
