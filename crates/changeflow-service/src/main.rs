//! Changeflow service entry point.

use std::process::ExitCode;

use clap::Parser;

mod app;
mod config;
mod database;
mod logging;

/// ERP change-data-capture bridge.
///
/// Runs as a long-running service: polls the source database for row-level
/// changes per configured aggregate and publishes them to the event sink.
#[derive(Debug, Parser)]
#[command(name = "changeflow", version)]
struct Args {}

#[tokio::main]
async fn main() -> ExitCode {
    let _args = Args::parse();

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = logging::init(&config) {
        eprintln!("Error: {error}");
        return ExitCode::FAILURE;
    }

    if let Err(error) = app::run(config).await {
        tracing::error!(%error, "service terminated");
        eprintln!("Error: {error}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
