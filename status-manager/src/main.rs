mod config;
mod observability;

use clap::{Args, Parser};
use config::Config;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(about = "Serves app version status and per-customer feature flags")]
enum CliCommand {
    /// Run the status API
    Run(ConfigArgs),
    /// Load and validate a config file, then exit
    ValidateConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short = 'c')]
    config_file: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Run(args) => run(&args.config_file).await,
        CliCommand::ValidateConfig(args) => match Config::from_file(&args.config_file) {
            Ok(_) => {
                println!("{} is valid", args.config_file.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}: {e}", args.config_file.display());
                ExitCode::FAILURE
            }
        },
    }
}

async fn run(config_file: &std::path::Path) -> ExitCode {
    let config = match Config::from_file(config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _sentry_guard = observability::init_logging(&config.common.logging);

    if let Some(metrics_config) = &config.common.metrics
        && let Err(e) = observability::init_metrics(metrics_config)
    {
        tracing::error!(error = %e, "Failed to initialize metrics");
        return ExitCode::FAILURE;
    }

    tracing::info!("Starting app status service");
    match app_status::run(config.app_status).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "App status service stopped");
            ExitCode::FAILURE
        }
    }
}
