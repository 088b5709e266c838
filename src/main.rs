//! CoCDB - read-only JSON API for game entity definitions

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use cocdb::{
    api::{Server, shutdown_signal},
    cli::{Cli, Command},
    config::Config,
    data, setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_tracing(&config.app.log_level, config.log_format()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Validate { directory }) => {
            run_validate(directory.unwrap_or_else(|| config.app.data_dir.clone()))
        }
        Some(Command::Serve) | None => match run_server(config).await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!("Server failed: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid command-line override")?;
    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    info!(
        port = config.server.port,
        environment = %config.app.environment,
        version = %config.app.version,
        "Starting CoCDB API server"
    );

    let server = Server::new(config).context("failed to initialise server")?;
    server
        .run(shutdown_signal())
        .await
        .context("server terminated abnormally")
}

/// Check every document under `directory`
fn run_validate(directory: PathBuf) -> ExitCode {
    let report = match data::validate_tree(&directory) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    for (path, reason) in &report.invalid {
        println!("❌ {}: {reason}", path.display());
    }

    if report.is_ok() {
        println!(
            "✅ {} documents valid in {}",
            report.checked,
            directory.display()
        );
        ExitCode::SUCCESS
    } else {
        println!(
            "\n{} of {} documents invalid",
            report.invalid.len(),
            report.checked
        );
        ExitCode::FAILURE
    }
}
