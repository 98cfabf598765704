//! zonemove - move an Azure VM and its managed disks into an availability zone

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use zonemove::{logging, Args, MigrationReport, ZoneMigrator, ZonemoveConfig};
use zonemove_arm::{ArmClient, Credential};

/// Exit code for failures before the migration starts.
const EXIT_STARTUP_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let rotated = match logging::init(&args.log_path, args.log_rollover, &args.log_level) {
        Ok(rotated) => rotated,
        Err(e) => {
            eprintln!("zonemove: {:#}", e);
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    info!("--- Starting zonemove ---");
    if let Some(previous) = rotated {
        info!(rotated_to = %previous.display(), "Rolled over previous log file");
    }

    match run(&args).await {
        Ok(report) => ExitCode::from(report.status.exit_code()),
        Err(e) => {
            error!("zonemove failed to start: {:#}", e);
            ExitCode::from(EXIT_STARTUP_FAILURE)
        }
    }
}

async fn run(args: &Args) -> Result<MigrationReport> {
    let config = ZonemoveConfig::load_or_default(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    config.validate().context("validating settings")?;

    let request = args.to_request().context("validating arguments")?;
    let credential = Credential::from_env().context("resolving Azure credentials")?;
    let client = ArmClient::new(config.arm, credential).context("creating Resource Manager client")?;

    let migrator = ZoneMigrator::new(Arc::new(client));
    let report = migrator.run(&request).await;

    if let Some(path) = &args.report_path {
        match report.write_json(path) {
            Ok(()) => info!(path = %path.display(), "Run report written"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write run report"),
        }
    }

    Ok(report)
}
