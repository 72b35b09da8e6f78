mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod ui;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use crate::ui::{UiEvent, UiManager};
use clap::Parser;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Time left to the UI task to flush the last log lines before exiting.
const UI_FLUSH_DELAY: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        tokio::time::sleep(UI_FLUSH_DELAY).await;
        eprintln!("\n❌ Error: {e}");
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    let (ui_manager, ui_sender, shutdown_sender) = UiManager::new();
    let ui_handle = tokio::spawn(ui_manager.run());

    logging::setup_logging(cli.verbose, cli.quiet, &cli.log_file, ui_sender.clone())?;
    install_panic_reporting()?;

    info!("MolDrug CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let outcome = dispatch(cli, ui_sender).await;
    match &outcome {
        Ok(()) => {
            info!("Command completed successfully.");
            println!("✅ Done.");
        }
        Err(e) => error!("Command failed: {e}"),
    }

    if shutdown_sender.send(true).is_err() {
        warn!("UI manager may have already exited before shutdown signal.");
    }
    ui_handle
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("UI manager task failed: {e}")))?;

    outcome
}

/// Routes panics through `tracing`, so they reach the log file and the UI.
fn install_panic_reporting() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |info| {
        error!("{}", panic_hook.panic_report(info));
    }));
    Ok(())
}

async fn dispatch(cli: Cli, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    match cli.command {
        Commands::Run(args) => {
            info!(config = %args.config.display(), "Dispatching to 'run' command.");
            commands::run::run(args, cli.jobs, ui_sender).await
        }
        Commands::Export(args) => {
            info!(checkpoint = %args.checkpoint.display(), "Dispatching to 'export' command.");
            commands::export::run(args).await
        }
        Commands::Desirability(args) => {
            info!(config = %args.config.display(), "Dispatching to 'desirability' command.");
            commands::desirability::run(args).await
        }
    }
}
