use crate::cli::RunArgs;
use crate::config::{ConfigFile, Stage, StageConfig};
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use moldrug::core::models::individual::Individual;
use moldrug::engine::progress::ProgressReporter;
use moldrug::engine::state::GaState;
use moldrug::workflows::{self, ga::GaOutputs, ga::GaStart};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(args: RunArgs, jobs: Option<usize>, ui_sender: mpsc::Sender<UiEvent>) -> Result<()> {
    let mut config_file = ConfigFile::from_file(&args.config)?;
    info!("Applying {} --set override(s)...", args.set_values.len());
    config_file.apply_set_values(&args.set_values)?;

    let outdir = args.outdir.clone().unwrap_or_else(|| PathBuf::from("."));
    let stages = config_file.resolve(jobs, &outdir)?;
    info!(stages = stages.len(), outdir = %outdir.display(), "Configuration resolved.");

    let mut resume = match &args.resume {
        Some(path) => {
            if matches!(stages.first().map(|s| &s.config), Some(StageConfig::Local(_))) {
                return Err(CliError::Argument(
                    "--continue needs a GA first stage; local exploration has no checkpoint".to_string(),
                ));
            }
            info!("Loading checkpoint from {:?}", path);
            Some(GaState::load(path)?)
        }
        None => None,
    };

    let progress_handler = CliProgressHandler::new(ui_sender);
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let mut previous: Option<Vec<Individual>> = None;
    for (i, stage) in stages.iter().enumerate() {
        println!(
            "Stage {}/{}: '{}' ({})",
            i + 1,
            stages.len(),
            stage.name,
            stage.cost.name()
        );
        let population = match &stage.config {
            StageConfig::Local(config) => {
                let result = tokio::task::block_in_place(|| {
                    workflows::local::run(
                        config,
                        stage.toolkit.as_ref(),
                        stage.cost.as_ref(),
                        &stage.seed_smiles,
                        &reporter,
                    )
                })
                .map_err(CliError::in_stage(&stage.name))?;
                println!(
                    "  {} molecule(s) scored, table written to: {}",
                    result.population.len(),
                    result.table.display()
                );
                result.population
            }
            StageConfig::Ga(config) => {
                let start = match (previous.take(), resume.take()) {
                    (Some(population), _) => GaStart::Population {
                        seed_smiles: stage.seed_smiles.clone(),
                        population,
                    },
                    (None, Some(state)) => {
                        if state.deffnm != config.deffnm {
                            warn!(
                                checkpoint = %state.deffnm,
                                stage = %config.deffnm,
                                "Checkpoint deffnm differs from the stage being resumed."
                            );
                        }
                        GaStart::Resume(state)
                    }
                    (None, None) => GaStart::Seed(stage.seed_smiles.clone()),
                };
                let result = tokio::task::block_in_place(|| {
                    workflows::ga::run(
                        config,
                        stage.toolkit.as_ref(),
                        stage.cost.as_ref(),
                        start,
                        &reporter,
                    )
                })
                .map_err(CliError::in_stage(&stage.name))?;
                print_ga_summary(stage, &result.population, &GaOutputs::new(config));
                result.population
            }
        };
        previous = Some(population);
    }

    Ok(())
}

fn print_ga_summary(stage: &Stage, population: &[Individual], outputs: &GaOutputs) {
    match population.first() {
        Some(best) if best.cost.is_finite() => println!(
            "  ✓ Best molecule of '{}' (cost {:.4}): {}",
            stage.name, best.cost, best.smiles
        ),
        _ => {
            warn!(stage = %stage.name, "No molecule of the final population has a finite cost.");
            println!("  Warning: no molecule of '{}' was scored successfully.", stage.name);
        }
    }
    println!("  Result written to: {}", outputs.result.display());
    println!("  Table written to: {}", outputs.table.display());
}
