use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "MolDrug-rs contributors",
    version,
    about = "MolDrug CLI - Genetic-algorithm driven optimization of small molecules toward docking affinity and drug-likeness targets.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Override `njobs` of every stage: the number of molecules evaluated concurrently.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub jobs: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every stage of a YAML configuration file.
    Run(RunArgs),
    /// Export the population of a checkpoint to CSV.
    Export(ExportArgs),
    /// Evaluate the desirability of given property values under a stage's cost function.
    Desirability(DesirabilityArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the YAML configuration file.
    #[arg(required = true, value_name = "CONFIG")]
    pub config: PathBuf,

    /// Directory receiving checkpoints, tables and error reports.
    /// Defaults to the current directory.
    #[arg(short, long, value_name = "DIR")]
    pub outdir: Option<PathBuf>,

    /// Resume the first stage from a checkpoint (`*_pop.toml.zst`).
    #[arg(long = "continue", value_name = "CHECKPOINT")]
    pub resume: Option<PathBuf>,

    /// Set a stage value, overriding the config file.
    /// Can be used multiple times. Example: -S main.maxiter=10
    #[arg(short = 'S', long = "set", value_name = "STAGE.KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `export` subcommand.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// A checkpoint or result file (`*.toml.zst`).
    #[arg(required = true, value_name = "CHECKPOINT")]
    pub checkpoint: PathBuf,

    /// Output CSV path. Defaults to the checkpoint path with a `.csv` extension.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Arguments for the `desirability` subcommand.
#[derive(Args, Debug)]
pub struct DesirabilityArgs {
    /// Path to the YAML configuration file.
    #[arg(required = true, value_name = "CONFIG")]
    pub config: PathBuf,

    /// Stage whose cost function is used. Defaults to the first stage.
    #[arg(long, value_name = "NAME")]
    pub stage: Option<String>,

    /// A response value, e.g. `qed=0.6` or `vina_scores.min=-9.1`.
    /// Can be used multiple times.
    #[arg(long = "value", value_name = "NAME=NUMBER", required = true, num_args(1..))]
    pub values: Vec<String>,
}
