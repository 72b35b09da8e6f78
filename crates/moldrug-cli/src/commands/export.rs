use crate::cli::ExportArgs;
use crate::error::Result;
use moldrug::core::io::table;
use moldrug::engine::error::EngineError;
use moldrug::engine::state::GaState;
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn run(args: ExportArgs) -> Result<()> {
    info!("Loading checkpoint from {:?}", &args.checkpoint);
    let state = GaState::load(&args.checkpoint)?;

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.checkpoint));
    table::write_population_to_path(&state.population, &output).map_err(EngineError::from)?;

    println!(
        "Exported {} molecule(s) of '{}' (generation {}) to: {}",
        state.population.len(),
        state.deffnm,
        state.generation,
        output.display()
    );
    Ok(())
}

/// `run_pop.toml.zst` becomes `run_pop.csv`.
fn default_output_path(checkpoint: &Path) -> PathBuf {
    let name = checkpoint
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".toml.zst")
        .or_else(|| name.rsplit_once('.').map(|(stem, _)| stem))
        .unwrap_or(name.as_str());
    checkpoint.with_file_name(format!("{stem}.csv"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use moldrug::core::models::individual::Individual;
    use tempfile::tempdir;

    #[test]
    fn default_output_replaces_the_compound_extension() {
        assert_eq!(
            default_output_path(Path::new("out/01_grow_pop.toml.zst")),
            PathBuf::from("out/01_grow_pop.csv")
        );
        assert_eq!(
            default_output_path(Path::new("state.bin")),
            PathBuf::from("state.csv")
        );
        assert_eq!(default_output_path(Path::new("raw")), PathBuf::from("raw.csv"));
    }

    #[tokio::test]
    async fn exports_the_checkpointed_population() {
        let dir = tempdir().unwrap();
        let mut state = GaState::new("CCO", "export", 11);
        let mut best = Individual::new("CCN", 1);
        best.cost = 0.25;
        state.population = vec![best, Individual::new("CCC", 2)];
        let checkpoint = GaState::checkpoint_path(dir.path(), "export");
        state.save(&checkpoint).unwrap();

        run(ExportArgs {
            checkpoint: checkpoint.clone(),
            output: None,
        })
        .await
        .unwrap();

        let csv = std::fs::read_to_string(dir.path().join("export_pop.csv")).unwrap();
        assert!(csv.contains("CCN"));
        assert!(csv.contains("CCC"));
    }

    #[tokio::test]
    async fn missing_checkpoint_is_an_error() {
        let dir = tempdir().unwrap();
        let result = run(ExportArgs {
            checkpoint: dir.path().join("absent_pop.toml.zst"),
            output: None,
        })
        .await;
        assert!(result.is_err());
    }
}
