use crate::core::chem::ChemToolkit;
use crate::core::io::table;
use crate::core::models::individual::{Individual, sort_by_cost};
use crate::engine::config::LocalConfig;
use crate::engine::cost::CostFunction;
use crate::engine::error::EngineError;
use crate::engine::evaluation::Evaluator;
use crate::engine::progress::ProgressReporter;
use crate::engine::selection::pick_random;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct LocalResult {
    /// The seed and every grown candidate, sorted by cost.
    pub population: Vec<Individual>,
    pub table: PathBuf,
}

#[instrument(skip_all, name = "local_workflow")]
pub fn run(
    config: &LocalConfig,
    toolkit: &dyn ChemToolkit,
    cost: &dyn CostFunction,
    seed_smiles: &str,
    reporter: &ProgressReporter,
) -> Result<LocalResult, EngineError> {
    fs::create_dir_all(&config.outdir).map_err(|e| EngineError::io(&config.outdir, e))?;

    let population = reporter.phase("Growing", || {
        let mut grown = toolkit
            .grow(seed_smiles, &config.grow)?
            .into_iter()
            .filter(|s| s != seed_smiles)
            .unique()
            .collect_vec();
        if let Some(pick) = config.pick {
            let mut rng = match config.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let keep = pick_random(grown.len(), pick, &mut rng);
            grown = keep.into_iter().map(|i| grown[i].clone()).collect();
        }
        if grown.is_empty() {
            warn!(seed = %seed_smiles, "Growing yielded no candidates; only the seed is scored.");
        }
        info!(candidates = grown.len(), "Grew candidates from the seed molecule.");

        Ok::<_, EngineError>(
            std::iter::once(seed_smiles.to_string())
                .chain(grown)
                .enumerate()
                .map(|(idx, smiles)| Individual::new(smiles, idx))
                .collect_vec(),
        )
    })?;

    let mut population = reporter.phase("Evaluating", || {
        let evaluator = Evaluator::new(cost, config.njobs, &config.outdir)?;
        Ok::<_, EngineError>(evaluator.evaluate(population, reporter))
    })?;
    sort_by_cost(&mut population);

    let table = config.outdir.join(format!("{}_local.csv", config.deffnm));
    table::write_population_to_path(&population, &table)?;
    if let Some(best) = population.first() {
        info!(
            smiles = %best.smiles,
            cost = best.cost,
            table = %table.display(),
            "Local exploration finished."
        );
    }

    Ok(LocalResult { population, table })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::testing::MockToolkit;
    use crate::engine::config::LocalConfigBuilder;
    use crate::engine::evaluation::tests::LengthCost;
    use tempfile::TempDir;

    #[test]
    fn scores_seed_and_every_candidate() {
        let dir = TempDir::new().unwrap();
        let config = LocalConfigBuilder::new()
            .outdir(dir.path().to_path_buf())
            .build()
            .unwrap();
        let cost = LengthCost::default();

        let result = run(&config, &MockToolkit::default(), &cost, "CO", &ProgressReporter::new()).unwrap();

        assert_eq!(result.population.len(), 7);
        assert_eq!(result.population[0].smiles, "CO");
        assert_eq!(result.population[0].idx, 0);
        assert!(result.population.windows(2).all(|w| w[0].cost <= w[1].cost));
        assert_eq!(result.table, dir.path().join("local_local.csv"));
        assert!(result.table.exists());
    }

    #[test]
    fn pick_limits_the_candidates() {
        let dir = TempDir::new().unwrap();
        let config = LocalConfigBuilder::new()
            .pick(Some(2))
            .seed(Some(9))
            .deffnm("pick")
            .outdir(dir.path().to_path_buf())
            .build()
            .unwrap();
        let cost = LengthCost::default();

        let result = run(&config, &MockToolkit::default(), &cost, "CO", &ProgressReporter::new()).unwrap();

        assert_eq!(result.population.len(), 3);
        assert_eq!(cost.calls(), 3);
    }
}
