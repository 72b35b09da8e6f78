use crate::core::chem::ChemToolkit;
use crate::core::io::table;
use crate::core::models::individual::{Individual, sort_by_cost};
use crate::engine::config::GaConfig;
use crate::engine::cost::CostFunction;
use crate::engine::error::EngineError;
use crate::engine::evaluation::Evaluator;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::selection::{select_parent, selection_probabilities};
use crate::engine::state::GaState;
use crate::engine::variation::Variation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng, thread_rng};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, instrument, warn};

/// How a genetic-algorithm run obtains its first population.
#[derive(Debug, Clone)]
pub enum GaStart {
    /// Grow the initial population from a single molecule.
    Seed(String),
    /// Continue from the population of a previous stage. It is re-scored with
    /// the cost function of the new run.
    Population {
        seed_smiles: String,
        population: Vec<Individual>,
    },
    /// Continue a checkpointed run for its remaining generations.
    Resume(GaState),
}

#[derive(Debug, Clone)]
pub struct GaResult {
    /// Final population sorted by cost.
    pub population: Vec<Individual>,
    pub best_cost: Vec<f64>,
    pub avg_cost: Vec<f64>,
    pub seen: BTreeSet<String>,
    pub state: GaState,
}

/// Paths written by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct GaOutputs {
    pub checkpoint: PathBuf,
    pub result: PathBuf,
    pub table: PathBuf,
}

impl GaOutputs {
    pub fn new(config: &GaConfig) -> Self {
        Self {
            checkpoint: GaState::checkpoint_path(&config.outdir, &config.deffnm),
            result: GaState::result_path(&config.outdir, &config.deffnm),
            table: config.outdir.join(format!("{}_pop.csv", config.deffnm)),
        }
    }
}

#[instrument(skip_all, name = "ga_workflow")]
pub fn run(
    config: &GaConfig,
    toolkit: &dyn ChemToolkit,
    cost: &dyn CostFunction,
    start: GaStart,
    reporter: &ProgressReporter,
) -> Result<GaResult, EngineError> {
    fs::create_dir_all(&config.outdir).map_err(|e| EngineError::io(&config.outdir, e))?;
    let outputs = GaOutputs::new(config);
    let variation = Variation::new(toolkit, config.get_similar);

    info!(
        popsize = config.popsize,
        maxiter = config.maxiter,
        offspring = config.offspring_per_generation(),
        cost_function = cost.name(),
        "Starting genetic algorithm."
    );

    // === Phase 1: Initial population ===
    let (mut state, evaluator) = reporter.phase("Initial Population", || {
        initialize(config, &variation, cost, start, reporter)
    })?;

    // === Phase 2: Generations ===
    if state.generation < config.maxiter {
        reporter.phase("Evolution", || {
            evolve(config, &variation, &evaluator, &mut state, &outputs, reporter)
        })?;
    } else {
        info!(
            generation = state.generation,
            "The population already went through every generation."
        );
    }

    // === Phase 3: Results ===
    reporter.phase("Saving Results", || {
        state.evaluated = evaluator.cached();
        state.save(&outputs.result)?;
        table::write_population_to_path(&state.population, &outputs.table)?;
        Ok::<(), EngineError>(())
    })?;
    info!(
        result = %outputs.result.display(),
        table = %outputs.table.display(),
        evaluated = evaluator.cached_len(),
        "Genetic algorithm finished."
    );

    Ok(GaResult {
        population: state.population.clone(),
        best_cost: state.best_cost.clone(),
        avg_cost: state.avg_cost.clone(),
        seen: state.seen.clone(),
        state,
    })
}

fn initialize<'c>(
    config: &GaConfig,
    variation: &Variation,
    cost: &'c dyn CostFunction,
    start: GaStart,
    reporter: &ProgressReporter,
) -> Result<(GaState, Evaluator<'c>), EngineError> {
    let rng_seed = config.seed.unwrap_or_else(|| thread_rng().r#gen());

    match start {
        GaStart::Seed(seed_smiles) => {
            let mut state = GaState::new(&seed_smiles, &config.deffnm, rng_seed);
            let mut rng = StdRng::seed_from_u64(state.rng_seed);
            let candidates = variation.initial_candidates(
                &seed_smiles,
                config.popsize - 1,
                &config.grow,
                &config.mutation,
                &mut rng,
            )?;

            let mut population = vec![Individual::new(&seed_smiles, 0)];
            for smiles in candidates {
                let idx = state.allocate_idx();
                population.push(Individual::new(smiles, idx));
            }
            state
                .seen
                .extend(population.iter().map(|i| i.smiles.clone()));

            let evaluator = Evaluator::new(cost, config.njobs, &config.outdir)?;
            state.population = evaluator.evaluate(population, reporter);
            finish_initial(config, &mut state);
            Ok((state, evaluator))
        }
        GaStart::Population {
            seed_smiles,
            population,
        } => {
            if population.is_empty() {
                return Err(EngineError::Initialization(
                    "The supplied population is empty".to_string(),
                ));
            }
            let mut state = GaState::new(seed_smiles, &config.deffnm, rng_seed);
            state.next_idx = population.iter().map(|i| i.idx).max().unwrap_or(0) + 1;
            state
                .seen
                .extend(population.iter().map(|i| i.smiles.clone()));

            let evaluator = Evaluator::new(cost, config.njobs, &config.outdir)?;
            let population = population
                .into_iter()
                .map(|i| Individual::new(i.smiles, i.idx))
                .collect();
            state.population = evaluator.evaluate(population, reporter);
            finish_initial(config, &mut state);
            Ok((state, evaluator))
        }
        GaStart::Resume(mut state) => {
            if state.population.is_empty() {
                return Err(EngineError::Initialization(
                    "The checkpoint holds no population".to_string(),
                ));
            }
            state.deffnm = config.deffnm.clone();
            info!(
                generation = state.generation,
                population = state.population.len(),
                "Resuming from checkpoint."
            );
            let evaluator = Evaluator::new(cost, config.njobs, &config.outdir)?
                .with_cached(state.evaluated.iter().chain(&state.population).cloned());
            Ok((state, evaluator))
        }
    }
}

fn finish_initial(config: &GaConfig, state: &mut GaState) {
    replace_population(&mut state.population, Vec::new(), config.popsize);
    let (best, avg) = state.record_statistics();
    info!("Initial population: best cost {best:.4}, average cost {avg:.4}");
}

fn evolve(
    config: &GaConfig,
    variation: &Variation,
    evaluator: &Evaluator,
    state: &mut GaState,
    outputs: &GaOutputs,
    reporter: &ProgressReporter,
) -> Result<(), EngineError> {
    let offspring = config.offspring_per_generation();

    for generation in (state.generation + 1)..=config.maxiter {
        reporter.report(Progress::StatusUpdate {
            text: format!("Generation {generation}/{}", config.maxiter),
        });
        let mut rng = StdRng::seed_from_u64(state.rng_seed.wrapping_add(generation as u64));

        let costs: Vec<f64> = state.population.iter().map(|i| i.cost).collect();
        let probabilities = selection_probabilities(&costs, config.beta);

        let mut children = Vec::with_capacity(offspring);
        for _ in 0..offspring {
            let parent = select_parent(&state.population, &probabilities, &mut rng);
            let smiles = match variation.mutate(parent, &config.mutation, &state.seen, &mut rng) {
                Ok(smiles) => smiles,
                Err(e) => {
                    warn!(idx = parent.idx, smiles = %parent.smiles, "Mutation failed: {e}. Reusing the parent.");
                    parent.smiles.clone()
                }
            };
            state.seen.insert(smiles.clone());
            let idx = state.allocate_idx();
            children.push(Individual::new(smiles, idx));
        }
        debug!(generation, children = children.len(), "Offspring generated.");

        let evaluated = evaluator.evaluate(children, reporter);
        replace_population(&mut state.population, evaluated, config.popsize);
        state.generation = generation;

        let (best, avg) = state.record_statistics();
        info!("Generation {generation}: best cost {best:.4}, average cost {avg:.4}");
        reporter.report(Progress::Message(format!(
            "Generation {generation}: best cost {best:.4}"
        )));

        if config.save_pop_every_gen > 0 && generation % config.save_pop_every_gen == 0 {
            state.evaluated = evaluator.cached();
            state.save(&outputs.checkpoint)?;
            debug!(path = %outputs.checkpoint.display(), "Checkpoint written.");
        }
    }
    Ok(())
}

/// Elitist replacement: merge, keep the best copy of every SMILES and the
/// `popsize` lowest costs.
fn replace_population(population: &mut Vec<Individual>, offspring: Vec<Individual>, popsize: usize) {
    population.extend(offspring);
    sort_by_cost(population);
    let mut kept = HashSet::new();
    population.retain(|i| kept.insert(i.smiles.clone()));
    population.truncate(popsize);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::testing::MockToolkit;
    use crate::engine::config::GaConfigBuilder;
    use crate::engine::cost::EvalContext;
    use crate::engine::evaluation::tests::LengthCost;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Cost falls with molecule length, so the GA should keep growing molecules.
    #[derive(Default)]
    struct InverseLengthCost {
        scored: Mutex<Vec<String>>,
    }

    impl CostFunction for InverseLengthCost {
        fn name(&self) -> &'static str {
            "InverseLengthCost"
        }

        fn evaluate(
            &self,
            mut individual: Individual,
            _ctx: &EvalContext,
        ) -> Result<Individual, EngineError> {
            self.scored.lock().unwrap().push(individual.smiles.clone());
            individual.cost = 1.0 / individual.smiles.len() as f64;
            Ok(individual)
        }
    }

    fn config(dir: &TempDir, maxiter: usize) -> GaConfig {
        GaConfigBuilder::new()
            .popsize(6)
            .maxiter(maxiter)
            .beta(1.0)
            .njobs(2)
            .seed(Some(42))
            .save_pop_every_gen(1)
            .deffnm("test")
            .outdir(dir.path().to_path_buf())
            .build()
            .unwrap()
    }

    #[test]
    fn run_keeps_population_size_and_never_worsens() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit::default();
        let cost = InverseLengthCost::default();

        let result = run(
            &config(&dir, 4),
            &toolkit,
            &cost,
            GaStart::Seed("CCO".into()),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert_eq!(result.population.len(), 6);
        assert_eq!(result.best_cost.len(), 5);
        assert!(result.best_cost.windows(2).all(|w| w[1] <= w[0]));
        assert!(result.population.windows(2).all(|w| w[0].cost <= w[1].cost));

        let smiles: HashSet<_> = result.population.iter().map(|i| &i.smiles).collect();
        assert_eq!(smiles.len(), 6);
        for i in &result.population {
            assert!(result.seen.contains(&i.smiles));
        }
    }

    #[test]
    fn seen_molecules_are_scored_once() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit::default();
        let cost = InverseLengthCost::default();

        run(
            &config(&dir, 5),
            &toolkit,
            &cost,
            GaStart::Seed("CC".into()),
            &ProgressReporter::new(),
        )
        .unwrap();

        let scored = cost.scored.lock().unwrap();
        let distinct: HashSet<_> = scored.iter().collect();
        assert_eq!(distinct.len(), scored.len());
    }

    #[test]
    fn outputs_are_written() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit::default();
        let cost = LengthCost::default();
        let config = config(&dir, 2);

        let result = run(
            &config,
            &toolkit,
            &cost,
            GaStart::Seed("CCO".into()),
            &ProgressReporter::new(),
        )
        .unwrap();

        let outputs = GaOutputs::new(&config);
        assert!(outputs.checkpoint.exists());
        assert!(outputs.table.exists());
        let saved = GaState::load(&outputs.result).unwrap();
        assert_eq!(saved.generation, 2);
        assert_eq!(saved.population, result.population);
        assert_eq!(cost.calls(), result.seen.len());
    }

    #[test]
    fn resume_continues_for_the_remaining_generations() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit::default();
        let cost = InverseLengthCost::default();
        let first = run(
            &config(&dir, 2),
            &toolkit,
            &cost,
            GaStart::Seed("CCO".into()),
            &ProgressReporter::new(),
        )
        .unwrap();

        let resumed_cost = InverseLengthCost::default();
        let resumed = run(
            &config(&dir, 4),
            &toolkit,
            &resumed_cost,
            GaStart::Resume(first.state.clone()),
            &ProgressReporter::new(),
        )
        .unwrap();

        assert_eq!(resumed.state.generation, 4);
        assert_eq!(resumed.best_cost.len(), 5);
        assert_eq!(&resumed.best_cost[..3], &first.best_cost[..]);
        let rescored = resumed_cost.scored.lock().unwrap();
        assert!(first.population.iter().all(|i| !rescored.contains(&i.smiles)));
    }

    #[test]
    fn resume_reuses_every_molecule_scored_before_the_checkpoint() {
        let pool: Vec<String> = ["C", "CC", "CCC", "CCCC", "CN", "CO", "CCN", "CCO", "CF", "CCl"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let toolkit = MockToolkit {
            mutation_pool: Some(pool),
            ..MockToolkit::default()
        };

        let straight_dir = TempDir::new().unwrap();
        let straight_cost = InverseLengthCost::default();
        let straight = run(
            &config(&straight_dir, 6),
            &toolkit,
            &straight_cost,
            GaStart::Seed("C".into()),
            &ProgressReporter::new(),
        )
        .unwrap();

        let dir = TempDir::new().unwrap();
        let first_cost = InverseLengthCost::default();
        run(
            &config(&dir, 3),
            &toolkit,
            &first_cost,
            GaStart::Seed("C".into()),
            &ProgressReporter::new(),
        )
        .unwrap();
        let checkpoint = GaState::load(&GaOutputs::new(&config(&dir, 3)).checkpoint).unwrap();
        assert_eq!(checkpoint.evaluated.len(), first_cost.scored.lock().unwrap().len());

        let resumed_cost = InverseLengthCost::default();
        let resumed = run(
            &config(&dir, 6),
            &toolkit,
            &resumed_cost,
            GaStart::Resume(checkpoint),
            &ProgressReporter::new(),
        )
        .unwrap();

        let first_scored = first_cost.scored.lock().unwrap();
        let resumed_scored = resumed_cost.scored.lock().unwrap();
        let docked_twice: Vec<_> = resumed_scored
            .iter()
            .filter(|s| first_scored.contains(s))
            .collect();
        assert!(docked_twice.is_empty(), "scored again after resuming: {docked_twice:?}");
        assert_eq!(resumed.population, straight.population);
        assert_eq!(resumed.best_cost, straight.best_cost);
        assert_eq!(
            first_scored.len() + resumed_scored.len(),
            straight_cost.scored.lock().unwrap().len()
        );
    }

    #[test]
    fn stage_population_is_rescored() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit::default();
        let cost = InverseLengthCost::default();
        let mut previous = Individual::new("CCO", 0);
        previous.cost = -100.0;
        let start = GaStart::Population {
            seed_smiles: "CCO".into(),
            population: vec![previous, Individual::new("CCOC", 7)],
        };

        let result = run(&config(&dir, 1), &toolkit, &cost, start, &ProgressReporter::new()).unwrap();

        assert!(result.population.iter().all(|i| i.cost > 0.0));
        assert!(result.population.iter().all(|i| i.idx == 0 || i.idx >= 7));
    }

    #[test]
    fn barren_seed_fails_initialization() {
        let dir = TempDir::new().unwrap();
        let toolkit = MockToolkit {
            grow_count: 0,
            mutate_count: 0,
            ..MockToolkit::default()
        };
        let cost = LengthCost::default();
        let result = run(
            &config(&dir, 1),
            &toolkit,
            &cost,
            GaStart::Seed("C".into()),
            &ProgressReporter::new(),
        );
        assert!(matches!(result, Err(EngineError::Initialization(_))));
    }

    #[test]
    fn replacement_keeps_the_best_copy_of_each_molecule() {
        let mut population = vec![Individual { cost: 0.5, ..Individual::new("A", 0) }];
        let offspring = vec![
            Individual { cost: 0.1, ..Individual::new("A", 1) },
            Individual { cost: 0.3, ..Individual::new("B", 2) },
            Individual { cost: f64::INFINITY, ..Individual::new("C", 3) },
        ];
        replace_population(&mut population, offspring, 2);
        assert_eq!(population.iter().map(|i| i.idx).collect::<Vec<_>>(), vec![1, 2]);
    }
}
