use super::cost::{CostFunction, EvalContext};
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use crate::core::models::individual::Individual;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Runs a cost function over batches of individuals.
///
/// Results are cached by SMILES for the lifetime of the evaluator, so a
/// molecule is evaluated at most once per run; repeated molecules get a copy
/// of the cached result under their own `idx`.
pub struct Evaluator<'c> {
    cost: &'c dyn CostFunction,
    report_dir: PathBuf,
    cache: Mutex<HashMap<String, Individual>>,
    #[cfg(feature = "parallel")]
    pool: rayon::ThreadPool,
}

enum Slot {
    Ready(Individual),
    Pending(usize),
    Copy { pending: usize, idx: usize },
}

impl<'c> Evaluator<'c> {
    pub fn new(
        cost: &'c dyn CostFunction,
        njobs: usize,
        report_dir: impl Into<PathBuf>,
    ) -> Result<Self, EngineError> {
        #[cfg(feature = "parallel")]
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(njobs.max(1))
            .thread_name(|i| format!("moldrug-eval-{i}"))
            .build()
            .map_err(|e| {
                EngineError::Initialization(format!("Failed to build the evaluation thread pool: {e}"))
            })?;
        #[cfg(not(feature = "parallel"))]
        let _ = njobs;

        Ok(Self {
            cost,
            report_dir: report_dir.into(),
            cache: Mutex::new(HashMap::new()),
            #[cfg(feature = "parallel")]
            pool,
        })
    }

    /// Seeds the cache with individuals scored earlier in the run, failures
    /// included. The first record of a SMILES wins.
    pub fn with_cached(self, individuals: impl IntoIterator<Item = Individual>) -> Self {
        if let Ok(mut cache) = self.cache.lock() {
            for individual in individuals {
                cache.entry(individual.smiles.clone()).or_insert(individual);
            }
        }
        self
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Every cached result, ordered by SMILES.
    pub fn cached(&self) -> Vec<Individual> {
        let mut cached: Vec<Individual> = self
            .cache
            .lock()
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        cached.sort_by(|a, b| a.smiles.cmp(&b.smiles));
        cached
    }

    /// Evaluates `batch`, preserving its order. Failing individuals are logged
    /// and returned with an infinite cost.
    pub fn evaluate(&self, batch: Vec<Individual>, reporter: &ProgressReporter) -> Vec<Individual> {
        let (slots, pending) = self.plan(batch);

        debug!(
            batch = slots.len(),
            to_evaluate = pending.len(),
            cost_function = self.cost.name(),
            "Evaluating batch."
        );
        reporter.report(Progress::TaskStart {
            total: pending.len() as u64,
        });

        let evaluated = self.run(pending, reporter);

        reporter.report(Progress::TaskFinish);

        if let Ok(mut cache) = self.cache.lock() {
            for individual in &evaluated {
                cache.insert(individual.smiles.clone(), individual.clone());
            }
        }

        slots
            .into_iter()
            .map(|slot| match slot {
                Slot::Ready(individual) => individual,
                Slot::Pending(i) => evaluated[i].clone(),
                Slot::Copy { pending, idx } => Individual {
                    idx,
                    ..evaluated[pending].clone()
                },
            })
            .collect()
    }

    fn plan(&self, batch: Vec<Individual>) -> (Vec<Slot>, Vec<Individual>) {
        let cache = self.cache.lock().ok();
        let mut pending = Vec::new();
        let mut pending_by_smiles: HashMap<String, usize> = HashMap::new();
        let slots = batch
            .into_iter()
            .map(|individual| {
                if let Some(hit) = cache.as_ref().and_then(|c| c.get(&individual.smiles)) {
                    return Slot::Ready(Individual {
                        idx: individual.idx,
                        ..hit.clone()
                    });
                }
                if let Some(&i) = pending_by_smiles.get(&individual.smiles) {
                    return Slot::Copy {
                        pending: i,
                        idx: individual.idx,
                    };
                }
                pending_by_smiles.insert(individual.smiles.clone(), pending.len());
                pending.push(individual);
                Slot::Pending(pending.len() - 1)
            })
            .collect();
        (slots, pending)
    }

    #[cfg(feature = "parallel")]
    fn run(&self, pending: Vec<Individual>, reporter: &ProgressReporter) -> Vec<Individual> {
        self.pool.install(|| {
            pending
                .into_par_iter()
                .map(|individual| self.evaluate_one(individual, reporter))
                .collect()
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn run(&self, pending: Vec<Individual>, reporter: &ProgressReporter) -> Vec<Individual> {
        pending
            .into_iter()
            .map(|individual| self.evaluate_one(individual, reporter))
            .collect()
    }

    fn evaluate_one(&self, individual: Individual, reporter: &ProgressReporter) -> Individual {
        let fallback = Individual {
            cost: f64::INFINITY,
            ..individual.clone()
        };
        let result = tempfile::Builder::new()
            .prefix("costfunc")
            .tempdir()
            .map_err(|e| EngineError::io(Path::new("costfunc*"), e))
            .and_then(|workdir| {
                let ctx = EvalContext {
                    workdir: workdir.path(),
                    report_dir: &self.report_dir,
                };
                self.cost.evaluate(individual, &ctx)
            });
        reporter.report(Progress::TaskIncrement { amount: 1 });

        match result {
            Ok(evaluated) => evaluated,
            Err(e) => {
                let e = EngineError::Evaluation {
                    idx: fallback.idx,
                    smiles: fallback.smiles.clone(),
                    reason: e.to_string(),
                };
                warn!("{e}. Its cost is set to +inf.");
                fallback
            }
        }
    }
}
