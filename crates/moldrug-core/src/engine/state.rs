use super::error::EngineError;
use crate::core::io::checkpoint;
use crate::core::models::individual::Individual;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// TOML integers are signed 64-bit, so stored seeds keep the low 63 bits.
const SEED_MASK: u64 = i64::MAX as u64;

/// Everything needed to continue a genetic-algorithm run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaState {
    /// Generations completed so far; `0` right after the initial population.
    pub generation: usize,
    pub seed_smiles: String,
    pub deffnm: String,
    /// Seed of the per-generation random number generators.
    pub rng_seed: u64,
    /// The next unused individual identifier.
    pub next_idx: usize,
    /// Best finite cost after each generation, starting with the initial population.
    pub best_cost: Vec<f64>,
    /// Average finite cost after each generation.
    pub avg_cost: Vec<f64>,
    /// Every SMILES generated during the run.
    pub seen: BTreeSet<String>,
    /// Current population, sorted by cost.
    pub population: Vec<Individual>,
    /// One record per molecule scored so far, failures included. A resumed run
    /// reuses them instead of docking again.
    #[serde(default)]
    pub evaluated: Vec<Individual>,
}

impl GaState {
    pub fn new(seed_smiles: impl Into<String>, deffnm: impl Into<String>, rng_seed: u64) -> Self {
        Self {
            generation: 0,
            seed_smiles: seed_smiles.into(),
            deffnm: deffnm.into(),
            rng_seed: rng_seed & SEED_MASK,
            next_idx: 1,
            best_cost: Vec::new(),
            avg_cost: Vec::new(),
            seen: BTreeSet::new(),
            population: Vec::new(),
            evaluated: Vec::new(),
        }
    }

    /// Hands out a fresh individual identifier.
    pub fn allocate_idx(&mut self) -> usize {
        let idx = self.next_idx;
        self.next_idx += 1;
        idx
    }

    /// Appends the statistics of the current population.
    pub fn record_statistics(&mut self) -> (f64, f64) {
        let (best, avg) = population_statistics(&self.population);
        self.best_cost.push(best);
        self.avg_cost.push(avg);
        (best, avg)
    }

    pub fn best(&self) -> Option<&Individual> {
        self.population.first()
    }

    /// `<outdir>/<deffnm>_pop.toml.zst`
    pub fn checkpoint_path(outdir: &Path, deffnm: &str) -> PathBuf {
        outdir.join(format!("{deffnm}_pop.{}", checkpoint::EXTENSION))
    }

    /// `<outdir>/<deffnm>_result.toml.zst`
    pub fn result_path(outdir: &Path, deffnm: &str) -> PathBuf {
        outdir.join(format!("{deffnm}_result.{}", checkpoint::EXTENSION))
    }

    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        checkpoint::save(self, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let mut state: Self = checkpoint::load(path)?;
        let max_idx = state.population.iter().map(|i| i.idx).max().unwrap_or(0);
        state.next_idx = state.next_idx.max(max_idx + 1);
        let scored = state.population.iter().chain(&state.evaluated);
        state.seen.extend(scored.map(|i| i.smiles.clone()));
        Ok(state)
    }
}

/// The lowest and the mean finite cost; both `+inf` when no cost is finite.
pub fn population_statistics(population: &[Individual]) -> (f64, f64) {
    let finite: Vec<f64> = population
        .iter()
        .map(|i| i.cost)
        .filter(|c| c.is_finite())
        .collect();
    if finite.is_empty() {
        return (f64::INFINITY, f64::INFINITY);
    }
    let best = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let avg = finite.iter().sum::<f64>() / finite.len() as f64;
    (best, avg)
}
