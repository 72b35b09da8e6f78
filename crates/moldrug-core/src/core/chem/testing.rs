//! Deterministic in-process toolkit used by the unit tests of the engine and workflows.

use super::{
    ChemToolkit, Descriptors, GrowParams, ModelSet, MutationParams, PropertyPredictor, ToolkitError,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const FRAGMENTS: [&str; 6] = ["C", "N", "O", "F", "S", "Cl"];

/// Grows by appending fragments, mutates by swapping the last character for one.
/// Descriptors derive from the SMILES length so that longer molecules score lower.
pub(crate) struct MockToolkit {
    pub grow_count: usize,
    pub mutate_count: usize,
    /// When set, every mutation draws from this fixed set of molecules.
    pub mutation_pool: Option<Vec<String>>,
    pub fail_prepare_for: Option<String>,
    pub calls: AtomicUsize,
    pub prepared: Mutex<Vec<String>>,
}

impl Default for MockToolkit {
    fn default() -> Self {
        Self {
            grow_count: 6,
            mutate_count: 4,
            mutation_pool: None,
            fail_prepare_for: None,
            calls: AtomicUsize::new(0),
            prepared: Mutex::new(Vec::new()),
        }
    }
}

impl MockToolkit {
    pub fn prepared(&self) -> Vec<String> {
        self.prepared.lock().unwrap().clone()
    }
}

impl ChemToolkit for MockToolkit {
    fn grow(&self, smiles: &str, _params: &GrowParams) -> Result<Vec<String>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(FRAGMENTS
            .iter()
            .cycle()
            .take(self.grow_count)
            .enumerate()
            .map(|(i, f)| format!("{smiles}{}", f.repeat(i / FRAGMENTS.len() + 1)))
            .collect())
    }

    fn mutate(&self, smiles: &str, _params: &MutationParams) -> Result<Vec<String>, ToolkitError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if let Some(pool) = &self.mutation_pool {
            return Ok(pool.clone());
        }
        let stem = &smiles[..smiles.len().saturating_sub(1)];
        Ok(FRAGMENTS
            .iter()
            .take(self.mutate_count)
            .map(|f| format!("{stem}{f}C"))
            .collect())
    }

    fn prepare_ligand(&self, smiles: &str) -> Result<String, ToolkitError> {
        if self.fail_prepare_for.as_deref() == Some(smiles) {
            return Err(ToolkitError::Reported {
                operation: "prepare".into(),
                message: "embedding failed".into(),
            });
        }
        self.prepared.lock().unwrap().push(smiles.to_string());
        Ok(format!(
            "REMARK {smiles}\nATOM      1  C   UNL     1       0.000   0.000   0.000  0.00  0.00    +0.000 C\n"
        ))
    }

    fn descriptors(&self, smiles: &str) -> Result<Descriptors, ToolkitError> {
        let n = smiles.len() as f64;
        Ok(Descriptors {
            qed: 1.0 / n,
            sa_score: 2.0,
            mol_wt: 12.0 * n,
            num_h_acceptors: 1,
            num_h_donors: 1,
            logp: 1.0,
            num_rotatable_bonds: 1,
            tpsa: 20.0,
        })
    }

    fn similarities(&self, reference: &str, candidates: &[String]) -> Result<Vec<f64>, ToolkitError> {
        Ok(candidates
            .iter()
            .map(|c| {
                let shared = reference
                    .chars()
                    .zip(c.chars())
                    .take_while(|(a, b)| a == b)
                    .count();
                shared as f64 / reference.len().max(c.len()).max(1) as f64
            })
            .collect())
    }

    fn constrained_conformers(
        &self,
        _smiles: &str,
        _reference_path: &Path,
        num_conf: usize,
        _minimum_conf_rms: f64,
    ) -> Result<Vec<String>, ToolkitError> {
        Ok((0..num_conf)
            .map(|i| {
                format!(
                    "ATOM      1  C   UNL     1    {:8.3}   0.000   0.000  0.00  0.00    +0.000 C\n",
                    i as f64 * 5.0
                )
            })
            .collect())
    }
}

impl PropertyPredictor for MockToolkit {
    fn predict(&self, smiles: &str, models: &ModelSet) -> Result<BTreeMap<String, f64>, ToolkitError> {
        Ok(models
            .keys()
            .map(|name| (name.clone(), smiles.len() as f64))
            .collect())
    }
}
