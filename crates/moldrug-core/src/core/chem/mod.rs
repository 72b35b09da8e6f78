//! # Chemistry Boundary
//!
//! Every cheminformatics operation needed by the optimizer sits behind the
//! [`ChemToolkit`] and [`PropertyPredictor`] traits: CReM fragment growing and
//! mutation, 3D embedding and PDBQT preparation, descriptors, fingerprint
//! similarity, constrained conformer generation and pretrained model predictions.
//!
//! [`external::ExternalToolkit`] implements both traits by talking JSON to a helper
//! program, so the crate itself never parses SMILES or types atoms.

pub mod external;
pub mod lipinski;

#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolkitError {
    #[error("Failed to launch toolkit program '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("I/O error while talking to the toolkit: {0}")]
    Io(#[from] std::io::Error),
    #[error("Toolkit operation '{operation}' exited with {status}: {stderr}")]
    Exit {
        operation: String,
        status: String,
        stderr: String,
    },
    #[error("Malformed response to toolkit operation '{operation}': {message}")]
    Protocol { operation: String, message: String },
    #[error("Toolkit operation '{operation}' failed: {message}")]
    Reported { operation: String, message: String },
}

/// Parameters of CReM `grow_mol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrowParams {
    pub radius: u32,
    pub min_atoms: u32,
    pub max_atoms: u32,
}

impl Default for GrowParams {
    fn default() -> Self {
        Self {
            radius: 3,
            min_atoms: 1,
            max_atoms: 4,
        }
    }
}

/// Parameters of CReM `mutate_mol`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MutationParams {
    pub radius: u32,
    pub min_size: u32,
    pub max_size: u32,
    pub min_inc: i32,
    pub max_inc: i32,
    pub ncores: u32,
}

impl Default for MutationParams {
    fn default() -> Self {
        Self {
            radius: 3,
            min_size: 0,
            max_size: 10,
            min_inc: -2,
            max_inc: 2,
            ncores: 1,
        }
    }
}

/// Descriptors computed for every candidate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Descriptors {
    /// Quantitative estimate of drug-likeness.
    pub qed: f64,
    /// Synthetic accessibility score (1 easy, 10 hard).
    pub sa_score: f64,
    /// Average molecular weight in Dalton.
    pub mol_wt: f64,
    pub num_h_acceptors: u32,
    pub num_h_donors: u32,
    /// Crippen logP.
    pub logp: f64,
    pub num_rotatable_bonds: u32,
    /// Topological polar surface area.
    pub tpsa: f64,
}

/// Named pretrained models, each an opaque file handed to the helper program.
pub type ModelSet = BTreeMap<String, PathBuf>;

pub trait ChemToolkit: Send + Sync {
    /// Molecules obtained by growing `smiles` with CReM fragments.
    fn grow(&self, smiles: &str, params: &GrowParams) -> Result<Vec<String>, ToolkitError>;

    /// Molecules obtained by CReM replacements on `smiles`.
    fn mutate(&self, smiles: &str, params: &MutationParams) -> Result<Vec<String>, ToolkitError>;

    /// Embeds the molecule in 3D and returns it as a PDBQT ligand.
    fn prepare_ligand(&self, smiles: &str) -> Result<String, ToolkitError>;

    fn descriptors(&self, smiles: &str) -> Result<Descriptors, ToolkitError>;

    /// Tanimoto similarity (Morgan fingerprints, radius 2) of each candidate to `reference`.
    fn similarities(&self, reference: &str, candidates: &[String]) -> Result<Vec<f64>, ToolkitError>;

    /// Conformers of `smiles` keeping the maximum common substructure with the
    /// reference ligand at `reference_path` fixed, as PDBQT strings.
    ///
    /// Conformers closer than `minimum_conf_rms` to an earlier one are dropped.
    fn constrained_conformers(
        &self,
        smiles: &str,
        reference_path: &Path,
        num_conf: usize,
        minimum_conf_rms: f64,
    ) -> Result<Vec<String>, ToolkitError>;
}

pub trait PropertyPredictor: Send + Sync {
    /// One prediction per entry of `models`, keyed by the model name.
    fn predict(&self, smiles: &str, models: &ModelSet) -> Result<BTreeMap<String, f64>, ToolkitError>;
}
