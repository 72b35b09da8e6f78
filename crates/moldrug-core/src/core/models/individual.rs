use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Property name under which the quantitative estimate of drug-likeness is stored.
pub const QED: &str = "qed";
/// Property name of the synthetic accessibility score.
pub const SA_SCORE: &str = "sa_score";
/// Property name of the molecular weight in Dalton.
pub const MOL_WT: &str = "mol_wt";
/// Property name of the (single receptor) Vina docking score in kcal/mol.
pub const VINA_SCORE: &str = "vina_score";

/// A candidate molecule of the genetic algorithm.
///
/// The molecule itself is identified by its SMILES string; every structural
/// manipulation happens in the external toolkit. Computed responses are stored in
/// [`properties`](Individual::properties) so that desirability terms can address
/// them by name, while the multi-receptor cost functions additionally fill
/// [`vina_scores`](Individual::vina_scores) and [`pdbqts`](Individual::pdbqts) with
/// one entry per receptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    /// The SMILES representation of the molecule.
    pub smiles: String,
    /// Identifier, unique within a run. The seed molecule is always `0`.
    pub idx: usize,
    /// The prepared ligand, or the best docked pose once the individual was docked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdbqt: Option<String>,
    /// The cost to minimize. `f64::INFINITY` until evaluated.
    pub cost: f64,
    /// Named scalar responses (`qed`, `sa_score`, `mol_wt`, `vina_score`, model outputs).
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    /// Per-receptor docking scores, in receptor order.
    #[serde(default)]
    pub vina_scores: Vec<f64>,
    /// Per-receptor docked poses, in receptor order.
    #[serde(default)]
    pub pdbqts: Vec<String>,
}

impl Individual {
    /// Creates an unevaluated individual.
    pub fn new(smiles: impl Into<String>, idx: usize) -> Self {
        Self {
            smiles: smiles.into(),
            idx,
            pdbqt: None,
            cost: f64::INFINITY,
            properties: BTreeMap::new(),
            vina_scores: Vec::new(),
            pdbqts: Vec::new(),
        }
    }

    /// Returns a named property, if it was computed.
    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// Sets a named property, replacing any previous value.
    pub fn set_property(&mut self, name: impl Into<String>, value: f64) {
        self.properties.insert(name.into(), value);
    }

    /// Whether the individual carries a finite cost.
    pub fn is_evaluated(&self) -> bool {
        self.cost.is_finite()
    }

    /// Total order on the cost; `NaN` sorts after every other value.
    pub fn cmp_by_cost(&self, other: &Self) -> Ordering {
        match (self.cost.is_nan(), other.cost.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self
                .cost
                .partial_cmp(&other.cost)
                .unwrap_or(Ordering::Equal),
        }
    }
}

/// Sorts individuals in place from lowest (best) to highest cost.
///
/// The sort is stable, so equally costly individuals keep their relative order.
pub fn sort_by_cost(individuals: &mut [Individual]) {
    individuals.sort_by(|a, b| a.cmp_by_cost(b));
}
