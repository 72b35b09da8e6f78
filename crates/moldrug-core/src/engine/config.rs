use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use crate::core::chem::{GrowParams, MutationParams};

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// How a constrained ligand is handed to Vina.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Score the pose as generated, no optimization.
    ScoreOnly,
    /// Local optimization of the pose inside the box.
    LocalOnly,
}

impl ConstraintKind {
    pub fn flag(self) -> &'static str {
        match self {
            Self::ScoreOnly => "--score_only",
            Self::LocalOnly => "--local_only",
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.flag().trim_start_matches('-'))
    }
}

/// Docking with a fixed core: conformers keep the maximum common substructure
/// with a reference ligand in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    pub kind: ConstraintKind,
    /// Reference ligand (MOL file) providing the fixed core.
    pub reference_path: PathBuf,
    /// Receptor in PDB format, used to discard clashing conformers.
    pub receptor_pdb_path: PathBuf,
    pub num_conf: usize,
    pub minimum_conf_rms: f64,
    /// Heavy-atom distance (Å) below which a conformer clashes with the receptor.
    pub clash_distance: f64,
}

impl ConstraintConfig {
    pub const DEFAULT_NUM_CONF: usize = 100;
    pub const DEFAULT_MINIMUM_CONF_RMS: f64 = 0.01;
    pub const DEFAULT_CLASH_DISTANCE: f64 = 1.5;

    pub fn new(kind: ConstraintKind, reference_path: PathBuf, receptor_pdb_path: PathBuf) -> Self {
        Self {
            kind,
            reference_path,
            receptor_pdb_path,
            num_conf: Self::DEFAULT_NUM_CONF,
            minimum_conf_rms: Self::DEFAULT_MINIMUM_CONF_RMS,
            clash_distance: Self::DEFAULT_CLASH_DISTANCE,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.num_conf == 0 {
            return Err(invalid("constraint_num_conf", "must be at least 1"));
        }
        if !(self.minimum_conf_rms >= 0.0) {
            return Err(invalid("constraint_minimum_conf_rms", "must be non-negative"));
        }
        if !(self.clash_distance > 0.0) {
            return Err(invalid("constraint_clash_distance", "must be positive"));
        }
        Ok(())
    }
}

/// A receptor and its search box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receptor {
    pub pdbqt_path: PathBuf,
    pub boxcenter: [f64; 3],
    pub boxsize: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraint: Option<ConstraintConfig>,
}

impl Receptor {
    pub fn new(pdbqt_path: PathBuf, boxcenter: [f64; 3], boxsize: [f64; 3]) -> Self {
        Self {
            pdbqt_path,
            boxcenter,
            boxsize,
            constraint: None,
        }
    }

    pub fn with_constraint(mut self, constraint: ConstraintConfig) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boxcenter.iter().any(|v| !v.is_finite()) {
            return Err(invalid("boxcenter", "every coordinate must be finite"));
        }
        if self.boxsize.iter().any(|v| !(*v > 0.0 && v.is_finite())) {
            return Err(invalid("boxsize", "every edge must be positive"));
        }
        if let Some(constraint) = &self.constraint {
            constraint.validate()?;
        }
        Ok(())
    }
}

/// Settings of the Vina executable shared by every receptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockingConfig {
    pub vina_executable: PathBuf,
    pub exhaustiveness: u32,
    /// Value of `--cpu` for each Vina process.
    pub ncores: u32,
    pub num_modes: u32,
}

impl Default for DockingConfig {
    fn default() -> Self {
        Self {
            vina_executable: PathBuf::from("vina"),
            exhaustiveness: 8,
            ncores: 1,
            num_modes: 1,
        }
    }
}

impl DockingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exhaustiveness == 0 {
            return Err(invalid("exhaustiveness", "must be at least 1"));
        }
        if self.ncores == 0 {
            return Err(invalid("ncores", "must be at least 1"));
        }
        if self.num_modes == 0 {
            return Err(invalid("num_modes", "must be at least 1"));
        }
        Ok(())
    }
}

/// Whether the score of a receptor should be minimized (target) or maximized (off-target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VinaScoreType {
    Min,
    Max,
}

impl VinaScoreType {
    /// Key of the matching term in the `vina_scores` desirability section.
    pub fn key(self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaConfig {
    pub popsize: usize,
    pub maxiter: usize,
    pub beta: f64,
    pub pc: f64,
    pub get_similar: bool,
    pub grow: GrowParams,
    pub mutation: MutationParams,
    /// Checkpoint interval in generations; `0` disables intermediate checkpoints.
    pub save_pop_every_gen: usize,
    pub deffnm: String,
    pub njobs: usize,
    pub seed: Option<u64>,
    pub outdir: PathBuf,
}

impl GaConfig {
    /// Offspring produced per generation, `round(pc * popsize)` and at least one.
    pub fn offspring_per_generation(&self) -> usize {
        ((self.pc * self.popsize as f64).round() as usize).max(1)
    }
}

#[derive(Default)]
pub struct GaConfigBuilder {
    popsize: Option<usize>,
    maxiter: Option<usize>,
    beta: Option<f64>,
    pc: Option<f64>,
    get_similar: Option<bool>,
    grow: Option<GrowParams>,
    mutation: Option<MutationParams>,
    save_pop_every_gen: Option<usize>,
    deffnm: Option<String>,
    njobs: Option<usize>,
    seed: Option<u64>,
    outdir: Option<PathBuf>,
}

impl GaConfigBuilder {
    pub const DEFAULT_BETA: f64 = 0.001;
    pub const DEFAULT_PC: f64 = 1.0;
    pub const DEFAULT_DEFFNM: &'static str = "ga";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn popsize(mut self, popsize: usize) -> Self {
        self.popsize = Some(popsize);
        self
    }
    pub fn maxiter(mut self, maxiter: usize) -> Self {
        self.maxiter = Some(maxiter);
        self
    }
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }
    pub fn pc(mut self, pc: f64) -> Self {
        self.pc = Some(pc);
        self
    }
    pub fn get_similar(mut self, get_similar: bool) -> Self {
        self.get_similar = Some(get_similar);
        self
    }
    pub fn grow(mut self, params: GrowParams) -> Self {
        self.grow = Some(params);
        self
    }
    pub fn mutation(mut self, params: MutationParams) -> Self {
        self.mutation = Some(params);
        self
    }
    pub fn save_pop_every_gen(mut self, every: usize) -> Self {
        self.save_pop_every_gen = Some(every);
        self
    }
    pub fn deffnm(mut self, deffnm: impl Into<String>) -> Self {
        self.deffnm = Some(deffnm.into());
        self
    }
    pub fn njobs(mut self, njobs: usize) -> Self {
        self.njobs = Some(njobs);
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn outdir(mut self, outdir: PathBuf) -> Self {
        self.outdir = Some(outdir);
        self
    }

    pub fn build(self) -> Result<GaConfig, ConfigError> {
        let popsize = self.popsize.ok_or(ConfigError::MissingParameter("popsize"))?;
        if popsize < 2 {
            return Err(invalid("popsize", format!("must be at least 2, got {popsize}")));
        }
        let beta = self.beta.unwrap_or(Self::DEFAULT_BETA);
        if !beta.is_finite() || beta < 0.0 {
            return Err(invalid("beta", format!("must be finite and non-negative, got {beta}")));
        }
        let pc = self.pc.unwrap_or(Self::DEFAULT_PC);
        if !(pc > 0.0 && pc.is_finite()) {
            return Err(invalid("pc", format!("must be positive, got {pc}")));
        }
        let njobs = self.njobs.unwrap_or(1);
        if njobs == 0 {
            return Err(invalid("njobs", "must be at least 1"));
        }
        let deffnm = self.deffnm.unwrap_or_else(|| Self::DEFAULT_DEFFNM.to_string());
        if deffnm.is_empty() {
            return Err(invalid("deffnm", "must not be empty"));
        }

        Ok(GaConfig {
            popsize,
            maxiter: self.maxiter.ok_or(ConfigError::MissingParameter("maxiter"))?,
            beta,
            pc,
            get_similar: self.get_similar.unwrap_or(false),
            grow: self.grow.unwrap_or_default(),
            mutation: self.mutation.unwrap_or_default(),
            save_pop_every_gen: self.save_pop_every_gen.unwrap_or(0),
            deffnm,
            njobs,
            seed: self.seed,
            outdir: self.outdir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalConfig {
    pub grow: GrowParams,
    /// Keep only this many randomly chosen grown molecules.
    pub pick: Option<usize>,
    pub njobs: usize,
    pub seed: Option<u64>,
    pub deffnm: String,
    pub outdir: PathBuf,
}

#[derive(Default)]
pub struct LocalConfigBuilder {
    grow: Option<GrowParams>,
    pick: Option<usize>,
    njobs: Option<usize>,
    seed: Option<u64>,
    deffnm: Option<String>,
    outdir: Option<PathBuf>,
}

impl LocalConfigBuilder {
    pub const DEFAULT_DEFFNM: &'static str = "local";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn grow(mut self, params: GrowParams) -> Self {
        self.grow = Some(params);
        self
    }
    pub fn pick(mut self, pick: Option<usize>) -> Self {
        self.pick = pick;
        self
    }
    pub fn njobs(mut self, njobs: usize) -> Self {
        self.njobs = Some(njobs);
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn deffnm(mut self, deffnm: impl Into<String>) -> Self {
        self.deffnm = Some(deffnm.into());
        self
    }
    pub fn outdir(mut self, outdir: PathBuf) -> Self {
        self.outdir = Some(outdir);
        self
    }

    pub fn build(self) -> Result<LocalConfig, ConfigError> {
        let njobs = self.njobs.unwrap_or(1);
        if njobs == 0 {
            return Err(invalid("njobs", "must be at least 1"));
        }
        if self.pick == Some(0) {
            return Err(invalid("pick", "must be at least 1 when given"));
        }
        Ok(LocalConfig {
            grow: self.grow.unwrap_or_default(),
            pick: self.pick,
            njobs,
            seed: self.seed,
            deffnm: self
                .deffnm
                .unwrap_or_else(|| Self::DEFAULT_DEFFNM.to_string()),
            outdir: self.outdir.unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}
