use crate::error::{CliError, Result};
use crate::utils::parser;
use moldrug::core::chem::ChemToolkit;
use moldrug::core::chem::external::ExternalToolkit;
use moldrug::core::desirability::Desirability;
use moldrug::engine::config::{
    self as core_config, ConstraintConfig, ConstraintKind, DockingConfig, GrowParams,
    MutationParams, Receptor, VinaScoreType,
};
use moldrug::engine::cost::{
    Cost, CostFunction, CostMultiReceptors, CostMultiReceptorsOnlyVina, CostOnlyVina,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TOOLKIT_PROGRAM: &str = "moldrug-helper";

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    #[serde(rename = "GA")]
    Ga,
    Local,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostKind {
    Cost,
    CostOnlyVina,
    CostMultiReceptors,
    CostMultiReceptorsOnlyVina,
}

/// A scalar for single-receptor costs or a list with one entry per receptor.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: Clone> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialToolkit {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialCostKwargs {
    vina_executable: Option<PathBuf>,
    receptor_pdbqt_path: Option<OneOrMany<PathBuf>>,
    vina_score_type: Option<OneOrMany<VinaScoreType>>,
    boxcenter: Option<OneOrMany<[f64; 3]>>,
    boxsize: Option<OneOrMany<[f64; 3]>>,
    exhaustiveness: Option<u32>,
    ncores: Option<u32>,
    num_modes: Option<u32>,
    constraint: Option<bool>,
    constraint_type: Option<ConstraintKind>,
    constraint_ref: Option<OneOrMany<PathBuf>>,
    constraint_receptor_pdb_path: Option<OneOrMany<PathBuf>>,
    constraint_num_conf: Option<OneOrMany<usize>>,
    constraint_minimum_conf_rms: Option<OneOrMany<f64>>,
    desirability: Option<Desirability>,
    wt_cutoff: Option<f64>,
    models: Option<BTreeMap<String, PathBuf>>,
    lipinski_filter: Option<usize>,
}

impl PartialCostKwargs {
    /// Keys missing here are taken from `parent`.
    fn inherit(self, parent: &Self) -> Self {
        let p = parent.clone();
        Self {
            vina_executable: self.vina_executable.or(p.vina_executable),
            receptor_pdbqt_path: self.receptor_pdbqt_path.or(p.receptor_pdbqt_path),
            vina_score_type: self.vina_score_type.or(p.vina_score_type),
            boxcenter: self.boxcenter.or(p.boxcenter),
            boxsize: self.boxsize.or(p.boxsize),
            exhaustiveness: self.exhaustiveness.or(p.exhaustiveness),
            ncores: self.ncores.or(p.ncores),
            num_modes: self.num_modes.or(p.num_modes),
            constraint: self.constraint.or(p.constraint),
            constraint_type: self.constraint_type.or(p.constraint_type),
            constraint_ref: self.constraint_ref.or(p.constraint_ref),
            constraint_receptor_pdb_path: self
                .constraint_receptor_pdb_path
                .or(p.constraint_receptor_pdb_path),
            constraint_num_conf: self.constraint_num_conf.or(p.constraint_num_conf),
            constraint_minimum_conf_rms: self
                .constraint_minimum_conf_rms
                .or(p.constraint_minimum_conf_rms),
            desirability: self.desirability.or(p.desirability),
            wt_cutoff: self.wt_cutoff.or(p.wt_cutoff),
            models: self.models.or(p.models),
            lipinski_filter: self.lipinski_filter.or(p.lipinski_filter),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialStage {
    #[serde(rename = "type")]
    kind: Option<StageKind>,
    njobs: Option<usize>,
    seed_smiles: Option<String>,
    crem_db_path: Option<PathBuf>,
    toolkit: Option<PartialToolkit>,
    costfunc: Option<CostKind>,
    costfunc_kwargs: Option<PartialCostKwargs>,
    maxiter: Option<usize>,
    popsize: Option<usize>,
    beta: Option<f64>,
    pc: Option<f64>,
    get_similar: Option<bool>,
    grow_crem_kwargs: Option<GrowParams>,
    mutate_crem_kwargs: Option<MutationParams>,
    save_pop_every_gen: Option<usize>,
    deffnm: Option<String>,
    seed: Option<u64>,
    pick: Option<usize>,
}

impl PartialStage {
    /// Follow-up stages inherit every key except `type` and `deffnm`;
    /// `costfunc_kwargs` are merged key by key.
    fn inherit(self, parent: &Self) -> Self {
        let p = parent.clone();
        let costfunc_kwargs = match (self.costfunc_kwargs, p.costfunc_kwargs) {
            (Some(own), Some(inherited)) => Some(own.inherit(&inherited)),
            (own, inherited) => own.or(inherited),
        };
        Self {
            kind: self.kind,
            njobs: self.njobs.or(p.njobs),
            seed_smiles: self.seed_smiles.or(p.seed_smiles),
            crem_db_path: self.crem_db_path.or(p.crem_db_path),
            toolkit: self.toolkit.or(p.toolkit),
            costfunc: self.costfunc.or(p.costfunc),
            costfunc_kwargs,
            maxiter: self.maxiter.or(p.maxiter),
            popsize: self.popsize.or(p.popsize),
            beta: self.beta.or(p.beta),
            pc: self.pc.or(p.pc),
            get_similar: self.get_similar.or(p.get_similar),
            grow_crem_kwargs: self.grow_crem_kwargs.or(p.grow_crem_kwargs),
            mutate_crem_kwargs: self.mutate_crem_kwargs.or(p.mutate_crem_kwargs),
            save_pop_every_gen: self.save_pop_every_gen.or(p.save_pop_every_gen),
            deffnm: self.deffnm,
            seed: self.seed.or(p.seed),
            pick: self.pick.or(p.pick),
        }
    }
}

/// The engine configuration of one stage.
#[derive(Debug, Clone)]
pub enum StageConfig {
    Ga(core_config::GaConfig),
    Local(core_config::LocalConfig),
}

/// A fully resolved stage, ready to run.
pub struct Stage {
    pub name: String,
    pub seed_smiles: String,
    pub config: StageConfig,
    pub toolkit: Arc<ExternalToolkit>,
    pub cost: Box<dyn CostFunction>,
    /// The effective desirability of the cost function, if it has one.
    pub desirability: Option<Desirability>,
}

/// A YAML configuration file: an ordered mapping of stages.
#[derive(Debug)]
pub struct ConfigFile {
    base_dir: PathBuf,
    stages: Vec<(String, PartialStage)>,
}

impl ConfigFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::parse(&content, base_dir).map_err(|e| match e {
            CliError::Other(source) => CliError::FileParsing {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parses YAML text; relative paths resolve against `base_dir`.
    pub fn parse(content: &str, base_dir: PathBuf) -> Result<Self> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(content).map_err(anyhow::Error::from)?;
        let mut stages = Vec::with_capacity(mapping.len());
        for (key, value) in mapping {
            let name = key
                .as_str()
                .ok_or_else(|| CliError::Config(format!("Stage names must be strings, found {key:?}")))?
                .to_string();
            let stage: PartialStage = serde_yaml::from_value(value)
                .map_err(|e| anyhow::anyhow!("stage '{name}': {e}"))?;
            stages.push((name, stage));
        }
        if stages.is_empty() {
            return Err(CliError::Config("The configuration defines no stage.".to_string()));
        }
        Ok(Self { base_dir, stages })
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().map(|(name, _)| name.as_str())
    }

    pub fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value_str) =
                parser::parse_assignment(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
            let (stage_name, field) =
                parser::parse_stage_key(key).map_err(|e| CliError::Config(e.to_string()))?;
            let stage = self
                .stages
                .iter_mut()
                .find(|(name, _)| name == stage_name)
                .map(|(_, stage)| stage)
                .ok_or_else(|| CliError::Config(format!("Unknown stage in --set: '{stage_name}'")))?;

            match field {
                "popsize" => stage.popsize = Some(parse_value(key, value_str)?),
                "maxiter" => stage.maxiter = Some(parse_value(key, value_str)?),
                "beta" => stage.beta = Some(parse_value(key, value_str)?),
                "pc" => stage.pc = Some(parse_value(key, value_str)?),
                "njobs" => stage.njobs = Some(parse_value(key, value_str)?),
                "save_pop_every_gen" => stage.save_pop_every_gen = Some(parse_value(key, value_str)?),
                "seed" => stage.seed = Some(parse_value(key, value_str)?),
                "pick" => stage.pick = Some(parse_value(key, value_str)?),
                "get_similar" => stage.get_similar = Some(parse_value(key, value_str)?),
                "deffnm" => stage.deffnm = Some(value_str.to_string()),
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Applies stage inheritance and builds every stage.
    pub fn resolve(self, jobs_override: Option<usize>, outdir: &Path) -> Result<Vec<Stage>> {
        let mut resolved = Vec::with_capacity(self.stages.len());
        let mut parent: Option<PartialStage> = None;
        for (i, (name, stage)) in self.stages.into_iter().enumerate() {
            let stage = match &parent {
                Some(p) => {
                    if stage.kind.is_some_and(|k| k != StageKind::Ga) {
                        return Err(CliError::Config(format!(
                            "Stage '{name}': follow-up stages are always GA stages"
                        )));
                    }
                    stage.inherit(p)
                }
                None => stage,
            };
            let kind = if i == 0 {
                stage.kind.ok_or_else(|| missing(&name, "type"))?
            } else {
                StageKind::Ga
            };
            resolved.push(build_stage(&name, kind, &stage, jobs_override, outdir, &self.base_dir)?);
            parent = Some(stage);
        }
        Ok(resolved)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| CliError::Config(format!("Invalid value for {}: {}", key, value)))
}

fn missing(stage: &str, key: &str) -> CliError {
    CliError::Config(format!("Stage '{stage}': `{key}` is required."))
}

/// Joins a relative path onto the config directory.
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Like [`resolve_path`], but only when the file exists next to the config;
/// bare program names keep their `PATH` lookup.
fn resolve_program(base: &Path, path: &Path) -> PathBuf {
    let candidate = base.join(path);
    if !path.is_absolute() && candidate.exists() {
        candidate
    } else {
        path.to_path_buf()
    }
}

fn build_stage(
    name: &str,
    kind: StageKind,
    stage: &PartialStage,
    jobs_override: Option<usize>,
    outdir: &Path,
    base: &Path,
) -> Result<Stage> {
    let seed_smiles = stage
        .seed_smiles
        .clone()
        .ok_or_else(|| missing(name, "seed_smiles"))?;
    let crem_db_path = stage
        .crem_db_path
        .as_deref()
        .map(|p| resolve_path(base, p))
        .ok_or_else(|| missing(name, "crem_db_path"))?;

    let partial_toolkit = stage.toolkit.clone().unwrap_or_default();
    let program = partial_toolkit
        .program
        .map(|p| resolve_program(base, &p))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOOLKIT_PROGRAM));
    let args = partial_toolkit
        .args
        .unwrap_or_default()
        .into_iter()
        .map(|a| {
            let candidate = base.join(&a);
            if Path::new(&a).is_relative() && candidate.exists() {
                candidate.to_string_lossy().to_string()
            } else {
                a
            }
        })
        .collect();
    let toolkit = Arc::new(ExternalToolkit::new(program, args, crem_db_path));

    let costfunc = stage.costfunc.ok_or_else(|| missing(name, "costfunc"))?;
    let kwargs = stage.costfunc_kwargs.clone().unwrap_or_default();
    let (cost, desirability) = build_cost(name, costfunc, kwargs, toolkit.clone(), base)?;

    let njobs = jobs_override.or(stage.njobs).unwrap_or(1);
    let deffnm = stage.deffnm.clone().unwrap_or_else(|| name.to_string());

    let config = match kind {
        StageKind::Ga => {
            let mut builder = core_config::GaConfigBuilder::new()
                .njobs(njobs)
                .deffnm(deffnm)
                .outdir(outdir.to_path_buf())
                .seed(stage.seed);
            if let Some(v) = stage.popsize {
                builder = builder.popsize(v);
            }
            if let Some(v) = stage.maxiter {
                builder = builder.maxiter(v);
            }
            if let Some(v) = stage.beta {
                builder = builder.beta(v);
            }
            if let Some(v) = stage.pc {
                builder = builder.pc(v);
            }
            if let Some(v) = stage.get_similar {
                builder = builder.get_similar(v);
            }
            if let Some(v) = stage.save_pop_every_gen {
                builder = builder.save_pop_every_gen(v);
            }
            if let Some(v) = stage.grow_crem_kwargs.clone() {
                builder = builder.grow(v);
            }
            if let Some(v) = stage.mutate_crem_kwargs.clone() {
                builder = builder.mutation(v);
            }
            StageConfig::Ga(
                builder
                    .build()
                    .map_err(|e| CliError::Config(format!("Stage '{name}': {e}")))?,
            )
        }
        StageKind::Local => StageConfig::Local(
            core_config::LocalConfigBuilder::new()
                .grow(stage.grow_crem_kwargs.clone().unwrap_or_default())
                .pick(stage.pick)
                .njobs(njobs)
                .seed(stage.seed)
                .deffnm(deffnm)
                .outdir(outdir.to_path_buf())
                .build()
                .map_err(|e| CliError::Config(format!("Stage '{name}': {e}")))?,
        ),
    };

    Ok(Stage {
        name: name.to_string(),
        seed_smiles,
        config,
        toolkit,
        cost,
        desirability,
    })
}

/// Repeats a single entry to `n` values; otherwise the lengths must match.
fn per_receptor<T: Clone>(stage: &str, key: &str, values: Vec<T>, n: usize) -> Result<Vec<T>> {
    match values.len() {
        len if len == n => Ok(values),
        1 => Ok(vec![values[0].clone(); n]),
        len => Err(CliError::Config(format!(
            "Stage '{stage}': `{key}` has {len} entries for {n} receptor(s)"
        ))),
    }
}

/// `None` for every receptor when the key is absent.
fn optional_per_receptor<T: Clone>(
    stage: &str,
    key: &str,
    values: &Option<OneOrMany<T>>,
    n: usize,
) -> Result<Vec<Option<T>>> {
    match values {
        Some(values) => Ok(per_receptor(stage, key, values.clone().into_vec(), n)?
            .into_iter()
            .map(Some)
            .collect()),
        None => Ok(vec![None; n]),
    }
}

fn build_receptors(name: &str, kwargs: &PartialCostKwargs, base: &Path) -> Result<Vec<Receptor>> {
    let paths = kwargs
        .receptor_pdbqt_path
        .clone()
        .ok_or_else(|| missing(name, "costfunc_kwargs.receptor_pdbqt_path"))?
        .into_vec();
    let n = paths.len();
    let centers = kwargs
        .boxcenter
        .clone()
        .ok_or_else(|| missing(name, "costfunc_kwargs.boxcenter"))?
        .into_vec();
    let sizes = kwargs
        .boxsize
        .clone()
        .ok_or_else(|| missing(name, "costfunc_kwargs.boxsize"))?
        .into_vec();
    let centers = per_receptor(name, "boxcenter", centers, n)?;
    let sizes = per_receptor(name, "boxsize", sizes, n)?;

    let constraints: Vec<Option<ConstraintConfig>> = if kwargs.constraint.unwrap_or(false) {
        let refs = kwargs
            .constraint_ref
            .clone()
            .ok_or_else(|| missing(name, "costfunc_kwargs.constraint_ref"))?
            .into_vec();
        let pdbs = kwargs
            .constraint_receptor_pdb_path
            .clone()
            .ok_or_else(|| missing(name, "costfunc_kwargs.constraint_receptor_pdb_path"))?
            .into_vec();
        let refs = per_receptor(name, "constraint_ref", refs, n)?;
        let pdbs = per_receptor(name, "constraint_receptor_pdb_path", pdbs, n)?;
        let num_conf = optional_per_receptor(name, "constraint_num_conf", &kwargs.constraint_num_conf, n)?;
        let min_rms = optional_per_receptor(
            name,
            "constraint_minimum_conf_rms",
            &kwargs.constraint_minimum_conf_rms,
            n,
        )?;
        refs.into_iter()
            .zip(pdbs)
            .zip(num_conf.into_iter().zip(min_rms))
            .map(|((reference, pdb), (num_conf, min_rms))| {
                let mut c = ConstraintConfig::new(
                    kwargs.constraint_type.unwrap_or(ConstraintKind::ScoreOnly),
                    resolve_path(base, &reference),
                    resolve_path(base, &pdb),
                );
                if let Some(v) = num_conf {
                    c.num_conf = v;
                }
                if let Some(v) = min_rms {
                    c.minimum_conf_rms = v;
                }
                Some(c)
            })
            .collect()
    } else {
        vec![None; n]
    };

    Ok(paths
        .into_iter()
        .zip(centers)
        .zip(sizes)
        .zip(constraints)
        .map(|(((path, center), size), constraint)| {
            let receptor = Receptor::new(resolve_path(base, &path), center, size);
            match constraint {
                Some(c) => receptor.with_constraint(c),
                None => receptor,
            }
        })
        .collect())
}

fn reject(name: &str, costfunc: CostKind, key: &str, present: bool) -> Result<()> {
    if present {
        return Err(CliError::Config(format!(
            "Stage '{name}': `costfunc_kwargs.{key}` is not supported by {costfunc:?}"
        )));
    }
    Ok(())
}

fn build_cost(
    name: &str,
    costfunc: CostKind,
    kwargs: PartialCostKwargs,
    toolkit: Arc<ExternalToolkit>,
    base: &Path,
) -> Result<(Box<dyn CostFunction>, Option<Desirability>)> {
    let defaults = DockingConfig::default();
    let docking = DockingConfig {
        vina_executable: kwargs
            .vina_executable
            .as_deref()
            .map(|p| resolve_program(base, p))
            .unwrap_or(defaults.vina_executable),
        exhaustiveness: kwargs.exhaustiveness.unwrap_or(defaults.exhaustiveness),
        ncores: kwargs.ncores.unwrap_or(defaults.ncores),
        num_modes: kwargs.num_modes.unwrap_or(defaults.num_modes),
    };
    let receptors = build_receptors(name, &kwargs, base)?;
    let chem: Arc<dyn ChemToolkit> = toolkit.clone();
    let multi = matches!(
        costfunc,
        CostKind::CostMultiReceptors | CostKind::CostMultiReceptorsOnlyVina
    );

    if !multi {
        reject(name, costfunc, "vina_score_type", kwargs.vina_score_type.is_some())?;
        if receptors.len() != 1 {
            return Err(CliError::Config(format!(
                "Stage '{name}': {costfunc:?} docks against exactly one receptor"
            )));
        }
    }
    if costfunc != CostKind::Cost {
        reject(name, costfunc, "models", kwargs.models.is_some())?;
        reject(name, costfunc, "lipinski_filter", kwargs.lipinski_filter.is_some())?;
    }

    let with_types = |receptors: Vec<Receptor>| -> Result<Vec<(Receptor, VinaScoreType)>> {
        let types = kwargs
            .vina_score_type
            .clone()
            .ok_or_else(|| missing(name, "costfunc_kwargs.vina_score_type"))?
            .into_vec();
        let types = per_receptor(name, "vina_score_type", types, receptors.len())?;
        Ok(receptors.into_iter().zip(types).collect())
    };
    let desirability = kwargs.desirability.clone();

    let cost: (Box<dyn CostFunction>, Option<Desirability>) = match costfunc {
        CostKind::Cost => {
            reject(name, costfunc, "wt_cutoff", kwargs.wt_cutoff.is_some())?;
            let receptor = receptors.into_iter().next().ok_or_else(|| missing(name, "receptor_pdbqt_path"))?;
            let mut cost = Cost::new(chem, docking, receptor, None)?
                .with_lipinski_filter(kwargs.lipinski_filter);
            if let Some(models) = kwargs.models.clone() {
                let models = models
                    .into_iter()
                    .map(|(model, path)| (model, resolve_path(base, &path)))
                    .collect();
                cost = cost.with_models(toolkit, models)?;
            }
            if let Some(desirability) = desirability {
                cost = cost.with_desirability(desirability)?;
            }
            let effective = cost.desirability().clone();
            (Box::new(cost), Some(effective))
        }
        CostKind::CostOnlyVina => {
            reject(name, costfunc, "desirability", desirability.is_some())?;
            let receptor = receptors.into_iter().next().ok_or_else(|| missing(name, "receptor_pdbqt_path"))?;
            let cost = CostOnlyVina::new(chem, docking, receptor, kwargs.wt_cutoff)?;
            (Box::new(cost), None)
        }
        CostKind::CostMultiReceptors => {
            reject(name, costfunc, "wt_cutoff", kwargs.wt_cutoff.is_some())?;
            let cost = CostMultiReceptors::new(chem, docking, with_types(receptors)?, desirability)?;
            let effective = cost.desirability().clone();
            (Box::new(cost), Some(effective))
        }
        CostKind::CostMultiReceptorsOnlyVina => {
            let cost = CostMultiReceptorsOnlyVina::new(
                chem,
                docking,
                with_types(receptors)?,
                desirability,
                kwargs.wt_cutoff,
            )?;
            let effective = cost.desirability().clone();
            (Box::new(cost), Some(effective))
        }
    };
    Ok(cost)
}
