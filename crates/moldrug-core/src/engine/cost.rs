//! The cost functions minimized by the workflows.
//!
//! | cost function                 | responses                                     | cost                 |
//! |-------------------------------|-----------------------------------------------|----------------------|
//! | [`Cost`]                      | `qed`, `sa_score`, `mol_wt`, models, `vina_score` | `1 - D`          |
//! | [`CostOnlyVina`]              | `vina_score`                                  | the Vina score       |
//! | [`CostMultiReceptors`]        | descriptors, one score per receptor           | `1 - D`              |
//! | [`CostMultiReceptorsOnlyVina`]| one score per receptor                        | `1 - D`              |

use super::config::{DockingConfig, Receptor, VinaScoreType};
use super::docking::{DockingJob, DockingOutcome, VinaRunner};
use super::error::EngineError;
use crate::core::chem::lipinski::lipinski_filter;
use crate::core::chem::{ChemToolkit, Descriptors, ModelSet, PropertyPredictor};
use crate::core::desirability::{
    Desirability, DesirabilityError, DesirabilityTerm, WeightedGeometricMean,
};
use crate::core::models::individual::{Individual, MOL_WT, QED, SA_SCORE, VINA_SCORE};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const VINA_SCORES_SECTION: &str = "vina_scores";

/// Where a single evaluation may write.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Scratch directory owned by this evaluation.
    pub workdir: &'a Path,
    /// Directory receiving error reports; outlives the run.
    pub report_dir: &'a Path,
}

pub trait CostFunction: Send + Sync {
    fn name(&self) -> &'static str;

    /// Computes the responses and the cost of `individual`.
    fn evaluate(&self, individual: Individual, ctx: &EvalContext) -> Result<Individual, EngineError>;
}

/// Docking shared by every cost function.
struct Docking {
    toolkit: Arc<dyn ChemToolkit>,
    runner: VinaRunner,
}

impl Docking {
    fn new(toolkit: Arc<dyn ChemToolkit>, config: DockingConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            toolkit,
            runner: VinaRunner::new(config),
        })
    }

    fn prepare(&self, individual: &mut Individual) -> Result<String, EngineError> {
        let ligand = self.toolkit.prepare_ligand(&individual.smiles)?;
        individual.pdbqt = Some(ligand.clone());
        Ok(ligand)
    }

    fn dock(
        &self,
        individual: &Individual,
        ligand: &str,
        receptor: &Receptor,
        label: String,
        ctx: &EvalContext,
    ) -> Result<DockingOutcome, EngineError> {
        let job = DockingJob {
            individual,
            ligand_pdbqt: ligand,
            receptor,
            label,
            workdir: ctx.workdir,
            report_dir: ctx.report_dir,
        };
        Ok(self.runner.dock(&job, self.toolkit.as_ref())?)
    }

    fn set_descriptors(&self, individual: &mut Individual) -> Result<Descriptors, EngineError> {
        let d = self.toolkit.descriptors(&individual.smiles)?;
        individual.set_property(QED, d.qed);
        individual.set_property(SA_SCORE, d.sa_score);
        individual.set_property(MOL_WT, d.mol_wt);
        Ok(d)
    }

    fn exceeds_weight(&self, individual: &mut Individual, cutoff: Option<f64>) -> Result<bool, EngineError> {
        let Some(cutoff) = cutoff else {
            return Ok(false);
        };
        let mol_wt = self.toolkit.descriptors(&individual.smiles)?.mol_wt;
        individual.set_property(MOL_WT, mol_wt);
        Ok(mol_wt > cutoff)
    }
}

fn check_terms<'a>(
    desirability: &Desirability,
    available: impl IntoIterator<Item = &'a str>,
) -> Result<(), EngineError> {
    desirability.validate()?;
    let available: BTreeSet<&str> = available.into_iter().collect();
    if let Some(name) = desirability
        .terms()
        .keys()
        .find(|name| !available.contains(name.as_str()))
    {
        return Err(EngineError::Desirability(DesirabilityError::MissingProperty(
            name.clone(),
        )));
    }
    Ok(())
}

fn check_receptors(receptors: &[(Receptor, VinaScoreType)]) -> Result<(), EngineError> {
    if receptors.is_empty() {
        return Err(EngineError::Initialization(
            "at least one receptor is required".to_string(),
        ));
    }
    for (receptor, _) in receptors {
        receptor.validate()?;
    }
    Ok(())
}

fn check_score_types(
    terms: Option<&BTreeMap<String, DesirabilityTerm>>,
    receptors: &[(Receptor, VinaScoreType)],
    section: &str,
) -> Result<(), EngineError> {
    for (_, kind) in receptors {
        if !terms.is_some_and(|t| t.contains_key(kind.key())) {
            return Err(EngineError::Desirability(DesirabilityError::MissingProperty(
                format!("{section}[{}]", kind.key()),
            )));
        }
    }
    Ok(())
}

/// Desirability over drug-likeness, synthetic accessibility, optional model
/// predictions and the Vina score of one receptor.
pub struct Cost {
    docking: Docking,
    receptor: Receptor,
    desirability: Desirability,
    predictor: Option<(Arc<dyn PropertyPredictor>, ModelSet)>,
    lipinski_max_violations: Option<usize>,
}

impl Cost {
    pub fn new(
        toolkit: Arc<dyn ChemToolkit>,
        docking: DockingConfig,
        receptor: Receptor,
        desirability: Option<Desirability>,
    ) -> Result<Self, EngineError> {
        receptor.validate()?;
        let cost = Self {
            docking: Docking::new(toolkit, docking)?,
            receptor,
            desirability: desirability.unwrap_or_else(Desirability::default_cost),
            predictor: None,
            lipinski_max_violations: None,
        };
        cost.check()?;
        Ok(cost)
    }

    /// Adds predicted properties, one per model, addressable by the model name.
    pub fn with_models(
        mut self,
        predictor: Arc<dyn PropertyPredictor>,
        models: ModelSet,
    ) -> Result<Self, EngineError> {
        self.predictor = (!models.is_empty()).then_some((predictor, models));
        self.check()?;
        Ok(self)
    }

    /// Replaces the desirability; terms may name any model added with [`with_models`](Self::with_models).
    pub fn with_desirability(mut self, desirability: Desirability) -> Result<Self, EngineError> {
        self.desirability = desirability;
        self.check()?;
        Ok(self)
    }

    /// Rejects molecules violating at least `max_violations` Lipinski rules before docking.
    pub fn with_lipinski_filter(mut self, max_violations: Option<usize>) -> Self {
        self.lipinski_max_violations = max_violations;
        self
    }

    pub fn desirability(&self) -> &Desirability {
        &self.desirability
    }

    fn check(&self) -> Result<(), EngineError> {
        let models = self
            .predictor
            .iter()
            .flat_map(|(_, models)| models.keys().map(String::as_str));
        check_terms(
            &self.desirability,
            [QED, SA_SCORE, MOL_WT, VINA_SCORE].into_iter().chain(models),
        )
    }
}

impl CostFunction for Cost {
    fn name(&self) -> &'static str {
        "Cost"
    }

    fn evaluate(&self, mut individual: Individual, ctx: &EvalContext) -> Result<Individual, EngineError> {
        let descriptors = self.docking.set_descriptors(&mut individual)?;

        if let Some(max) = self.lipinski_max_violations {
            if !lipinski_filter(&descriptors, max) {
                debug!(idx = individual.idx, smiles = %individual.smiles, "Rejected by the Lipinski filter");
                individual.set_property(VINA_SCORE, f64::INFINITY);
                individual.cost = f64::INFINITY;
                return Ok(individual);
            }
        }

        if let Some((predictor, models)) = &self.predictor {
            for (name, value) in predictor.predict(&individual.smiles, models)? {
                individual.set_property(name, value);
            }
        }

        let ligand = self.docking.prepare(&mut individual)?;
        let outcome = self.docking.dock(
            &individual,
            &ligand,
            &self.receptor,
            individual.idx.to_string(),
            ctx,
        )?;
        individual.set_property(VINA_SCORE, outcome.score);
        individual.pdbqt = Some(outcome.pdbqt);

        individual.cost = self.desirability.cost(|name| individual.property(name))?;
        Ok(individual)
    }
}

/// The Vina score itself, optionally skipping molecules heavier than `wt_cutoff`.
pub struct CostOnlyVina {
    docking: Docking,
    receptor: Receptor,
    wt_cutoff: Option<f64>,
}

impl CostOnlyVina {
    pub fn new(
        toolkit: Arc<dyn ChemToolkit>,
        docking: DockingConfig,
        receptor: Receptor,
        wt_cutoff: Option<f64>,
    ) -> Result<Self, EngineError> {
        receptor.validate()?;
        Ok(Self {
            docking: Docking::new(toolkit, docking)?,
            receptor,
            wt_cutoff,
        })
    }
}

impl CostFunction for CostOnlyVina {
    fn name(&self) -> &'static str {
        "CostOnlyVina"
    }

    fn evaluate(&self, mut individual: Individual, ctx: &EvalContext) -> Result<Individual, EngineError> {
        if self.docking.exceeds_weight(&mut individual, self.wt_cutoff)? {
            individual.set_property(VINA_SCORE, f64::INFINITY);
            individual.cost = f64::INFINITY;
            return Ok(individual);
        }

        let ligand = self.docking.prepare(&mut individual)?;
        let outcome = self.docking.dock(
            &individual,
            &ligand,
            &self.receptor,
            individual.idx.to_string(),
            ctx,
        )?;
        individual.set_property(VINA_SCORE, outcome.score);
        individual.pdbqt = Some(outcome.pdbqt);
        individual.cost = outcome.score;
        Ok(individual)
    }
}

fn dock_all(
    docking: &Docking,
    individual: &mut Individual,
    receptors: &[(Receptor, VinaScoreType)],
    ctx: &EvalContext,
) -> Result<(), EngineError> {
    let ligand = docking.prepare(individual)?;
    individual.vina_scores.clear();
    individual.pdbqts.clear();
    for (i, (receptor, _)) in receptors.iter().enumerate() {
        let label = format!("{}_{i}", individual.idx);
        let outcome = docking.dock(individual, &ligand, receptor, label, ctx)?;
        individual.vina_scores.push(outcome.score);
        individual.pdbqts.push(outcome.pdbqt);
    }
    Ok(())
}

/// Desirability over descriptors plus one Vina score per receptor; targets are
/// scored with the `vina_scores.min` term and off-targets with `vina_scores.max`.
pub struct CostMultiReceptors {
    docking: Docking,
    receptors: Vec<(Receptor, VinaScoreType)>,
    desirability: Desirability,
}

impl CostMultiReceptors {
    pub fn new(
        toolkit: Arc<dyn ChemToolkit>,
        docking: DockingConfig,
        receptors: Vec<(Receptor, VinaScoreType)>,
        desirability: Option<Desirability>,
    ) -> Result<Self, EngineError> {
        check_receptors(&receptors)?;
        let desirability = desirability.unwrap_or_else(Desirability::default_multi_receptor);
        check_terms(&desirability, [QED, SA_SCORE, MOL_WT])?;
        check_score_types(
            desirability.section(VINA_SCORES_SECTION),
            &receptors,
            VINA_SCORES_SECTION,
        )?;
        Ok(Self {
            docking: Docking::new(toolkit, docking)?,
            receptors,
            desirability,
        })
    }

    pub fn desirability(&self) -> &Desirability {
        &self.desirability
    }
}

impl CostFunction for CostMultiReceptors {
    fn name(&self) -> &'static str {
        "CostMultiReceptors"
    }

    fn evaluate(&self, mut individual: Individual, ctx: &EvalContext) -> Result<Individual, EngineError> {
        self.docking.set_descriptors(&mut individual)?;
        dock_all(&self.docking, &mut individual, &self.receptors, ctx)?;

        let mut mean = WeightedGeometricMean::new();
        self.desirability
            .accumulate(&mut mean, |name| individual.property(name))?;
        let section = self.desirability.section(VINA_SCORES_SECTION);
        for (score, (_, kind)) in individual.vina_scores.iter().zip(&self.receptors) {
            let term = section
                .and_then(|s| s.get(kind.key()))
                .ok_or_else(|| DesirabilityError::MissingProperty(kind.key().to_string()))?;
            mean.push_term(term, *score);
        }
        individual.cost = mean.cost()?;
        Ok(individual)
    }
}

/// Desirability over the Vina scores of several receptors only.
pub struct CostMultiReceptorsOnlyVina {
    docking: Docking,
    receptors: Vec<(Receptor, VinaScoreType)>,
    desirability: Desirability,
    wt_cutoff: Option<f64>,
}

impl CostMultiReceptorsOnlyVina {
    pub fn new(
        toolkit: Arc<dyn ChemToolkit>,
        docking: DockingConfig,
        receptors: Vec<(Receptor, VinaScoreType)>,
        desirability: Option<Desirability>,
        wt_cutoff: Option<f64>,
    ) -> Result<Self, EngineError> {
        check_receptors(&receptors)?;
        let desirability =
            desirability.unwrap_or_else(Desirability::default_multi_receptor_only_vina);
        desirability.validate()?;
        check_score_types(Some(desirability.terms()), &receptors, "desirability")?;
        Ok(Self {
            docking: Docking::new(toolkit, docking)?,
            receptors,
            desirability,
            wt_cutoff,
        })
    }

    pub fn desirability(&self) -> &Desirability {
        &self.desirability
    }
}

impl CostFunction for CostMultiReceptorsOnlyVina {
    fn name(&self) -> &'static str {
        "CostMultiReceptorsOnlyVina"
    }

    fn evaluate(&self, mut individual: Individual, ctx: &EvalContext) -> Result<Individual, EngineError> {
        if self.docking.exceeds_weight(&mut individual, self.wt_cutoff)? {
            individual.vina_scores = vec![f64::INFINITY; self.receptors.len()];
            individual.pdbqts.clear();
            individual.cost = f64::INFINITY;
            return Ok(individual);
        }

        dock_all(&self.docking, &mut individual, &self.receptors, ctx)?;

        let mut mean = WeightedGeometricMean::new();
        for (score, (_, kind)) in individual.vina_scores.iter().zip(&self.receptors) {
            let term = self
                .desirability
                .term(kind.key())
                .ok_or_else(|| DesirabilityError::MissingProperty(kind.key().to_string()))?;
            mean.push_term(term, *score);
        }
        individual.cost = mean.cost()?;
        Ok(individual)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chem::testing::MockToolkit;
    use crate::core::desirability::{larger_the_best, smaller_the_best};
    use crate::engine::docking::tests::fake_vina_config;
    use tempfile::TempDir;

    fn receptor(dir: &Path, name: &str) -> Receptor {
        let path = dir.join(name);
        std::fs::write(&path, "RECEPTOR\n").unwrap();
        Receptor::new(path, [0.0; 3], [20.0; 3])
    }

    fn toolkit() -> Arc<MockToolkit> {
        Arc::new(MockToolkit::default())
    }

    #[test]
    fn cost_rejects_desirability_on_unknown_properties() {
        let dir = TempDir::new().unwrap();
        let desirability = Desirability::default_cost()
            .with_term("clearance", DesirabilityTerm::smaller_the_best(1.0, 5.0, 50.0));
        let result = Cost::new(
            toolkit(),
            DockingConfig::default(),
            receptor(dir.path(), "r.pdbqt"),
            Some(desirability.clone()),
        );
        assert!(matches!(
            result,
            Err(EngineError::Desirability(DesirabilityError::MissingProperty(ref p))) if p == "clearance"
        ));

        let mut models = ModelSet::new();
        models.insert("clearance".into(), "clearance.jlib".into());
        let with_models = Cost::new(
            toolkit(),
            DockingConfig::default(),
            receptor(dir.path(), "r.pdbqt"),
            Some(Desirability::default_cost()),
        )
        .unwrap()
        .with_models(toolkit(), models)
        .and_then(|cost| cost.with_desirability(desirability));
        assert!(with_models.is_ok());
    }

    #[test]
    fn multi_receptor_costs_require_matching_terms() {
        let dir = TempDir::new().unwrap();
        let receptors = vec![(receptor(dir.path(), "a.pdbqt"), VinaScoreType::Max)];
        let only_min = Desirability::new().with_term("min", DesirabilityTerm::smaller_the_best(1.0, -12.0, -6.0));
        assert!(
            CostMultiReceptorsOnlyVina::new(toolkit(), DockingConfig::default(), receptors.clone(), Some(only_min), None)
                .is_err()
        );
        assert!(CostMultiReceptors::new(toolkit(), DockingConfig::default(), vec![], None).is_err());
        assert!(CostMultiReceptors::new(toolkit(), DockingConfig::default(), receptors, None).is_ok());
    }

    #[test]
    fn weight_cutoff_skips_docking() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit();
        let cost = CostOnlyVina::new(
            tk.clone(),
            fake_vina_config(),
            receptor(dir.path(), "r.pdbqt"),
            Some(30.0),
        )
        .unwrap();
        let ctx = EvalContext {
            workdir: dir.path(),
            report_dir: dir.path(),
        };
        // The mock weighs 12 Da per SMILES character.
        let heavy = cost.evaluate(Individual::new("CCCC", 1), &ctx).unwrap();
        assert!(heavy.cost.is_infinite());
        assert_eq!(heavy.property(VINA_SCORE), Some(f64::INFINITY));
        assert_eq!(heavy.property(MOL_WT), Some(48.0));
        assert!(tk.prepared().is_empty());
    }

    #[test]
    fn lipinski_rejection_skips_docking() {
        let dir = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let tk = toolkit();
        let cost = Cost::new(
            tk.clone(),
            fake_vina_config(),
            receptor(dir.path(), "r.pdbqt"),
            None,
        )
        .unwrap()
        .with_lipinski_filter(Some(1));
        let ctx = EvalContext {
            workdir: workdir.path(),
            report_dir: dir.path(),
        };

        // 45 characters weigh 540 Da, one violation over the cutoff.
        let rejected = cost.evaluate(Individual::new("C".repeat(45), 5), &ctx).unwrap();

        assert!(rejected.cost.is_infinite());
        assert_eq!(rejected.property(VINA_SCORE), Some(f64::INFINITY));
        assert_eq!(rejected.property(MOL_WT), Some(540.0));
        assert!(rejected.pdbqt.is_none());
        assert!(tk.prepared().is_empty());
        assert_eq!(std::fs::read_dir(workdir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn ligand_preparation_failure_costs_infinity() {
        use crate::engine::evaluation::Evaluator;
        use crate::engine::progress::ProgressReporter;

        let dir = TempDir::new().unwrap();
        let tk = Arc::new(MockToolkit {
            fail_prepare_for: Some("CCO".into()),
            ..MockToolkit::default()
        });
        let cost = Cost::new(tk.clone(), fake_vina_config(), receptor(dir.path(), "r.pdbqt"), None).unwrap();
        let ctx = EvalContext {
            workdir: dir.path(),
            report_dir: dir.path(),
        };
        assert!(matches!(
            cost.evaluate(Individual::new("CCO", 1), &ctx),
            Err(EngineError::Toolkit(_))
        ));

        let evaluator = Evaluator::new(&cost, 1, dir.path()).unwrap();
        let out = evaluator.evaluate(
            vec![Individual::new("CCO", 1), Individual::new("CCN", 2)],
            &ProgressReporter::new(),
        );

        assert!(out[0].cost.is_infinite());
        assert_eq!(out[0].smiles, "CCO");
        assert!(out[1].cost.is_finite());
        assert_eq!(tk.prepared(), vec!["CCN".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn only_vina_cost_is_the_docking_score() {
        let dir = TempDir::new().unwrap();
        let cost = CostOnlyVina::new(toolkit(), fake_vina_config(), receptor(dir.path(), "r.pdbqt"), None)
            .unwrap();
        let ctx = EvalContext {
            workdir: dir.path(),
            report_dir: dir.path(),
        };
        let docked = cost.evaluate(Individual::new("CCO", 2), &ctx).unwrap();
        assert_eq!(docked.cost, -6.0);
        assert_eq!(docked.property(VINA_SCORE), Some(-6.0));
        assert!(docked.pdbqt.unwrap().contains("REMARK CCO"));
    }

    #[cfg(unix)]
    #[test]
    fn cost_combines_descriptors_and_docking() {
        let dir = TempDir::new().unwrap();
        let desirability = Desirability::default_cost()
            .with_term("vina_score", DesirabilityTerm::smaller_the_best(1.0, -12.0, 0.0));
        let cost = Cost::new(
            toolkit(),
            fake_vina_config(),
            receptor(dir.path(), "r.pdbqt"),
            Some(desirability),
        )
        .unwrap();
        let ctx = EvalContext {
            workdir: dir.path(),
            report_dir: dir.path(),
        };

        let evaluated = cost.evaluate(Individual::new("CCO", 3), &ctx).unwrap();

        let d_qed = larger_the_best(1.0 / 3.0, 0.1, 0.75, 1.0);
        let d_sa = smaller_the_best(2.0, 3.0, 7.0, 1.0);
        let d_vina = smaller_the_best(-6.0, -12.0, 0.0, 1.0);
        let expected = 1.0 - (d_qed * d_sa * d_vina).powf(1.0 / 3.0);
        assert!((evaluated.cost - expected).abs() < 1e-12);
        assert_eq!(evaluated.property(SA_SCORE), Some(2.0));
    }

    #[cfg(unix)]
    #[test]
    fn multi_receptor_cost_scores_every_receptor() {
        let dir = TempDir::new().unwrap();
        let receptors = vec![
            (receptor(dir.path(), "target.pdbqt"), VinaScoreType::Min),
            (receptor(dir.path(), "off.pdbqt"), VinaScoreType::Max),
        ];
        let desirability = Desirability::new()
            .with_term("min", DesirabilityTerm::smaller_the_best(1.0, -12.0, 0.0))
            .with_term("max", DesirabilityTerm::larger_the_best(1.0, -10.0, 0.0));
        let cost = CostMultiReceptorsOnlyVina::new(
            toolkit(),
            fake_vina_config(),
            receptors,
            Some(desirability),
            None,
        )
        .unwrap();
        let ctx = EvalContext {
            workdir: dir.path(),
            report_dir: dir.path(),
        };

        let evaluated = cost.evaluate(Individual::new("CCO", 4), &ctx).unwrap();

        assert_eq!(evaluated.vina_scores, vec![-6.0, -6.0]);
        assert_eq!(evaluated.pdbqts.len(), 2);
        let d_min = smaller_the_best(-6.0, -12.0, 0.0, 1.0);
        let d_max = larger_the_best(-6.0, -10.0, 0.0, 1.0);
        assert!((evaluated.cost - (1.0 - (d_min * d_max).sqrt())).abs() < 1e-12);
        assert!(dir.path().join("4_0.pdbqt").exists());
        assert!(dir.path().join("4_1.pdbqt").exists());
    }
}
