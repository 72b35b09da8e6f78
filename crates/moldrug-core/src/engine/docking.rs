use super::config::{ConstraintConfig, ConstraintKind, DockingConfig, Receptor};
use crate::core::chem::{ChemToolkit, ToolkitError};
use crate::core::io::checkpoint::{self, CheckpointError};
use crate::core::io::vina_out::{self, VinaOutput, VinaOutputError};
use crate::core::models::individual::Individual;
use crate::core::utils::clash::{ClashError, ClashFilter};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, trace, warn};

#[derive(Debug, Error)]
pub enum DockingError {
    #[error("Failed to launch Vina executable '{program}': {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Vina exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Invalid Vina output: {0}")]
    Output(#[from] VinaOutputError),
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Conformer generation failed: {0}")]
    Toolkit(#[from] ToolkitError),
    #[error("Clash filter error: {0}")]
    Clash(#[from] ClashError),
    #[error("Failed to write the error report: {0}")]
    Report(#[from] CheckpointError),
}

impl DockingError {
    /// Whether the Vina process itself failed, as opposed to the surrounding I/O.
    fn is_vina_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::Failed { .. })
    }
}

/// Best score and pose of a docking job. A failed Vina run scores `+inf`.
#[derive(Debug, Clone, PartialEq)]
pub struct DockingOutcome {
    pub score: f64,
    pub pdbqt: String,
}

impl DockingOutcome {
    fn failed(pdbqt: impl Into<String>) -> Self {
        Self {
            score: f64::INFINITY,
            pdbqt: pdbqt.into(),
        }
    }
}

/// One ligand against one receptor.
pub struct DockingJob<'a> {
    pub individual: &'a Individual,
    pub ligand_pdbqt: &'a str,
    pub receptor: &'a Receptor,
    /// File stem of every file written for the job, unique within `workdir`.
    pub label: String,
    pub workdir: &'a Path,
    /// Where error reports of failed Vina runs are written.
    pub report_dir: &'a Path,
}

#[derive(Serialize)]
struct ErrorReport<'a> {
    error: String,
    individual: &'a Individual,
    receptor_path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    receptor: Option<String>,
    boxcenter: [f64; 3],
    boxsize: [f64; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    conformer: Option<usize>,
    ligand_pdbqt: &'a str,
}

/// Runs AutoDock Vina for free and constrained docking.
pub struct VinaRunner {
    config: DockingConfig,
    clash_filters: Mutex<HashMap<PathBuf, Arc<ClashFilter>>>,
}

impl VinaRunner {
    pub fn new(config: DockingConfig) -> Self {
        Self {
            config,
            clash_filters: Mutex::new(HashMap::new()),
        }
    }

    /// Arguments shared by every Vina invocation against `receptor`.
    pub fn command_args(&self, receptor: &Receptor) -> Vec<String> {
        let [cx, cy, cz] = receptor.boxcenter;
        let [sx, sy, sz] = receptor.boxsize;
        let receptor_path = receptor.pdbqt_path.to_string_lossy().to_string();
        [
            ("--receptor", receptor_path),
            ("--center_x", cx.to_string()),
            ("--center_y", cy.to_string()),
            ("--center_z", cz.to_string()),
            ("--size_x", sx.to_string()),
            ("--size_y", sy.to_string()),
            ("--size_z", sz.to_string()),
            ("--cpu", self.config.ncores.to_string()),
            ("--exhaustiveness", self.config.exhaustiveness.to_string()),
            ("--num_modes", self.config.num_modes.to_string()),
        ]
        .into_iter()
        .flat_map(|(flag, value)| [flag.to_string(), value])
        .collect()
    }

    /// Docks the job's ligand; constrained when the receptor carries a constraint.
    ///
    /// A failing Vina process is not an error: a report is written to the job's
    /// report directory and the outcome scores `+inf`.
    pub fn dock(&self, job: &DockingJob, toolkit: &dyn ChemToolkit) -> Result<DockingOutcome, DockingError> {
        match &job.receptor.constraint {
            Some(constraint) => self.dock_constrained(job, constraint, toolkit),
            None => self.dock_free(job),
        }
    }

    fn dock_free(&self, job: &DockingJob) -> Result<DockingOutcome, DockingError> {
        let ligand_path = job.workdir.join(format!("{}.pdbqt", job.label));
        let out_path = job.workdir.join(format!("{}_out.pdbqt", job.label));
        write_file(&ligand_path, job.ligand_pdbqt)?;

        let mut args = self.command_args(job.receptor);
        args.extend(path_arg("--ligand", &ligand_path));
        args.extend(path_arg("--out", &out_path));

        if let Err(e) = self.execute(&args) {
            return self.recover(job, e, None, job.ligand_pdbqt);
        }

        let output = VinaOutput::read_from_path(&out_path)?;
        let best = output.best_pose()?;
        debug!(label = %job.label, score = best.affinity, "Docking finished");
        Ok(DockingOutcome {
            score: best.affinity,
            pdbqt: best.chunk.clone(),
        })
    }

    fn dock_constrained(
        &self,
        job: &DockingJob,
        constraint: &ConstraintConfig,
        toolkit: &dyn ChemToolkit,
    ) -> Result<DockingOutcome, DockingError> {
        let conformers = toolkit.constrained_conformers(
            &job.individual.smiles,
            &constraint.reference_path,
            constraint.num_conf,
            constraint.minimum_conf_rms,
        )?;
        let filter = self.clash_filter(&constraint.receptor_pdb_path, constraint.clash_distance)?;

        let mut kept = Vec::with_capacity(conformers.len());
        for (i, conformer) in conformers.into_iter().enumerate() {
            if !filter.pose_clashes(&conformer)? {
                kept.push((i, conformer));
            }
        }
        trace!(label = %job.label, kept = kept.len(), "Conformers surviving the clash filter");

        let mut best = DockingOutcome::failed(job.ligand_pdbqt);
        if kept.is_empty() {
            warn!(
                idx = job.individual.idx,
                smiles = %job.individual.smiles,
                "Every constrained conformer clashes with the receptor"
            );
            return Ok(best);
        }

        for (i, conformer) in &kept {
            let ligand_path = job.workdir.join(format!("{}_conf_{i}.pdbqt", job.label));
            let out_path = job.workdir.join(format!("{}_conf_{i}_out.pdbqt", job.label));
            write_file(&ligand_path, conformer)?;

            let mut args = self.command_args(job.receptor);
            args.push(constraint.kind.flag().to_string());
            args.extend(path_arg("--ligand", &ligand_path));
            if constraint.kind == ConstraintKind::LocalOnly {
                args.extend(path_arg("--out", &out_path));
            }

            let stdout = match self.execute(&args) {
                Ok(stdout) => stdout,
                Err(e) => return self.recover(job, e, Some(*i), conformer),
            };

            let score = vina_out::parse_affinity_stdout(&stdout)?;
            if score < best.score {
                let pdbqt = match constraint.kind {
                    ConstraintKind::LocalOnly => {
                        VinaOutput::read_from_path(&out_path)?.best_pose()?.chunk.clone()
                    }
                    ConstraintKind::ScoreOnly => conformer.clone(),
                };
                best = DockingOutcome { score, pdbqt };
            }
        }

        debug!(label = %job.label, kind = %constraint.kind, score = best.score, "Constrained docking finished");
        Ok(best)
    }

    fn execute(&self, args: &[String]) -> Result<String, DockingError> {
        trace!(program = %self.config.vina_executable.display(), ?args, "Running Vina");
        let output = Command::new(&self.config.vina_executable)
            .args(args)
            .output()
            .map_err(|e| DockingError::Spawn {
                program: self.config.vina_executable.to_string_lossy().to_string(),
                source: e,
            })?;
        if !output.status.success() {
            return Err(DockingError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Turns a Vina process failure into an infinite score plus an error report.
    fn recover(
        &self,
        job: &DockingJob,
        error: DockingError,
        conformer: Option<usize>,
        ligand_pdbqt: &str,
    ) -> Result<DockingOutcome, DockingError> {
        if !error.is_vina_failure() {
            return Err(error);
        }

        let stem = match conformer {
            Some(i) => format!("{}_conf_{i}_error", job.label),
            None => format!("{}_error", job.label),
        };
        let report_path = job
            .report_dir
            .join(format!("{stem}.{}", checkpoint::EXTENSION));
        let report = ErrorReport {
            error: error.to_string(),
            individual: job.individual,
            receptor_path: &job.receptor.pdbqt_path,
            receptor: std::fs::read_to_string(&job.receptor.pdbqt_path).ok(),
            boxcenter: job.receptor.boxcenter,
            boxsize: job.receptor.boxsize,
            conformer,
            ligand_pdbqt,
        };
        if let Err(e) = checkpoint::save(&report, &report_path) {
            warn!(error = %e, "Could not write the docking error report");
        }

        warn!(
            idx = job.individual.idx,
            smiles = %job.individual.smiles,
            report = %report_path.display(),
            "Vina failed ({error}). The individual gets an infinite docking score; the report holds the individual, the receptor and the box definition"
        );
        Ok(DockingOutcome::failed(ligand_pdbqt))
    }

    fn clash_filter(&self, path: &Path, distance: f64) -> Result<Arc<ClashFilter>, DockingError> {
        if let Ok(cache) = self.clash_filters.lock() {
            if let Some(filter) = cache.get(path) {
                return Ok(filter.clone());
            }
        }
        let filter = Arc::new(ClashFilter::from_pdb_path(path, distance)?);
        debug!(path = %path.display(), atoms = filter.atom_count(), "Loaded receptor for the clash filter");
        if let Ok(mut cache) = self.clash_filters.lock() {
            cache.insert(path.to_path_buf(), filter.clone());
        }
        Ok(filter)
    }
}

fn path_arg(flag: &str, path: &Path) -> [String; 2] {
    [flag.to_string(), path.to_string_lossy().to_string()]
}

fn write_file(path: &Path, content: &str) -> Result<(), DockingError> {
    std::fs::write(path, content).map_err(|e| DockingError::Io {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}
