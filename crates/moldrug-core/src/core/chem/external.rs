use super::{
    ChemToolkit, Descriptors, GrowParams, ModelSet, MutationParams, PropertyPredictor, ToolkitError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::trace;

/// A toolkit backed by a helper program.
///
/// Each operation launches `program args… <operation>`, writes one JSON request to
/// its standard input and reads one JSON response from its standard output. A
/// response of the form `{"error": "..."}` reports a failure of the operation.
///
/// | operation                | request fields                                        | response              |
/// |--------------------------|-------------------------------------------------------|-----------------------|
/// | `grow`                   | `smiles`, `crem_db_path`, grow parameters              | `{"smiles": [...]}`   |
/// | `mutate`                 | `smiles`, `crem_db_path`, mutation parameters          | `{"smiles": [...]}`   |
/// | `prepare`                | `smiles`                                              | `{"pdbqt": "..."}`    |
/// | `descriptors`            | `smiles`                                              | descriptor fields     |
/// | `similarity`             | `reference`, `candidates`                             | `{"similarities": []}`|
/// | `constrained_conformers` | `smiles`, `reference_path`, `num_conf`, `minimum_conf_rms` | `{"conformers": []}` |
/// | `predict`                | `smiles`, `models` (name → path)                      | `{"predictions": {}}` |
#[derive(Debug, Clone)]
pub struct ExternalToolkit {
    program: PathBuf,
    args: Vec<String>,
    crem_db_path: PathBuf,
}

#[derive(Serialize)]
struct CremRequest<'a, P: Serialize> {
    smiles: &'a str,
    crem_db_path: &'a Path,
    #[serde(flatten)]
    params: &'a P,
}

#[derive(Serialize)]
struct SmilesRequest<'a> {
    smiles: &'a str,
}

#[derive(Serialize)]
struct SimilarityRequest<'a> {
    reference: &'a str,
    candidates: &'a [String],
}

#[derive(Serialize)]
struct ConformerRequest<'a> {
    smiles: &'a str,
    reference_path: &'a Path,
    num_conf: usize,
    minimum_conf_rms: f64,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    smiles: &'a str,
    models: &'a ModelSet,
}

#[derive(Deserialize)]
struct SmilesList {
    smiles: Vec<String>,
}

#[derive(Deserialize)]
struct Prepared {
    pdbqt: String,
}

#[derive(Deserialize)]
struct Similarities {
    similarities: Vec<f64>,
}

#[derive(Deserialize)]
struct Conformers {
    conformers: Vec<String>,
}

#[derive(Deserialize)]
struct Predictions {
    predictions: BTreeMap<String, f64>,
}

impl ExternalToolkit {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, crem_db_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            crem_db_path: crem_db_path.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn crem_db_path(&self) -> &Path {
        &self.crem_db_path
    }

    fn call<Req, Resp>(&self, operation: &str, request: &Req) -> Result<Resp, ToolkitError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let protocol = |message: String| ToolkitError::Protocol {
            operation: operation.to_string(),
            message,
        };
        let payload = serde_json::to_vec(request).map_err(|e| protocol(e.to_string()))?;

        trace!(operation, program = %self.program.display(), "Calling toolkit");
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ToolkitError::Spawn {
                program: self.program.to_string_lossy().to_string(),
                source: e,
            })?;

        // The helper may exit before reading its request; it is still reaped and
        // its exit status takes precedence over the broken pipe.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&payload),
            None => Ok(()),
        };
        let output = child.wait_with_output()?;

        if !output.status.success() {
            return Err(ToolkitError::Exit {
                operation: operation.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;

        let value: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| protocol(e.to_string()))?;
        if let Some(message) = value.get("error") {
            return Err(ToolkitError::Reported {
                operation: operation.to_string(),
                message: message
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.to_string()),
            });
        }
        serde_json::from_value(value).map_err(|e| protocol(e.to_string()))
    }
}

impl ChemToolkit for ExternalToolkit {
    fn grow(&self, smiles: &str, params: &GrowParams) -> Result<Vec<String>, ToolkitError> {
        let request = CremRequest {
            smiles,
            crem_db_path: &self.crem_db_path,
            params,
        };
        Ok(self.call::<_, SmilesList>("grow", &request)?.smiles)
    }

    fn mutate(&self, smiles: &str, params: &MutationParams) -> Result<Vec<String>, ToolkitError> {
        let request = CremRequest {
            smiles,
            crem_db_path: &self.crem_db_path,
            params,
        };
        Ok(self.call::<_, SmilesList>("mutate", &request)?.smiles)
    }

    fn prepare_ligand(&self, smiles: &str) -> Result<String, ToolkitError> {
        Ok(self.call::<_, Prepared>("prepare", &SmilesRequest { smiles })?.pdbqt)
    }

    fn descriptors(&self, smiles: &str) -> Result<Descriptors, ToolkitError> {
        self.call("descriptors", &SmilesRequest { smiles })
    }

    fn similarities(&self, reference: &str, candidates: &[String]) -> Result<Vec<f64>, ToolkitError> {
        let response: Similarities = self.call(
            "similarity",
            &SimilarityRequest {
                reference,
                candidates,
            },
        )?;
        if response.similarities.len() != candidates.len() {
            return Err(ToolkitError::Protocol {
                operation: "similarity".to_string(),
                message: format!(
                    "expected {} similarities, got {}",
                    candidates.len(),
                    response.similarities.len()
                ),
            });
        }
        Ok(response.similarities)
    }

    fn constrained_conformers(
        &self,
        smiles: &str,
        reference_path: &Path,
        num_conf: usize,
        minimum_conf_rms: f64,
    ) -> Result<Vec<String>, ToolkitError> {
        let request = ConformerRequest {
            smiles,
            reference_path,
            num_conf,
            minimum_conf_rms,
        };
        Ok(self
            .call::<_, Conformers>("constrained_conformers", &request)?
            .conformers)
    }
}

impl PropertyPredictor for ExternalToolkit {
    fn predict(&self, smiles: &str, models: &ModelSet) -> Result<BTreeMap<String, f64>, ToolkitError> {
        let response: Predictions = self.call("predict", &PredictRequest { smiles, models })?;
        if let Some(missing) = models.keys().find(|k| !response.predictions.contains_key(*k)) {
            return Err(ToolkitError::Protocol {
                operation: "predict".to_string(),
                message: format!("no prediction returned for model '{missing}'"),
            });
        }
        Ok(response.predictions)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    // The helper echoes canned responses per operation and records each request.
    fn helper(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("helper.sh");
        let script = format!("op=\"$1\"\ncat > \"{}/request_$op.json\"\n{body}\n", dir.path().display());
        fs::write(&path, script).unwrap();
        path
    }

    fn toolkit(dir: &TempDir, body: &str) -> ExternalToolkit {
        let script = helper(dir, body).to_string_lossy().to_string();
        ExternalToolkit::new("sh", vec![script], "/data/crem.db")
    }

    #[test]
    fn grow_sends_the_database_and_parameters() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, r#"echo '{"smiles": ["CCO", "CCN"]}'"#);

        let grown = tk.grow("CC", &GrowParams::default()).unwrap();
        assert_eq!(grown, vec!["CCO", "CCN"]);

        let request: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("request_grow.json")).unwrap())
                .unwrap();
        assert_eq!(request["smiles"], "CC");
        assert_eq!(request["crem_db_path"], "/data/crem.db");
        assert_eq!(request["radius"], 3);
        assert_eq!(request["max_atoms"], 4);
    }

    #[test]
    fn descriptors_are_decoded() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(
            &dir,
            r#"echo '{"qed": 0.6, "sa_score": 2.1, "mol_wt": 215.2, "num_h_acceptors": 4, "num_h_donors": 1, "logp": 0.9, "num_rotatable_bonds": 2, "tpsa": 85.0}'"#,
        );
        let d = tk.descriptors("COC(=O)c1ccc(S(N)(=O)=O)cc1").unwrap();
        assert_eq!(d.qed, 0.6);
        assert_eq!(d.num_h_acceptors, 4);
    }

    #[test]
    fn reported_errors_become_toolkit_errors() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, r#"echo '{"error": "invalid SMILES"}'"#);
        let err = tk.prepare_ligand("not-a-smiles").unwrap_err();
        assert!(matches!(err, ToolkitError::Reported { ref message, .. } if message == "invalid SMILES"));
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, "echo 'rdkit exploded' >&2\nexit 3");
        let err = tk.mutate("CC", &MutationParams::default()).unwrap_err();
        match err {
            ToolkitError::Exit { stderr, operation, .. } => {
                assert_eq!(operation, "mutate");
                assert_eq!(stderr, "rdkit exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn helper_exiting_before_reading_reports_its_stderr() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("early_exit.sh");
        fs::write(&script, "echo 'model file missing' >&2\nexit 2\n").unwrap();
        let tk = ExternalToolkit::new("sh", vec![script.to_string_lossy().to_string()], "db");
        // Larger than a pipe buffer, so the write hits a closed pipe.
        let candidates: Vec<String> = (0..20_000).map(|i| format!("C{i:08}")).collect();

        match tk.similarities("CC", &candidates).unwrap_err() {
            ToolkitError::Exit { operation, stderr, .. } => {
                assert_eq!(operation, "similarity");
                assert_eq!(stderr, "model file missing");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_output_is_a_protocol_error() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, "echo 'not json'");
        assert!(matches!(
            tk.similarities("CC", &["CCO".to_string()]),
            Err(ToolkitError::Protocol { .. })
        ));
    }

    #[test]
    fn similarity_count_must_match_the_candidates() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, r#"echo '{"similarities": [0.5]}'"#);
        let candidates = vec!["CCO".to_string(), "CCN".to_string()];
        assert!(matches!(
            tk.similarities("CC", &candidates),
            Err(ToolkitError::Protocol { .. })
        ));
    }

    #[test]
    fn predictions_must_cover_every_model() {
        let dir = TempDir::new().unwrap();
        let tk = toolkit(&dir, r#"echo '{"predictions": {"clearance": 12.5}}'"#);
        let mut models = ModelSet::new();
        models.insert("clearance".into(), "clearance.jlib".into());
        assert_eq!(tk.predict("CC", &models).unwrap()["clearance"], 12.5);

        models.insert("hppb".into(), "hppb.jlib".into());
        assert!(tk.predict("CC", &models).is_err());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let tk = ExternalToolkit::new("/nonexistent/helper", vec![], "db");
        assert!(matches!(
            tk.prepare_ligand("CC"),
            Err(ToolkitError::Spawn { .. })
        ));
    }
}
