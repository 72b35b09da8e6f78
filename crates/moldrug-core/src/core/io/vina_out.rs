use std::fs;
use std::io::{self, BufRead};
use std::path::Path;
use thiserror::Error;

const RESULT_TAG: &str = "REMARK VINA RESULT:";

#[derive(Debug, Error)]
pub enum VinaOutputError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Model {0} has no 'REMARK VINA RESULT' record")]
    MissingResult(usize),
    #[error("The Vina output contains no models")]
    Empty,
    #[error("No 'Affinity' line found in the Vina output")]
    MissingAffinity,
}

/// One docked pose of a Vina result file.
#[derive(Debug, Clone, PartialEq)]
pub struct VinaModel {
    /// 1-based model number, in file order.
    pub number: usize,
    /// Binding affinity in kcal/mol.
    pub affinity: f64,
    pub rmsd_lb: f64,
    pub rmsd_ub: f64,
    /// The PDBQT text of the pose, without the `MODEL`/`ENDMDL` records.
    pub chunk: String,
}

/// A parsed `--out` file of AutoDock Vina.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VinaOutput {
    pub models: Vec<VinaModel>,
}

impl VinaOutput {
    pub fn read_from(reader: &mut impl BufRead) -> Result<Self, VinaOutputError> {
        let mut models = Vec::new();
        let mut current: Option<PartialModel> = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_num = i + 1;

            if line.starts_with("MODEL") {
                flush(current.take(), &mut models)?;
                current = Some(PartialModel::new(models.len() + 1));
                continue;
            }
            if line.starts_with("ENDMDL") {
                flush(current.take(), &mut models)?;
                continue;
            }

            // A file without MODEL records holds a single pose.
            let open = current.get_or_insert_with(|| PartialModel::new(models.len() + 1));
            if let Some(rest) = line.strip_prefix(RESULT_TAG) {
                open.result = Some(parse_result(rest, line_num)?);
            }
            open.chunk.push_str(&line);
            open.chunk.push('\n');
        }

        flush(current, &mut models)?;
        Ok(Self { models })
    }

    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, VinaOutputError> {
        let file = fs::File::open(path)?;
        Self::read_from(&mut io::BufReader::new(file))
    }

    /// The pose with the lowest affinity. Ties keep the earlier model.
    pub fn best_pose(&self) -> Result<&VinaModel, VinaOutputError> {
        self.models
            .iter()
            .reduce(|best, m| if m.affinity < best.affinity { m } else { best })
            .ok_or(VinaOutputError::Empty)
    }
}

struct PartialModel {
    number: usize,
    result: Option<(f64, f64, f64)>,
    chunk: String,
}

impl PartialModel {
    fn new(number: usize) -> Self {
        Self {
            number,
            result: None,
            chunk: String::new(),
        }
    }

    fn finish(self) -> Result<VinaModel, VinaOutputError> {
        let (affinity, rmsd_lb, rmsd_ub) = self
            .result
            .ok_or(VinaOutputError::MissingResult(self.number))?;
        Ok(VinaModel {
            number: self.number,
            affinity,
            rmsd_lb,
            rmsd_ub,
            chunk: self.chunk,
        })
    }
}

// Blank filler between models is not a pose.
fn flush(open: Option<PartialModel>, models: &mut Vec<VinaModel>) -> Result<(), VinaOutputError> {
    match open {
        Some(open) if open.result.is_some() || !open.chunk.trim().is_empty() => {
            models.push(open.finish()?);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn parse_result(rest: &str, line: usize) -> Result<(f64, f64, f64), VinaOutputError> {
    let values: Vec<f64> = rest
        .split_whitespace()
        .take(3)
        .map(str::parse)
        .collect::<Result<_, _>>()
        .map_err(|e| VinaOutputError::Parse {
            line,
            message: format!("invalid VINA RESULT value: {e}"),
        })?;
    match values.as_slice() {
        [affinity, lb, ub] => Ok((*affinity, *lb, *ub)),
        [affinity] => Ok((*affinity, 0.0, 0.0)),
        _ => Err(VinaOutputError::Parse {
            line,
            message: "VINA RESULT record without an affinity".to_string(),
        }),
    }
}

/// Reads the affinity from the standard output of a `--score_only` or
/// `--local_only` run (`Affinity: -7.12345 (kcal/mol)`).
pub fn parse_affinity_stdout(stdout: &str) -> Result<f64, VinaOutputError> {
    for (i, line) in stdout.lines().enumerate() {
        let Some(rest) = line.trim_start().strip_prefix("Affinity") else {
            continue;
        };
        let value = rest
            .trim_start_matches(':')
            .split_whitespace()
            .next()
            .ok_or(VinaOutputError::MissingAffinity)?;
        return value.parse().map_err(|e| VinaOutputError::Parse {
            line: i + 1,
            message: format!("invalid affinity '{value}': {e}"),
        });
    }
    Err(VinaOutputError::MissingAffinity)
}
