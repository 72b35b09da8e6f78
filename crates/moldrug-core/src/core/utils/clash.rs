use nalgebra::Point3;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClashError {
    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Invalid coordinate on line {line}: '{value}'")]
    InvalidCoordinate { line: usize, value: String },
    #[error("The clash distance must be positive, got {0}")]
    InvalidDistance(f64),
}

type Cell = (i64, i64, i64);

/// Detects ligand poses that overlap a protein.
///
/// Protein atoms are binned on a cubic grid whose spacing equals the clash
/// distance, so a query only inspects the 27 cells around each ligand atom.
#[derive(Debug, Clone)]
pub struct ClashFilter {
    distance: f64,
    cells: HashMap<Cell, Vec<Point3<f64>>>,
    atom_count: usize,
}

impl ClashFilter {
    pub fn new(protein_atoms: &[Point3<f64>], distance: f64) -> Result<Self, ClashError> {
        if !(distance > 0.0 && distance.is_finite()) {
            return Err(ClashError::InvalidDistance(distance));
        }
        let mut cells: HashMap<Cell, Vec<Point3<f64>>> = HashMap::new();
        for atom in protein_atoms {
            cells.entry(cell_of(atom, distance)).or_default().push(*atom);
        }
        Ok(Self {
            distance,
            cells,
            atom_count: protein_atoms.len(),
        })
    }

    /// Builds the filter from every ATOM/HETATM record of a PDB file.
    pub fn from_pdb_path(path: &Path, distance: f64) -> Result<Self, ClashError> {
        let content = std::fs::read_to_string(path).map_err(|e| ClashError::Io {
            path: path.to_string_lossy().to_string(),
            source: e,
        })?;
        let atoms = read_coordinates(&content, true)?;
        Self::new(&atoms, distance)
    }

    pub fn atom_count(&self) -> usize {
        self.atom_count
    }

    /// Whether any of `points` lies within the clash distance of a protein atom.
    pub fn clashes(&self, points: &[Point3<f64>]) -> bool {
        let cutoff_sq = self.distance * self.distance;
        points.iter().any(|p| {
            let (cx, cy, cz) = cell_of(p, self.distance);
            (-1..=1).any(|dx| {
                (-1..=1).any(|dy| {
                    (-1..=1).any(|dz| {
                        self.cells
                            .get(&(cx + dx, cy + dy, cz + dz))
                            .is_some_and(|atoms| {
                                atoms.iter().any(|a| (a - p).norm_squared() <= cutoff_sq)
                            })
                    })
                })
            })
        })
    }

    /// Whether the heavy atoms of a PDB/PDBQT pose clash with the protein.
    pub fn pose_clashes(&self, pose: &str) -> Result<bool, ClashError> {
        Ok(self.clashes(&read_coordinates(pose, false)?))
    }
}

fn cell_of(p: &Point3<f64>, size: f64) -> Cell {
    (
        (p.x / size).floor() as i64,
        (p.y / size).floor() as i64,
        (p.z / size).floor() as i64,
    )
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn is_hydrogen(line: &str) -> bool {
    // AutoDock type (PDBQT) first, then the PDB element column, then the atom name.
    let kind = slice_and_trim(line, 77, 79);
    let kind = if kind.is_empty() {
        slice_and_trim(line, 76, 78)
    } else {
        kind
    };
    if !kind.is_empty() {
        return matches!(kind, "H" | "HD" | "HS");
    }
    slice_and_trim(line, 12, 16)
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .starts_with('H')
}

/// Coordinates (columns 31-54) of the ATOM/HETATM records in `text`.
pub fn read_coordinates(text: &str, include_hydrogens: bool) -> Result<Vec<Point3<f64>>, ClashError> {
    let mut points = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if !(line.starts_with("ATOM") || line.starts_with("HETATM")) {
            continue;
        }
        if !include_hydrogens && is_hydrogen(line) {
            continue;
        }
        let mut xyz = [0.0; 3];
        for (k, (start, end)) in [(30, 38), (38, 46), (46, 54)].into_iter().enumerate() {
            let field = slice_and_trim(line, start, end);
            xyz[k] = field.parse().map_err(|_| ClashError::InvalidCoordinate {
                line: i + 1,
                value: field.to_string(),
            })?;
        }
        points.push(Point3::new(xyz[0], xyz[1], xyz[2]));
    }
    Ok(points)
}
