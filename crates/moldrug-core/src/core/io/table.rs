use crate::core::models::individual::Individual;
use itertools::Itertools;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("CSV writing error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },
    #[error("CSV writing error: {0}")]
    Stream(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes one row per individual: `idx`, `smiles`, `cost`, one column per property
/// (the union over the population, sorted by name) and `vina_scores` joined by `;`.
///
/// Poses are not part of the table. Missing properties are left empty.
pub fn write_population<W: Write>(
    individuals: &[Individual],
    writer: W,
) -> Result<(), TableError> {
    let columns: BTreeSet<&str> = individuals
        .iter()
        .flat_map(|i| i.properties.keys().map(String::as_str))
        .collect();
    let with_scores = individuals.iter().any(|i| !i.vina_scores.is_empty());

    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec!["idx", "smiles", "cost"];
    header.extend(columns.iter().copied());
    if with_scores {
        header.push("vina_scores");
    }
    csv.write_record(&header)?;

    for individual in individuals {
        let mut record = vec![
            individual.idx.to_string(),
            individual.smiles.clone(),
            individual.cost.to_string(),
        ];
        record.extend(columns.iter().map(|name| {
            individual
                .property(name)
                .map(|v| v.to_string())
                .unwrap_or_default()
        }));
        if with_scores {
            record.push(individual.vina_scores.iter().join(";"));
        }
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn write_population_to_path(
    individuals: &[Individual],
    path: &Path,
) -> Result<(), TableError> {
    let file = std::fs::File::create(path)?;
    write_population(individuals, file).map_err(|e| match e {
        TableError::Stream(source) => TableError::Csv {
            path: path.to_string_lossy().to_string(),
            source,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Individual> {
        let mut a = Individual::new("CCO", 0);
        a.cost = 0.5;
        a.set_property("qed", 0.3);
        a.set_property("vina_score", -6.0);
        let mut b = Individual::new("CCN", 7);
        b.set_property("sa_score", 2.5);
        vec![a, b]
    }

    #[test]
    fn header_holds_the_union_of_properties() {
        let mut out = Vec::new();
        write_population(&sample(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "idx,smiles,cost,qed,sa_score,vina_score"
        );
        assert_eq!(lines.next().unwrap(), "0,CCO,0.5,0.3,,-6");
        assert_eq!(lines.next().unwrap(), "7,CCN,inf,,2.5,");
        assert!(lines.next().is_none());
    }

    #[test]
    fn multi_receptor_scores_are_joined() {
        let mut i = Individual::new("CCO", 1);
        i.cost = 0.1;
        i.vina_scores = vec![-8.0, -2.5];
        let mut out = Vec::new();
        write_population(&[i], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("idx,smiles,cost,vina_scores\n"));
        assert!(text.contains("1,CCO,0.1,-8;-2.5"));
    }

    #[test]
    fn table_is_written_to_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.csv");
        write_population_to_path(&sample(), &path).unwrap();
        let rows = std::fs::read_to_string(&path).unwrap();
        assert_eq!(rows.lines().count(), 3);
    }
}
