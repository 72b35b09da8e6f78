use crate::cli::DesirabilityArgs;
use crate::config::ConfigFile;
use crate::error::{CliError, Result};
use crate::utils::parser;
use moldrug::core::desirability::{Desirability, WeightedGeometricMean};
use moldrug::engine::error::EngineError;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Individual desirabilities and their combination for one set of responses.
#[derive(Debug, Clone, PartialEq)]
struct Report {
    terms: Vec<(String, f64, f64)>,
    desirability: f64,
    cost: f64,
}

pub async fn run(args: DesirabilityArgs) -> Result<()> {
    let config_file = ConfigFile::from_file(&args.config)?;
    let stage_name = match &args.stage {
        Some(name) => name.clone(),
        None => config_file
            .stage_names()
            .next()
            .map(str::to_string)
            .ok_or_else(|| CliError::Config("The configuration defines no stage.".to_string()))?,
    };
    let stage = config_file
        .resolve(None, Path::new("."))?
        .into_iter()
        .find(|s| s.name == stage_name)
        .ok_or_else(|| CliError::Argument(format!("No stage named '{stage_name}'")))?;
    let desirability = stage.desirability.as_ref().ok_or_else(|| {
        CliError::Argument(format!(
            "Stage '{}' uses {}, which has no desirability",
            stage.name,
            stage.cost.name()
        ))
    })?;
    info!(stage = %stage.name, costfunc = stage.cost.name(), "Evaluating desirability.");

    let report = evaluate(desirability, &args.values)?;
    for (name, value, d) in &report.terms {
        println!("  {name:<24} {value:>10.4}  d = {d:.4}");
    }
    println!("D    = {:.6}", report.desirability);
    println!("cost = {:.6}", report.cost);
    Ok(())
}

/// `name=value` feeds a top-level term, `section.key=value` one term of a section
/// and may be repeated, once per receptor.
fn evaluate(desirability: &Desirability, values: &[String]) -> Result<Report> {
    let mut top_level = BTreeMap::new();
    let mut section_values = Vec::new();
    for assignment in values {
        let (name, value) =
            parser::parse_value_assignment(assignment).map_err(|e| CliError::Argument(e.to_string()))?;
        match name.split_once('.') {
            Some((section, key)) => section_values.push((section.to_string(), key.to_string(), value)),
            None => {
                top_level.insert(name, value);
            }
        }
    }

    let mut mean = WeightedGeometricMean::new();
    desirability
        .accumulate(&mut mean, |name| top_level.get(name).copied())
        .map_err(EngineError::from)?;
    let mut terms: Vec<_> = desirability
        .terms()
        .iter()
        .map(|(name, term)| {
            let value = top_level[name];
            (name.clone(), value, term.evaluate(value))
        })
        .collect();

    for (section, key, value) in section_values {
        let term = desirability
            .section(&section)
            .and_then(|terms| terms.get(&key))
            .ok_or_else(|| CliError::Argument(format!("Unknown desirability term '{section}.{key}'")))?;
        mean.push_term(term, value);
        terms.push((format!("{section}.{key}"), value, term.evaluate(value)));
    }

    Ok(Report {
        terms,
        desirability: mean.desirability().map_err(EngineError::from)?,
        cost: mean.cost().map_err(EngineError::from)?,
    })
}
