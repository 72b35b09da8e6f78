//! Derringer-Suich desirability functions and their weighted geometric mean.
//!
//! Every response of a candidate (docking score, QED, synthetic accessibility,
//! predicted ADMET properties, ...) is mapped onto a desirability in `[0, 1]` by one
//! of three curves, and the individual desirabilities are combined as
//!
//! ```text
//! D = (d1^w1 * d2^w2 * ... * dn^wn)^(1 / (w1 + w2 + ... + wn))
//! ```
//!
//! The optimizer minimizes `1 - D`. Configuration files use the historical key
//! names (`w`, `LargerTheBest`, `LowerLimit`, `Target`, `UpperLimit`, `r`, `r1`,
//! `r2`), which is why the serde representation is translated by hand.
//!
//! Reference: Derringer & Suich (1980); doi:10.1016/j.chemolab.2011.04.004.

use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DesirabilityError {
    #[error(
        "Non implemented key '{key}' for the desirability of '{variable}'. Only 'w' and one of LargerTheBest, SmallerTheBest, NominalTheBest are allowed"
    )]
    UnknownKey { variable: String, key: String },

    #[error("The desirability of '{variable}' must define exactly one function, found {found}")]
    FunctionCount { variable: String, found: usize },

    #[error("{function} for '{variable}' is missing the parameter '{parameter}'")]
    MissingParameter {
        variable: String,
        function: &'static str,
        parameter: &'static str,
    },

    #[error("{function} for '{variable}' has degenerate limits: {detail}")]
    DegenerateLimits {
        variable: String,
        function: &'static str,
        detail: String,
    },

    #[error("Invalid weight {weight} for '{variable}': weights must be finite and non-negative")]
    InvalidWeight { variable: String, weight: f64 },

    #[error("The sum of the desirability weights must be positive")]
    ZeroTotalWeight,

    #[error("The property '{0}' required by the desirability definition is not available")]
    MissingProperty(String),
}

/// Larger-The-Best (LTB): the response should be at least `target`.
#[inline]
pub fn larger_the_best(value: f64, lower_limit: f64, target: f64, r: f64) -> f64 {
    if value.is_nan() || value < lower_limit {
        0.0
    } else if value <= target {
        ((value - lower_limit) / (target - lower_limit)).powf(r)
    } else {
        1.0
    }
}

/// Smaller-The-Best (STB): the response should be at most `target`.
#[inline]
pub fn smaller_the_best(value: f64, target: f64, upper_limit: f64, r: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else if value < target {
        1.0
    } else if value <= upper_limit {
        ((upper_limit - value) / (upper_limit - target)).powf(r)
    } else {
        0.0
    }
}

/// Nominal-The-Best (NTB): the response should hit `target` exactly.
#[inline]
pub fn nominal_the_best(
    value: f64,
    lower_limit: f64,
    target: f64,
    upper_limit: f64,
    r1: f64,
    r2: f64,
) -> f64 {
    if value.is_nan() || value < lower_limit {
        0.0
    } else if value <= target {
        ((value - lower_limit) / (target - lower_limit)).powf(r1)
    } else if value <= upper_limit {
        ((upper_limit - value) / (upper_limit - target)).powf(r2)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DesirabilityFunction {
    LargerTheBest {
        lower_limit: f64,
        target: f64,
        r: f64,
    },
    SmallerTheBest {
        target: f64,
        upper_limit: f64,
        r: f64,
    },
    NominalTheBest {
        lower_limit: f64,
        target: f64,
        upper_limit: f64,
        r1: f64,
        r2: f64,
    },
}

impl DesirabilityFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::LargerTheBest { .. } => "LargerTheBest",
            Self::SmallerTheBest { .. } => "SmallerTheBest",
            Self::NominalTheBest { .. } => "NominalTheBest",
        }
    }

    #[inline]
    pub fn evaluate(&self, value: f64) -> f64 {
        match *self {
            Self::LargerTheBest {
                lower_limit,
                target,
                r,
            } => larger_the_best(value, lower_limit, target, r),
            Self::SmallerTheBest {
                target,
                upper_limit,
                r,
            } => smaller_the_best(value, target, upper_limit, r),
            Self::NominalTheBest {
                lower_limit,
                target,
                upper_limit,
                r1,
                r2,
            } => nominal_the_best(value, lower_limit, target, upper_limit, r1, r2),
        }
    }

    fn validate(&self, variable: &str) -> Result<(), DesirabilityError> {
        let degenerate = |detail: String| DesirabilityError::DegenerateLimits {
            variable: variable.to_string(),
            function: self.name(),
            detail,
        };
        match *self {
            Self::LargerTheBest {
                lower_limit,
                target,
                ..
            } if !(lower_limit < target) => Err(degenerate(format!(
                "LowerLimit ({lower_limit}) must be smaller than Target ({target})"
            ))),
            Self::SmallerTheBest {
                target,
                upper_limit,
                ..
            } if !(target < upper_limit) => Err(degenerate(format!(
                "Target ({target}) must be smaller than UpperLimit ({upper_limit})"
            ))),
            Self::NominalTheBest {
                lower_limit,
                target,
                upper_limit,
                ..
            } if !(lower_limit < target && target < upper_limit) => Err(degenerate(format!(
                "expected LowerLimit ({lower_limit}) < Target ({target}) < UpperLimit ({upper_limit})"
            ))),
            _ => Ok(()),
        }
    }
}

/// A weighted desirability function for one response.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "RawTerm")]
pub struct DesirabilityTerm {
    pub weight: f64,
    pub function: DesirabilityFunction,
}

impl DesirabilityTerm {
    pub fn new(weight: f64, function: DesirabilityFunction) -> Self {
        Self { weight, function }
    }

    pub fn larger_the_best(weight: f64, lower_limit: f64, target: f64) -> Self {
        Self::new(
            weight,
            DesirabilityFunction::LargerTheBest {
                lower_limit,
                target,
                r: 1.0,
            },
        )
    }

    pub fn smaller_the_best(weight: f64, target: f64, upper_limit: f64) -> Self {
        Self::new(
            weight,
            DesirabilityFunction::SmallerTheBest {
                target,
                upper_limit,
                r: 1.0,
            },
        )
    }

    #[inline]
    pub fn evaluate(&self, value: f64) -> f64 {
        self.function.evaluate(value)
    }

    pub fn validate(&self, variable: &str) -> Result<(), DesirabilityError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(DesirabilityError::InvalidWeight {
                variable: variable.to_string(),
                weight: self.weight,
            });
        }
        self.function.validate(variable)
    }
}

/// Accumulates `d^w` products and the weight sum of a weighted geometric mean.
#[derive(Debug, Clone, Copy)]
pub struct WeightedGeometricMean {
    product: f64,
    total_weight: f64,
}

impl Default for WeightedGeometricMean {
    fn default() -> Self {
        Self {
            product: 1.0,
            total_weight: 0.0,
        }
    }
}

impl WeightedGeometricMean {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push(&mut self, desirability: f64, weight: f64) {
        self.product *= desirability.powf(weight);
        self.total_weight += weight;
    }

    /// Pushes the desirability of `value` under `term`.
    #[inline]
    pub fn push_term(&mut self, term: &DesirabilityTerm, value: f64) {
        self.push(term.evaluate(value), term.weight);
    }

    pub fn desirability(&self) -> Result<f64, DesirabilityError> {
        if self.total_weight <= 0.0 {
            return Err(DesirabilityError::ZeroTotalWeight);
        }
        Ok(self.product.powf(1.0 / self.total_weight))
    }

    /// The cost to minimize, `1 - D`.
    pub fn cost(&self) -> Result<f64, DesirabilityError> {
        Ok(1.0 - self.desirability()?)
    }
}

/// A full desirability definition: named terms, plus named sections of terms.
///
/// Sections hold terms that are not bound to a single property name, such as the
/// `vina_scores` section of multi-receptor costs whose `min` / `max` terms are
/// applied to every receptor of the corresponding type.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(try_from = "BTreeMap<String, RawEntry>")]
pub struct Desirability {
    terms: BTreeMap<String, DesirabilityTerm>,
    sections: BTreeMap<String, BTreeMap<String, DesirabilityTerm>>,
}

impl Desirability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_term(mut self, name: impl Into<String>, term: DesirabilityTerm) -> Self {
        self.terms.insert(name.into(), term);
        self
    }

    pub fn with_section_term(
        mut self,
        section: impl Into<String>,
        key: impl Into<String>,
        term: DesirabilityTerm,
    ) -> Self {
        self.sections
            .entry(section.into())
            .or_default()
            .insert(key.into(), term);
        self
    }

    pub fn terms(&self) -> &BTreeMap<String, DesirabilityTerm> {
        &self.terms
    }

    pub fn term(&self, name: &str) -> Option<&DesirabilityTerm> {
        self.terms.get(name)
    }

    pub fn section(&self, name: &str) -> Option<&BTreeMap<String, DesirabilityTerm>> {
        self.sections.get(name)
    }

    /// Checks every term; called once when a cost function is built.
    pub fn validate(&self) -> Result<(), DesirabilityError> {
        for (name, term) in &self.terms {
            term.validate(name)?;
        }
        for (section, terms) in &self.sections {
            for (key, term) in terms {
                term.validate(&format!("{section}[{key}]"))?;
            }
        }
        Ok(())
    }

    /// Accumulates every top-level term, reading the response values through `lookup`.
    pub fn accumulate<F>(
        &self,
        mean: &mut WeightedGeometricMean,
        lookup: F,
    ) -> Result<(), DesirabilityError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        for (name, term) in &self.terms {
            let value = lookup(name).ok_or_else(|| DesirabilityError::MissingProperty(name.clone()))?;
            mean.push_term(term, value);
        }
        Ok(())
    }

    /// The cost `1 - D` over the top-level terms.
    pub fn cost<F>(&self, lookup: F) -> Result<f64, DesirabilityError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        let mut mean = WeightedGeometricMean::new();
        self.accumulate(&mut mean, lookup)?;
        mean.cost()
    }

    /// `qed` (LTB 0.1 → 0.75), `sa_score` (STB 3 → 7) and `vina_score` (STB -12 → -6).
    pub fn default_cost() -> Self {
        Self::new()
            .with_term("qed", DesirabilityTerm::larger_the_best(1.0, 0.1, 0.75))
            .with_term("sa_score", DesirabilityTerm::smaller_the_best(1.0, 3.0, 7.0))
            .with_term(
                "vina_score",
                DesirabilityTerm::smaller_the_best(1.0, -12.0, -6.0),
            )
    }

    /// As [`default_cost`](Self::default_cost) with a `vina_scores` section of `min`/`max` terms.
    pub fn default_multi_receptor() -> Self {
        Self::new()
            .with_term("qed", DesirabilityTerm::larger_the_best(1.0, 0.1, 0.75))
            .with_term("sa_score", DesirabilityTerm::smaller_the_best(1.0, 3.0, 7.0))
            .with_section_term(
                "vina_scores",
                "min",
                DesirabilityTerm::smaller_the_best(1.0, -12.0, -6.0),
            )
            .with_section_term(
                "vina_scores",
                "max",
                DesirabilityTerm::larger_the_best(1.0, -4.0, 0.0),
            )
    }

    /// Top-level `min` (STB -12 → -6) and `max` (LTB -4 → 0) terms.
    pub fn default_multi_receptor_only_vina() -> Self {
        Self::new()
            .with_term("min", DesirabilityTerm::smaller_the_best(1.0, -12.0, -6.0))
            .with_term("max", DesirabilityTerm::larger_the_best(1.0, -4.0, 0.0))
    }
}

// --- Configuration-file representation ---

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawParams {
    #[serde(rename = "LowerLimit")]
    lower_limit: Option<f64>,
    #[serde(rename = "Target")]
    target: Option<f64>,
    #[serde(rename = "UpperLimit")]
    upper_limit: Option<f64>,
    r: Option<f64>,
    r1: Option<f64>,
    r2: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Params(RawParams),
}

#[derive(Debug, Deserialize)]
#[serde(transparent)]
struct RawTerm {
    entries: BTreeMap<String, RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Term(RawTerm),
    Section(BTreeMap<String, RawTerm>),
}

impl TryFrom<RawTerm> for DesirabilityTerm {
    type Error = DesirabilityError;

    fn try_from(raw: RawTerm) -> Result<Self, Self::Error> {
        parse_term("<term>", raw)
    }
}

fn parse_term(variable: &str, raw: RawTerm) -> Result<DesirabilityTerm, DesirabilityError> {
    let mut weight = 1.0;
    let mut functions = Vec::new();

    for (key, value) in raw.entries {
        match (key.as_str(), value) {
            ("w", RawValue::Number(w)) => weight = w,
            (name @ ("LargerTheBest" | "SmallerTheBest" | "NominalTheBest"), RawValue::Params(p)) => {
                functions.push(build_function(variable, name, p)?)
            }
            _ => {
                return Err(DesirabilityError::UnknownKey {
                    variable: variable.to_string(),
                    key,
                });
            }
        }
    }

    if functions.len() != 1 {
        return Err(DesirabilityError::FunctionCount {
            variable: variable.to_string(),
            found: functions.len(),
        });
    }

    let term = DesirabilityTerm::new(weight, functions[0]);
    term.validate(variable)?;
    Ok(term)
}

fn build_function(
    variable: &str,
    name: &str,
    p: RawParams,
) -> Result<DesirabilityFunction, DesirabilityError> {
    let function: &'static str = match name {
        "LargerTheBest" => "LargerTheBest",
        "SmallerTheBest" => "SmallerTheBest",
        _ => "NominalTheBest",
    };
    let require = |value: Option<f64>, parameter: &'static str| {
        value.ok_or_else(|| DesirabilityError::MissingParameter {
            variable: variable.to_string(),
            function,
            parameter,
        })
    };

    Ok(match function {
        "LargerTheBest" => DesirabilityFunction::LargerTheBest {
            lower_limit: require(p.lower_limit, "LowerLimit")?,
            target: require(p.target, "Target")?,
            r: p.r.unwrap_or(1.0),
        },
        "SmallerTheBest" => DesirabilityFunction::SmallerTheBest {
            target: require(p.target, "Target")?,
            upper_limit: require(p.upper_limit, "UpperLimit")?,
            r: p.r.unwrap_or(1.0),
        },
        _ => DesirabilityFunction::NominalTheBest {
            lower_limit: require(p.lower_limit, "LowerLimit")?,
            target: require(p.target, "Target")?,
            upper_limit: require(p.upper_limit, "UpperLimit")?,
            r1: p.r1.unwrap_or(1.0),
            r2: p.r2.unwrap_or(1.0),
        },
    })
}

impl TryFrom<BTreeMap<String, RawEntry>> for Desirability {
    type Error = DesirabilityError;

    fn try_from(raw: BTreeMap<String, RawEntry>) -> Result<Self, Self::Error> {
        let mut desirability = Desirability::new();
        for (name, entry) in raw {
            match entry {
                RawEntry::Term(term) => {
                    let term = parse_term(&name, term)?;
                    desirability.terms.insert(name, term);
                }
                RawEntry::Section(section) => {
                    let mut parsed = BTreeMap::new();
                    for (key, term) in section {
                        let term = parse_term(&format!("{name}[{key}]"), term)?;
                        parsed.insert(key, term);
                    }
                    desirability.sections.insert(name, parsed);
                }
            }
        }
        Ok(desirability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn larger_the_best_covers_all_branches() {
        assert_eq!(larger_the_best(0.0, 0.1, 0.75, 1.0), 0.0);
        assert!(approx(larger_the_best(0.425, 0.1, 0.75, 1.0), 0.5));
        assert_eq!(larger_the_best(0.75, 0.1, 0.75, 1.0), 1.0);
        assert_eq!(larger_the_best(0.9, 0.1, 0.75, 1.0), 1.0);
    }

    #[test]
    fn smaller_the_best_covers_all_branches() {
        assert_eq!(smaller_the_best(-13.0, -12.0, -6.0, 1.0), 1.0);
        assert!(approx(smaller_the_best(-9.0, -12.0, -6.0, 1.0), 0.5));
        assert_eq!(smaller_the_best(-6.0, -12.0, -6.0, 1.0), 0.0);
        assert_eq!(smaller_the_best(-1.0, -12.0, -6.0, 1.0), 0.0);
    }

    #[test]
    fn nominal_the_best_peaks_at_target() {
        assert_eq!(nominal_the_best(5.0, 0.0, 5.0, 10.0, 1.0, 1.0), 1.0);
        assert!(approx(nominal_the_best(2.5, 0.0, 5.0, 10.0, 1.0, 1.0), 0.5));
        assert!(approx(nominal_the_best(7.5, 0.0, 5.0, 10.0, 1.0, 1.0), 0.5));
        assert_eq!(nominal_the_best(-1.0, 0.0, 5.0, 10.0, 1.0, 1.0), 0.0);
        assert_eq!(nominal_the_best(11.0, 0.0, 5.0, 10.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn exponent_shapes_the_curve() {
        assert!(approx(larger_the_best(0.5, 0.0, 1.0, 2.0), 0.25));
        assert!(approx(smaller_the_best(0.5, 0.0, 1.0, 3.0), 0.125));
        assert!(approx(nominal_the_best(7.5, 0.0, 5.0, 10.0, 1.0, 2.0), 0.25));
    }

    #[test]
    fn non_finite_values_are_handled() {
        assert_eq!(smaller_the_best(f64::INFINITY, -12.0, -6.0, 1.0), 0.0);
        assert_eq!(larger_the_best(f64::INFINITY, 0.1, 0.75, 1.0), 1.0);
        assert_eq!(larger_the_best(f64::NEG_INFINITY, 0.1, 0.75, 1.0), 0.0);
        assert_eq!(larger_the_best(f64::NAN, 0.1, 0.75, 1.0), 0.0);
        assert_eq!(smaller_the_best(f64::NAN, -12.0, -6.0, 1.0), 0.0);
    }

    #[test]
    fn weighted_geometric_mean_matches_closed_form() {
        let mut mean = WeightedGeometricMean::new();
        mean.push(0.5, 1.0);
        mean.push(0.8, 2.0);
        let expected = (0.5_f64 * 0.8_f64.powi(2)).powf(1.0 / 3.0);
        assert!(approx(mean.desirability().unwrap(), expected));
        assert!(approx(mean.cost().unwrap(), 1.0 - expected));
    }

    #[test]
    fn a_single_zero_desirability_zeroes_the_aggregate() {
        let mut mean = WeightedGeometricMean::new();
        mean.push(1.0, 1.0);
        mean.push(0.0, 1.0);
        assert_eq!(mean.desirability().unwrap(), 0.0);
        assert_eq!(mean.cost().unwrap(), 1.0);
    }

    #[test]
    fn zero_total_weight_is_rejected() {
        let mut mean = WeightedGeometricMean::new();
        mean.push(0.5, 0.0);
        assert_eq!(mean.desirability(), Err(DesirabilityError::ZeroTotalWeight));
    }

    #[test]
    fn default_cost_uses_the_three_classic_responses() {
        let desirability = Desirability::default_cost();
        let cost = desirability
            .cost(|name| match name {
                "qed" => Some(0.75),
                "sa_score" => Some(3.0),
                "vina_score" => Some(-12.0),
                _ => None,
            })
            .unwrap();
        assert!(approx(cost, 0.0));
    }

    #[test]
    fn missing_property_is_reported() {
        let desirability = Desirability::default_cost();
        let result = desirability.cost(|name| (name == "qed").then_some(0.5));
        assert!(matches!(result, Err(DesirabilityError::MissingProperty(_))));
    }

    #[test]
    fn term_deserializes_from_historical_keys() {
        let json = r#"{"w": 2, "SmallerTheBest": {"Target": 3, "UpperLimit": 7}}"#;
        let term: DesirabilityTerm = serde_json::from_str(json).unwrap();
        assert_eq!(term.weight, 2.0);
        assert_eq!(
            term.function,
            DesirabilityFunction::SmallerTheBest {
                target: 3.0,
                upper_limit: 7.0,
                r: 1.0
            }
        );
    }

    #[test]
    fn desirability_deserializes_terms_and_sections() {
        let json = r#"{
            "qed": {"w": 1, "LargerTheBest": {"LowerLimit": 0.1, "Target": 0.75, "r": 1}},
            "vina_scores": {
                "min": {"w": 1, "SmallerTheBest": {"Target": -12, "UpperLimit": -6, "r": 1}},
                "max": {"w": 1, "LargerTheBest": {"LowerLimit": -4, "Target": 0, "r": 1}}
            }
        }"#;
        let desirability: Desirability = serde_json::from_str(json).unwrap();
        assert!(desirability.term("qed").is_some());
        let section = desirability.section("vina_scores").unwrap();
        assert_eq!(section.len(), 2);
        assert_eq!(section["max"].function.name(), "LargerTheBest");
        assert_eq!(desirability, {
            Desirability::new()
                .with_term("qed", DesirabilityTerm::larger_the_best(1.0, 0.1, 0.75))
                .with_section_term(
                    "vina_scores",
                    "min",
                    DesirabilityTerm::smaller_the_best(1.0, -12.0, -6.0),
                )
                .with_section_term(
                    "vina_scores",
                    "max",
                    DesirabilityTerm::larger_the_best(1.0, -4.0, 0.0),
                )
        });
    }

    #[test]
    fn unknown_function_key_is_rejected() {
        let json = r#"{"qed": {"w": 1, "BiggerIsBetter": {"Target": 1}}}"#;
        let err = serde_json::from_str::<Desirability>(json).unwrap_err();
        assert!(err.to_string().contains("BiggerIsBetter"));
    }

    #[test]
    fn two_functions_for_one_variable_are_rejected() {
        let json = r#"{"qed": {
            "LargerTheBest": {"LowerLimit": 0.1, "Target": 0.75},
            "SmallerTheBest": {"Target": 0.1, "UpperLimit": 0.75}
        }}"#;
        let err = serde_json::from_str::<Desirability>(json).unwrap_err();
        assert!(err.to_string().contains("exactly one function"));
    }

    #[test]
    fn degenerate_limits_are_rejected() {
        let json = r#"{"qed": {"LargerTheBest": {"LowerLimit": 0.8, "Target": 0.75}}}"#;
        let err = serde_json::from_str::<Desirability>(json).unwrap_err();
        assert!(err.to_string().contains("degenerate"));
    }

    #[test]
    fn missing_parameter_is_rejected() {
        let json = r#"{"sa_score": {"SmallerTheBest": {"Target": 3}}}"#;
        let err = serde_json::from_str::<Desirability>(json).unwrap_err();
        assert!(err.to_string().contains("UpperLimit"));
    }

    #[test]
    fn negative_weight_is_rejected() {
        let term = DesirabilityTerm::larger_the_best(-1.0, 0.0, 1.0);
        assert!(matches!(
            term.validate("qed"),
            Err(DesirabilityError::InvalidWeight { .. })
        ));
    }
}
