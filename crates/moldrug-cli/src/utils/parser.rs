use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid assignment '{0}'. Expected KEY=VALUE.")]
    MissingEquals(String),

    #[error("Invalid key '{0}'. Expected STAGE.KEY (e.g., 'main.maxiter').")]
    MissingStage(String),

    #[error("Component '{component}' cannot be empty in '{input}'.")]
    EmptyComponent {
        component: &'static str,
        input: String,
    },

    #[error("Invalid number '{value}' for '{key}'.")]
    InvalidNumber { key: String, value: String },
}

/// Splits `KEY=VALUE` at the first `=`.
pub fn parse_assignment(input: &str) -> Result<(&str, &str), ParseError> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| ParseError::MissingEquals(input.to_string()))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            input: input.to_string(),
        });
    }
    Ok((key, value.trim()))
}

/// Splits `STAGE.KEY` at the first `.`.
pub fn parse_stage_key(key: &str) -> Result<(&str, &str), ParseError> {
    let (stage, field) = key
        .split_once('.')
        .ok_or_else(|| ParseError::MissingStage(key.to_string()))?;
    if stage.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "stage",
            input: key.to_string(),
        });
    }
    if field.is_empty() {
        return Err(ParseError::EmptyComponent {
            component: "key",
            input: key.to_string(),
        });
    }
    Ok((stage, field))
}

/// Parses `NAME=NUMBER`; `inf` and `-inf` are accepted.
pub fn parse_value_assignment(input: &str) -> Result<(String, f64), ParseError> {
    let (key, value) = parse_assignment(input)?;
    let number = value.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    Ok((key.to_string(), number))
}
