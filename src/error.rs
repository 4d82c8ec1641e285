//! Error type shared by every stage of the risk pipeline.
//!
//! Data and training failures happen once, at startup, and are meant to be
//! shown to an operator: messages name the offending column and the row
//! counts involved. `Shape` is the only error a single prediction request
//! is expected to hit.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration file: {0}")]
    Config(#[from] toml::de::Error),

    #[error("No label rule chosen: set `label_rule` to \"outpatient\" or \"hospitalized\"")]
    LabelRuleRequired,

    #[error("The input table is missing required column(s): {}. Please check spelling and case.", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error(
        "No rows left to train on: {rows_in} row(s) read, {rows_incomplete} removed for missing values{}",
        describe_missing(.missing_by_column)
    )]
    EmptyDataset {
        rows_in: usize,
        rows_incomplete: usize,
        missing_by_column: Vec<(&'static str, usize)>,
    },

    #[error("Training labels contain only the class {0}; both low- and high-risk rows are required")]
    SingleClass(usize),

    #[error("Logistic regression failed to fit: {0}")]
    Training(String),

    #[error("Training did not finish within {0:?}")]
    TrainingTimeout(Duration),

    #[error("Feature vector has {found} value(s), expected {expected}")]
    Shape { expected: usize, found: usize },

    #[error("The classifier has not been fitted yet")]
    NotFitted,
}

fn describe_missing(by_column: &[(&'static str, usize)]) -> String {
    if by_column.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = by_column
        .iter()
        .map(|(name, count)| format!("{name}={count}"))
        .collect();
    format!(" (missing per column: {})", parts.join(", "))
}

pub type Result<T> = std::result::Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_message_names_columns() {
        let err = RiskError::EmptyDataset {
            rows_in: 3,
            rows_incomplete: 3,
            missing_by_column: vec![("SEX", 2), ("OBESITY", 1)],
        };
        let msg = err.to_string();
        assert!(msg.contains("3 row(s) read"));
        assert!(msg.contains("SEX=2"));
        assert!(msg.contains("OBESITY=1"));
    }

    #[test]
    fn config_parse_error_says_invalid() {
        let err: RiskError = toml::from_str::<toml::Value>("= nope").unwrap_err().into();
        assert!(err.to_string().starts_with("Invalid configuration file:"));
    }

    #[test]
    fn missing_columns_are_listed() {
        let err = RiskError::MissingColumns(vec!["AGE".into(), "TOBACCO".into()]);
        assert!(err.to_string().contains("AGE, TOBACCO"));
    }
}
