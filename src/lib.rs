//! COVID-19 patient risk prediction: clean a table of integer-coded patient
//! records, fit a logistic regression on it once, and score single patients.

pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod preprocess;
pub mod state;

pub use config::Settings;
pub use error::{Result, RiskError};
pub use io::{load_csv, read_records, RawRecord};
pub use model::{fit_with_timeout, Assessment, RiskClassifier};
pub use preprocess::{
    prepare, CleanRecord, FeatureVector, LabelRule, PrepareConfig, TrainingSet, FEATURE_NAMES,
};
