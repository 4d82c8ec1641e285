//! The fitted model shared by the whole process.
//!
//! It is trained once by [`initialize`], never changes afterwards, and is
//! dropped at exit. Prediction calls only take `&RiskClassifier`, so any
//! number of callers can use it at the same time.

use std::sync::OnceLock;

use log::info;

use crate::config::Settings;
use crate::error::{Result, RiskError};
use crate::io::load_csv;
use crate::model::{fit_with_timeout, RiskClassifier};
use crate::preprocess::prepare;

static CLASSIFIER: OnceLock<RiskClassifier> = OnceLock::new();

/// Load, prepare and fit according to `settings`. Does not touch the
/// process-wide slot.
pub fn train(settings: &Settings) -> Result<RiskClassifier> {
    let config = settings
        .prepare_config()
        .ok_or(RiskError::LabelRuleRequired)?;
    let raw = load_csv(&settings.data_path)?;
    let set = prepare(&raw, &config)?;
    drop(raw);

    let classifier = RiskClassifier::with_max_iterations(settings.max_iterations);
    match settings.train_timeout() {
        Some(timeout) => fit_with_timeout(classifier, set, timeout),
        None => classifier.fit(set),
    }
}

/// Trains the process-wide model on first call; later calls return the
/// model already held, whatever their settings.
pub fn initialize(settings: &Settings) -> Result<&'static RiskClassifier> {
    if let Some(classifier) = CLASSIFIER.get() {
        return Ok(classifier);
    }
    let trained = train(settings)?;
    if CLASSIFIER.set(trained).is_err() {
        info!("Another caller initialized the classifier first; keeping theirs");
    }
    classifier()
}

/// The process-wide model, or `NotFitted` if [`initialize`] has not succeeded.
pub fn classifier() -> Result<&'static RiskClassifier> {
    CLASSIFIER.get().ok_or(RiskError::NotFitted)
}
