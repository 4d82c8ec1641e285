/// Train the logistic regression risk classifier and serve predictions.
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use log::info;
use ndarray::{aview1, Axis};

use crate::error::{Result, RiskError};
use crate::preprocess::{TrainingSet, FEATURE_NAMES, NUM_FEATURES};

pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

/// Outcome of one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment {
    pub high_risk: bool,
    /// Probability of the high-risk class, in `[0, 1]`.
    pub probability: f64,
}

struct Fitted {
    model: FittedLogisticRegression<f64, usize>,
    /// linfa picks its own positive class; true when that class is `1`.
    positive_is_high_risk: bool,
}

/// Binary logistic regression over the eleven patient features.
/// Created unfitted, fitted once, then read-only.
pub struct RiskClassifier {
    max_iterations: u64,
    fitted: Option<Fitted>,
}

impl fmt::Debug for RiskClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskClassifier")
            .field("max_iterations", &self.max_iterations)
            .field("fitted", &self.fitted.is_some())
            .finish()
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskClassifier {
    pub fn new() -> Self {
        Self::with_max_iterations(DEFAULT_MAX_ITERATIONS)
    }

    pub fn with_max_iterations(max_iterations: u64) -> Self {
        RiskClassifier {
            max_iterations,
            fitted: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Fits on `set`, which is consumed. Both classes must be present.
    pub fn fit(mut self, set: TrainingSet) -> Result<Self> {
        let TrainingSet {
            features, labels, ..
        } = set;
        if features.ncols() != NUM_FEATURES {
            return Err(RiskError::Shape {
                expected: NUM_FEATURES,
                found: features.ncols(),
            });
        }
        if let Some(&first) = labels.get(0) {
            if labels.iter().all(|&l| l == first) {
                return Err(RiskError::SingleClass(first));
            }
        }

        let dataset = Dataset::new(features, labels);
        let model = LogisticRegression::default()
            .max_iterations(self.max_iterations)
            .fit(&dataset)
            .map_err(|e| RiskError::Training(e.to_string()))?;

        let positive_is_high_risk = model.labels().pos.class == 1;

        info!(
            "Fitted logistic regression on {} row(s), intercept {:.4}",
            dataset.nsamples(),
            model.intercept()
        );
        self.fitted = Some(Fitted {
            model,
            positive_is_high_risk,
        });
        Ok(self)
    }

    fn fitted(&self) -> Result<&Fitted> {
        self.fitted.as_ref().ok_or(RiskError::NotFitted)
    }

    /// Sigmoid output for the high-risk class.
    pub fn predict_probability(&self, vector: &[f64]) -> Result<f64> {
        let fitted = self.fitted()?;
        if vector.len() != NUM_FEATURES {
            return Err(RiskError::Shape {
                expected: NUM_FEATURES,
                found: vector.len(),
            });
        }
        let x = aview1(vector).insert_axis(Axis(0));
        let p = fitted.model.predict_probabilities(&x)[0];
        Ok(if fitted.positive_is_high_risk { p } else { 1.0 - p })
    }

    /// `1` when the high-risk probability is at least 0.5.
    pub fn predict(&self, vector: &[f64]) -> Result<usize> {
        let p = self.predict_probability(vector)?;
        Ok(usize::from(p >= 0.5))
    }

    pub fn assess(&self, vector: &[f64]) -> Result<Assessment> {
        let probability = self.predict_probability(vector)?;
        Ok(Assessment {
            high_risk: probability >= 0.5,
            probability,
        })
    }

    /// Intercept of the decision function for the high-risk class.
    pub fn intercept(&self) -> Result<f64> {
        let fitted = self.fitted()?;
        let b = fitted.model.intercept();
        Ok(if fitted.positive_is_high_risk { b } else { -b })
    }

    /// Coefficients per feature towards the high-risk class, largest magnitude first.
    pub fn coefficients(&self) -> Result<Vec<(&'static str, f64)>> {
        let fitted = self.fitted()?;
        let sign = if fitted.positive_is_high_risk { 1.0 } else { -1.0 };
        let mut out: Vec<(&'static str, f64)> = FEATURE_NAMES
            .iter()
            .zip(fitted.model.params().iter())
            .map(|(&name, &w)| (name, sign * w))
            .collect();
        out.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        Ok(out)
    }
}

/// Fits on a worker thread and gives up after `timeout`. The solver cannot
/// be interrupted, so on timeout the worker runs on until it finishes and
/// its result is discarded.
pub fn fit_with_timeout(
    classifier: RiskClassifier,
    set: TrainingSet,
    timeout: Duration,
) -> Result<RiskClassifier> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(classifier.fit(set));
    });
    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(RiskError::TrainingTimeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => {
            Err(RiskError::Training("training thread exited without a result".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{prepare, LabelRule, PrepareConfig};
    use crate::io::RawRecord;

    /// Pneumonia drives the label; ages and sex vary independently.
    fn pneumonia_driven() -> TrainingSet {
        let raw: Vec<RawRecord> = (0..200)
            .map(|i| RawRecord {
                age: 20 + (i * 7) % 60,
                sex: 1 + i % 2,
                pneumonia: if i % 3 == 0 { 1 } else { 2 },
                diabetes: 1 + (i / 2) % 2,
                copd: 2,
                asthma: 2,
                inmsupr: 2,
                hipertension: 1 + (i / 5) % 2,
                obesity: 2,
                renal_chronic: 2,
                tobacco: 1 + (i / 3) % 2,
                patient_type: 1,
            })
            .collect();
        prepare(&raw, &PrepareConfig::new(LabelRule::Outpatient)).expect("prepare failed")
    }

    #[test]
    fn healthy_patient_is_low_risk() -> Result<()> {
        let model = RiskClassifier::new().fit(pneumonia_driven())?;
        let v = [30.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0];
        assert_eq!(model.predict(&v)?, 0);
        assert!(model.predict_probability(&v)? < 0.5);
        Ok(())
    }

    #[test]
    fn pneumonia_patient_is_high_risk() -> Result<()> {
        let model = RiskClassifier::new().fit(pneumonia_driven())?;
        let v = [30.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0];
        let a = model.assess(&v)?;
        assert!(a.high_risk);
        assert!(a.probability >= 0.5 && a.probability <= 1.0);
        // code 1 means "present", so the weight is negative
        let pneumonia = model
            .coefficients()?
            .into_iter()
            .find(|&(name, _)| name == "PNEUMONIA")
            .map(|(_, w)| w)
            .unwrap();
        assert!(pneumonia < 0.0);
        Ok(())
    }

    #[test]
    fn predict_agrees_with_probability() -> Result<()> {
        let model = RiskClassifier::new().fit(pneumonia_driven())?;
        for age in (0..=100).step_by(10) {
            for pneumonia in [1.0, 2.0] {
                let v = [age as f64, 2.0, pneumonia, 1.0, 2.0, 2.0, 2.0, 1.0, 2.0, 2.0, 1.0];
                let p = model.predict_probability(&v)?;
                assert!((0.0..=1.0).contains(&p));
                assert_eq!(model.predict(&v)? == 1, p >= 0.5);
            }
        }
        Ok(())
    }

    #[test]
    fn refitting_same_data_is_deterministic() -> Result<()> {
        let a = RiskClassifier::new().fit(pneumonia_driven())?;
        let b = RiskClassifier::new().fit(pneumonia_driven())?;
        let v = [55.0, 2.0, 1.0, 1.0, 2.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0];
        assert!((a.predict_probability(&v)? - b.predict_probability(&v)?).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn wrong_length_is_shape_error() -> Result<()> {
        let model = RiskClassifier::new().fit(pneumonia_driven())?;
        for len in [0, 10, 12] {
            let v = vec![1.0; len];
            match model.predict(&v) {
                Err(RiskError::Shape { expected, found }) => {
                    assert_eq!(expected, 11);
                    assert_eq!(found, len);
                }
                other => panic!("expected Shape, got {other:?}"),
            }
            assert!(matches!(model.predict_probability(&v), Err(RiskError::Shape { .. })));
        }
        Ok(())
    }

    #[test]
    fn unfitted_classifier_refuses_to_predict() {
        let model = RiskClassifier::new();
        let v = [30.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0, 2.0];
        assert!(matches!(model.predict(&v), Err(RiskError::NotFitted)));
        assert!(matches!(model.predict_probability(&v), Err(RiskError::NotFitted)));
        assert!(matches!(model.coefficients(), Err(RiskError::NotFitted)));
    }

    #[test]
    fn single_class_is_rejected() {
        let mut set = pneumonia_driven();
        set.labels.fill(0);
        assert!(matches!(
            RiskClassifier::new().fit(set),
            Err(RiskError::SingleClass(0))
        ));
    }

    #[test]
    fn fit_within_timeout() -> Result<()> {
        let model = fit_with_timeout(
            RiskClassifier::new(),
            pneumonia_driven(),
            Duration::from_secs(60),
        )?;
        assert!(model.is_fitted());
        Ok(())
    }

    #[test]
    fn zero_budget_times_out() {
        match fit_with_timeout(RiskClassifier::new(), pneumonia_driven(), Duration::ZERO) {
            Err(RiskError::TrainingTimeout(budget)) => assert_eq!(budget, Duration::ZERO),
            other => panic!("expected TrainingTimeout, got {other:?}"),
        }
    }

    #[test]
    fn probability_matches_linfa_class_prediction() -> Result<()> {
        let model = RiskClassifier::new().fit(pneumonia_driven())?;
        let fitted = model.fitted()?;
        for pneumonia in [1.0, 2.0] {
            for age in [25.0, 50.0, 80.0] {
                let v = [age, 1.0, pneumonia, 2.0, 2.0, 2.0, 2.0, 1.0, 2.0, 2.0, 2.0];
                let x = aview1(&v[..]).insert_axis(Axis(0));
                let linfa_class: ndarray::Array1<usize> = fitted.model.predict(&x);
                assert_eq!(model.predict(&v)?, linfa_class[0]);
            }
        }
        Ok(())
    }
}
