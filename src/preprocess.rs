// Data cleaning and training-set construction.
use std::fmt;

use log::{debug, info, warn};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::Deserialize;

use crate::error::{Result, RiskError};
use crate::io::RawRecord;

/// Codes the source data uses for "unknown".
pub const SENTINELS: [i64; 3] = [97, 98, 99];

pub const NUM_FEATURES: usize = 11;

/// Feature order shared by training and inference.
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "AGE",
    "SEX",
    "PNEUMONIA",
    "DIABETES",
    "COPD",
    "ASTHMA",
    "INMSUPR",
    "HIPERTENSION",
    "OBESITY",
    "RENAL_CHRONIC",
    "TOBACCO",
];

pub type FeatureVector = [f64; NUM_FEATURES];

pub const DEFAULT_SAMPLE_CAP: usize = 100_000;
pub const DEFAULT_SEED: u64 = 42;

/// How the `high_risk` target is derived from pneumonia status and care
/// setting. The two rules produce opposite targets for pneumonia patients,
/// so one must always be chosen explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LabelRule {
    /// `PNEUMONIA == 1 && PATIENT_TYPE == 1` (pneumonia, sent home)
    Outpatient,
    /// `PNEUMONIA == 1 && PATIENT_TYPE == 2` (pneumonia, hospitalized)
    Hospitalized,
}

impl LabelRule {
    pub fn label(self, pneumonia: Option<i64>, patient_type: Option<i64>) -> bool {
        let wanted_type = match self {
            LabelRule::Outpatient => 1,
            LabelRule::Hospitalized => 2,
        };
        pneumonia == Some(1) && patient_type == Some(wanted_type)
    }
}

impl fmt::Display for LabelRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelRule::Outpatient => write!(f, "outpatient"),
            LabelRule::Hospitalized => write!(f, "hospitalized"),
        }
    }
}

/// A raw record with unknown codes turned into `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub age: i64,
    pub sex: Option<i64>,
    pub pneumonia: Option<i64>,
    pub diabetes: Option<i64>,
    pub copd: Option<i64>,
    pub asthma: Option<i64>,
    pub inmsupr: Option<i64>,
    pub hipertension: Option<i64>,
    pub obesity: Option<i64>,
    pub renal_chronic: Option<i64>,
    pub tobacco: Option<i64>,
    pub high_risk: bool,
}

impl CleanRecord {
    /// Indicator fields in `FEATURE_NAMES` order, without `AGE`.
    fn indicators(&self) -> [Option<i64>; NUM_FEATURES - 1] {
        [
            self.sex,
            self.pneumonia,
            self.diabetes,
            self.copd,
            self.asthma,
            self.inmsupr,
            self.hipertension,
            self.obesity,
            self.renal_chronic,
            self.tobacco,
        ]
    }

    /// `None` when any feature is missing.
    pub fn features(&self) -> Option<FeatureVector> {
        let mut out = [0.0; NUM_FEATURES];
        out[0] = self.age as f64;
        for (slot, value) in out[1..].iter_mut().zip(self.indicators()) {
            *slot = value? as f64;
        }
        Some(out)
    }
}

fn known(code: i64) -> Option<i64> {
    if SENTINELS.contains(&code) {
        None
    } else {
        Some(code)
    }
}

/// Cleans one record. `AGE` is kept as-is; `PATIENT_TYPE` only feeds the label.
pub fn clean(r: &RawRecord, rule: LabelRule) -> CleanRecord {
    let pneumonia = known(r.pneumonia);
    CleanRecord {
        age: r.age,
        sex: known(r.sex),
        pneumonia,
        diabetes: known(r.diabetes),
        copd: known(r.copd),
        asthma: known(r.asthma),
        inmsupr: known(r.inmsupr),
        hipertension: known(r.hipertension),
        obesity: known(r.obesity),
        renal_chronic: known(r.renal_chronic),
        tobacco: known(r.tobacco),
        high_risk: rule.label(pneumonia, known(r.patient_type)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareConfig {
    pub label_rule: LabelRule,
    /// Upper bound on training rows; `None` keeps everything.
    pub sample_cap: Option<usize>,
    pub seed: u64,
}

impl PrepareConfig {
    pub fn new(label_rule: LabelRule) -> Self {
        PrepareConfig {
            label_rule,
            sample_cap: Some(DEFAULT_SAMPLE_CAP),
            seed: DEFAULT_SEED,
        }
    }
}

/// Row accounting for one `prepare` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparationReport {
    pub rows_in: usize,
    pub rows_incomplete: usize,
    /// Rows with the column missing, for every feature column that had any.
    pub missing_by_column: Vec<(&'static str, usize)>,
    pub rows_subsampled_out: usize,
    pub rows_out: usize,
    pub high_risk_rows: usize,
}

/// Feature matrix (rows in `FEATURE_NAMES` order) and parallel 0/1 labels.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub features: Array2<f64>,
    pub labels: Array1<usize>,
    pub report: PreparationReport,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Turns raw records into a training set: clean, label, drop incomplete
/// rows, subsample down to the cap. The input is left untouched.
pub fn prepare(raw: &[RawRecord], config: &PrepareConfig) -> Result<TrainingSet> {
    let rows_in = raw.len();
    let mut missing_counts = [0usize; NUM_FEATURES];
    let mut complete: Vec<(FeatureVector, bool)> = Vec::with_capacity(rows_in);

    for r in raw {
        let c = clean(r, config.label_rule);
        match c.features() {
            Some(v) => complete.push((v, c.high_risk)),
            None => {
                for (i, value) in c.indicators().iter().enumerate() {
                    if value.is_none() {
                        missing_counts[i + 1] += 1;
                    }
                }
            }
        }
    }

    let rows_incomplete = rows_in - complete.len();
    let missing_by_column: Vec<(&'static str, usize)> = FEATURE_NAMES
        .iter()
        .zip(missing_counts)
        .filter(|&(_, n)| n > 0)
        .map(|(&name, n)| (name, n))
        .collect();
    for (name, n) in &missing_by_column {
        debug!("{name}: {n} row(s) with unknown value");
    }

    if complete.is_empty() {
        return Err(RiskError::EmptyDataset {
            rows_in,
            rows_incomplete,
            missing_by_column,
        });
    }

    let kept = complete.len();
    if let Some(cap) = config.sample_cap.filter(|&cap| kept > cap) {
        warn!("{kept} complete rows exceed the cap of {cap}; subsampling with seed {}", config.seed);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut picked = index::sample(&mut rng, kept, cap).into_vec();
        picked.sort_unstable();
        complete = picked.into_iter().map(|i| complete[i]).collect();
    }

    let rows_out = complete.len();
    let mut features = Array2::<f64>::zeros((rows_out, NUM_FEATURES));
    let mut labels = Array1::<usize>::zeros(rows_out);
    for (i, (v, high_risk)) in complete.iter().enumerate() {
        for (j, &x) in v.iter().enumerate() {
            features[(i, j)] = x;
        }
        labels[i] = usize::from(*high_risk);
    }

    let report = PreparationReport {
        rows_in,
        rows_incomplete,
        missing_by_column,
        rows_subsampled_out: kept - rows_out,
        rows_out,
        high_risk_rows: labels.sum(),
    };
    info!(
        "Prepared {} training row(s) from {} ({} incomplete, {} subsampled out, {} high risk, rule {})",
        report.rows_out,
        report.rows_in,
        report.rows_incomplete,
        report.rows_subsampled_out,
        report.high_risk_rows,
        config.label_rule
    );

    Ok(TrainingSet {
        features,
        labels,
        report,
    })
}
