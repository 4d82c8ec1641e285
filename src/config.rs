//! Runtime settings: defaults, an optional TOML file, then CLI overrides.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::Deserialize;

use crate::error::Result;
use crate::model::DEFAULT_MAX_ITERATIONS;
use crate::preprocess::{LabelRule, PrepareConfig, DEFAULT_SAMPLE_CAP, DEFAULT_SEED};

pub const DEFAULT_DATA_PATH: &str = "data/covid19_data.csv";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub data_path: PathBuf,
    /// No default: the two rules give opposite targets.
    pub label_rule: Option<LabelRule>,
    /// `0` disables subsampling.
    pub sample_cap: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub train_timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            label_rule: None,
            sample_cap: DEFAULT_SAMPLE_CAP,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            train_timeout_secs: None,
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Reading settings from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// `None` until a label rule has been chosen.
    pub fn prepare_config(&self) -> Option<PrepareConfig> {
        self.label_rule.map(|label_rule| PrepareConfig {
            label_rule,
            sample_cap: (self.sample_cap > 0).then_some(self.sample_cap),
            seed: self.seed,
        })
    }

    pub fn train_timeout(&self) -> Option<Duration> {
        self.train_timeout_secs.map(Duration::from_secs)
    }
}
