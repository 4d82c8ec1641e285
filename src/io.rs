// Reads the raw patient table and checks it has every column the pipeline needs.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use serde::Deserialize;

use crate::error::{Result, RiskError};

/// Columns that must be present in the header. Anything else (`ICU`,
/// `INTUBED`, ...) is ignored.
pub const REQUIRED_COLUMNS: [&str; 12] = [
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
    "PATIENT_TYPE",
];

/// One row of the source table, integer codes as stored in the file.
/// `1`/`2` mean present/absent, `97`/`98`/`99` mean unknown.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "AGE")]           pub age: i64,
    #[serde(rename = "SEX")]           pub sex: i64,
    #[serde(rename = "PNEUMONIA")]     pub pneumonia: i64,
    #[serde(rename = "DIABETES")]      pub diabetes: i64,
    #[serde(rename = "COPD")]          pub copd: i64,
    #[serde(rename = "ASTHMA")]        pub asthma: i64,
    #[serde(rename = "INMSUPR")]       pub inmsupr: i64,
    #[serde(rename = "HIPERTENSION")]  pub hipertension: i64,
    #[serde(rename = "OBESITY")]       pub obesity: i64,
    #[serde(rename = "RENAL_CHRONIC")] pub renal_chronic: i64,
    #[serde(rename = "TOBACCO")]       pub tobacco: i64,
    #[serde(rename = "PATIENT_TYPE")]  pub patient_type: i64,
}

pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Vec<RawRecord>> {
    let path = path.as_ref();
    info!("Loading patient records from {}", path.display());
    let file = File::open(path)?;
    read_records(file)
}

/// Reads every record from `reader`. Fails on the first row that cannot be
/// parsed instead of skipping it.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    check_columns(&headers)?;
    let expected_len = headers.len();

    let mut out = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        if raw.iter().all(|f| f.is_empty()) {
            debug!("Skipping blank line {line}");
            continue;
        }

        if raw.len() != expected_len {
            return Err(RiskError::MalformedRecord {
                line,
                reason: format!("expected {} fields, found {}", expected_len, raw.len()),
            });
        }

        let rec = raw
            .deserialize::<RawRecord>(Some(&headers))
            .map_err(|e| RiskError::MalformedRecord {
                line,
                reason: e.to_string(),
            })?;
        out.push(rec);
    }

    info!("Read {} raw record(s)", out.len());
    Ok(out)
}

fn check_columns(headers: &StringRecord) -> Result<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&col| !headers.iter().any(|h| h == col))
        .map(|col| col.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RiskError::MissingColumns(missing))
    }
}
