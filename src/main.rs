/// Command-line front end: train once at startup, then score a patient or
/// report what the model learned.
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use log::{error, info};
use plotters::prelude::*;

use covid_risk::{state, LabelRule, RiskClassifier, Settings};

#[derive(Parser)]
#[command(
    name = "covid-risk",
    about = "Estimate whether a COVID-19 patient is at high risk",
    long_about = "Trains a logistic regression on a table of integer-coded patient records \
                  (1 = yes, 2 = no, 97/98/99 = unknown) and scores a single patient."
)]
struct Cli {
    /// TOML settings file; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Patient table (CSV)
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// How the high-risk target is derived from PNEUMONIA and PATIENT_TYPE
    #[arg(long, value_enum)]
    label_rule: Option<LabelRule>,

    /// Maximum number of training rows (0 = no cap)
    #[arg(long, value_name = "N")]
    sample_cap: Option<usize>,

    /// Seed for subsampling
    #[arg(long)]
    seed: Option<u64>,

    /// Give up if training takes longer than this
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one patient
    Predict(Patient),
    /// Print the learned coefficients, largest first
    Coefficients {
        /// Also draw them as a bar chart PNG
        #[arg(long, value_name = "FILE")]
        plot: Option<PathBuf>,
    },
}

/// Answers use the table's coding: 1 = yes (male for --sex), 2 = no (female).
#[derive(Args)]
struct Patient {
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=120))]
    age: u8,
    #[arg(long, value_parser = yes_no)]
    sex: u8,
    #[arg(long, value_parser = yes_no)]
    pneumonia: u8,
    #[arg(long, value_parser = yes_no)]
    diabetes: u8,
    #[arg(long, value_parser = yes_no)]
    copd: u8,
    #[arg(long, value_parser = yes_no)]
    asthma: u8,
    #[arg(long, value_parser = yes_no)]
    inmsupr: u8,
    #[arg(long, value_parser = yes_no)]
    hipertension: u8,
    #[arg(long, value_parser = yes_no)]
    obesity: u8,
    #[arg(long, value_parser = yes_no)]
    renal_chronic: u8,
    #[arg(long, value_parser = yes_no)]
    tobacco: u8,
}

impl Patient {
    /// Same order as `FEATURE_NAMES`.
    fn to_vec(&self) -> Vec<f64> {
        [
            self.age,
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
        .iter()
        .map(|&x| f64::from(x))
        .collect()
    }
}

fn yes_no(s: &str) -> Result<u8, String> {
    match s {
        "1" => Ok(1),
        "2" => Ok(2),
        _ => Err(format!("expected 1 or 2, got {s}")),
    }
}

fn settings_from(cli: &Cli) -> covid_risk::Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(data) = &cli.data {
        settings.data_path = data.clone();
    }
    if let Some(rule) = cli.label_rule {
        settings.label_rule = Some(rule);
    }
    if let Some(cap) = cli.sample_cap {
        settings.sample_cap = cap;
    }
    if let Some(seed) = cli.seed {
        settings.seed = seed;
    }
    if let Some(secs) = cli.timeout_secs {
        settings.train_timeout_secs = Some(secs);
    }
    Ok(settings)
}

/// Draws a horizontal bar chart of coefficients to `path`.
fn plot_coefficients(results: &[(&str, f64)], path: &Path) -> Result<(), Box<dyn Error>> {
    let count = results.len();
    let min_x = results.iter().map(|r| r.1).fold(0.0_f64, f64::min);
    let max_x = results.iter().map(|r| r.1).fold(0.0_f64, f64::max);
    let pad = ((max_x - min_x) * 0.1).max(1e-3);
    let x_range = (min_x - pad)..(max_x + pad);

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("High-risk coefficients", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(160)
        .build_cartesian_2d(x_range, 0..count)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| results.get(*idx).map(|r| r.0.to_string()).unwrap_or_default())
        .x_desc("Coefficient")
        .y_desc("Feature")
        .draw()?;

    chart.draw_series(results.iter().enumerate().map(|(i, &(_, coef))| {
        let start = 0.0_f64.min(coef);
        let end = 0.0_f64.max(coef);
        Rectangle::new([(start, i), (end, i + 1)], BLUE.mix(0.5).filled())
    }))?;

    root.present()?;
    Ok(())
}

fn report(model: &RiskClassifier, plot: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let results = model.coefficients()?;
    println!("{:<16} {:>10}", "intercept", format!("{:.4}", model.intercept()?));
    for (name, coef) in &results {
        println!("{:<16} {:>10.4}", name, coef);
    }
    if let Some(path) = plot {
        plot_coefficients(&results, path)?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let settings = settings_from(&cli)?;
    let model = state::initialize(&settings)?;

    match &cli.command {
        Commands::Predict(patient) => {
            let assessment = model.assess(&patient.to_vec())?;
            let pct = assessment.probability * 100.0;
            if assessment.high_risk {
                println!("High risk patient (probability: {pct:.2}%)");
            } else {
                println!("Low risk patient (probability: {pct:.2}%)");
            }
        }
        Commands::Coefficients { plot } => report(model, plot.as_deref())?,
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e}");
        process::exit(1);
    }
}
