#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

// ========================================================================================
//
//                       Command-line front end for the confound engine
//
// ========================================================================================
//
// Thin dispatch layer. Every subcommand resolves a record store and a config,
// calls into the library, and prints JSON to stdout. Logging goes to stderr.

use clap::{Args, CommandFactory, Parser, Subcommand};
use confound::{
    AdjustmentConfig, AdjustmentRequest, ControlSet, CsvYearStore, JsonYearStore, RecordStore,
    adjust, adjust_years, find_comparable_pair,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "confound",
    about = "Confounder-adjusted comparison of county health outcomes",
    long_about = "Compares drug death, suicide and unemployment rates between two counties \
                 after regressing out poverty, median income and urban/rural status across \
                 all counties of the same year."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Confounders to control for. None selected means raw values are reported.
#[derive(Args, Clone, Copy)]
struct ControlArgs {
    /// Control for the poverty rate
    #[arg(long)]
    poverty: bool,

    /// Control for median household income
    #[arg(long)]
    income: bool,

    /// Control for urban/rural classification
    #[arg(long)]
    urban_rural: bool,
}

impl From<ControlArgs> for ControlSet {
    fn from(args: ControlArgs) -> Self {
        ControlSet::new(args.poverty, args.income, args.urban_rural)
    }
}

#[derive(Args)]
struct SourceArgs {
    /// Directory of per-year JSON files, or a single year-keyed JSON file
    /// [default: public/data/years]
    #[arg(long, value_name = "PATH", conflicts_with = "csv")]
    data_dir: Option<PathBuf>,

    /// Merged county-year CSV with fips and Year columns
    #[arg(long, value_name = "FILE")]
    csv: Option<PathBuf>,

    /// TOML file overriding adjustment thresholds
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl SourceArgs {
    fn load_config(&self) -> Result<AdjustmentConfig, Box<dyn Error>> {
        match &self.config {
            Some(path) => {
                log::info!("Loading configuration from {}", path.display());
                Ok(AdjustmentConfig::load(path)?)
            }
            None => Ok(AdjustmentConfig::default()),
        }
    }

    fn open_store(&self, config: &AdjustmentConfig) -> Box<dyn RecordStore> {
        match (&self.csv, &self.data_dir) {
            (Some(csv), _) => Box::new(CsvYearStore::new(csv).with_config(config)),
            (None, Some(dir)) => Box::new(JsonYearStore::open(dir).with_config(config)),
            (None, None) => {
                Box::new(JsonYearStore::per_year(JsonYearStore::DEFAULT_DIR).with_config(config))
            }
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compare two counties in one year
    #[command(about = "Compare two counties, adjusted for the selected confounders")]
    Compare {
        /// First county FIPS code
        #[arg(value_name = "REGION_A")]
        region_a: String,

        /// Second county FIPS code
        #[arg(value_name = "REGION_B")]
        region_b: String,

        #[arg(long)]
        year: u16,

        #[command(flatten)]
        controls: ControlArgs,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Run the same comparison over several years
    #[command(about = "Compare two counties across several years")]
    Trend {
        #[arg(value_name = "REGION_A")]
        region_a: String,

        #[arg(value_name = "REGION_B")]
        region_b: String,

        /// Comma-separated list of years
        #[arg(long, value_delimiter = ',', required = true)]
        years: Vec<u16>,

        #[command(flatten)]
        controls: ControlArgs,

        #[command(flatten)]
        source: SourceArgs,
    },

    /// Find a pair of counties with complete data for a demonstration comparison
    #[command(about = "Print the first two counties with complete data for the selected controls")]
    Pair {
        #[arg(long)]
        year: u16,

        #[command(flatten)]
        controls: ControlArgs,

        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Serialize)]
struct ComparablePair<'a> {
    year: u16,
    region_a: &'a str,
    region_b: &'a str,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli { command } = Cli::parse();

    let result = match command {
        Some(Commands::Compare {
            region_a,
            region_b,
            year,
            controls,
            source,
        }) => run_compare(region_a, region_b, year, controls.into(), &source),
        Some(Commands::Trend {
            region_a,
            region_b,
            years,
            controls,
            source,
        }) => run_trend(&region_a, &region_b, &years, controls.into(), &source),
        Some(Commands::Pair {
            year,
            controls,
            source,
        }) => run_pair(year, controls.into(), &source),
        None => Cli::command().print_help().map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_compare(
    region_a: String,
    region_b: String,
    year: u16,
    controls: ControlSet,
    source: &SourceArgs,
) -> Result<(), Box<dyn Error>> {
    let config = source.load_config()?;
    let store = source.open_store(&config);
    let request = AdjustmentRequest::new(region_a, region_b, year, controls);
    let report = adjust(&*store, &request, &config)?;
    if let Some(error) = report.error() {
        log::warn!("Comparison produced no results: {}", error);
    }
    print_json(&report)
}

fn run_trend(
    region_a: &str,
    region_b: &str,
    years: &[u16],
    controls: ControlSet,
    source: &SourceArgs,
) -> Result<(), Box<dyn Error>> {
    let config = source.load_config()?;
    let store = source.open_store(&config);
    let mut reports = BTreeMap::new();
    for (year, report) in adjust_years(&*store, region_a, region_b, years, controls, &config) {
        reports.insert(year, report?);
    }
    log::info!("Compared {} vs {} across {} year(s).", region_a, region_b, reports.len());
    print_json(&reports)
}

fn run_pair(year: u16, controls: ControlSet, source: &SourceArgs) -> Result<(), Box<dyn Error>> {
    let config = source.load_config()?;
    let store = source.open_store(&config);
    let dataset = store.load_year(year)?;
    let (a, b) = find_comparable_pair(&dataset.records, controls).ok_or_else(|| {
        format!(
            "No two counties in {} have a drug death rate and every selected confounder.",
            year
        )
    })?;
    print_json(&ComparablePair {
        year,
        region_a: &a.id,
        region_b: &b.id,
    })
}
