//! # Region Record Stores
//!
//! Providers of year datasets. The adjustment engine only needs a complete,
//! read-only list of records for one year; these stores read that list from the
//! files the data-preparation pipeline writes:
//!
//! - `JsonYearStore`: a directory of `<year>.json` arrays, or one combined
//!   JSON object mapping each year to its array.
//! - `CsvYearStore`: a merged county-year CSV with a `Year` column.
//! - `MemoryStore`: records already in memory.
//!
//! A store either returns the whole year or fails. There are no partial reads.

use crate::config::AdjustmentConfig;
use crate::record::{RegionRecord, UrbanRural, canonical_region_id, deserialize_region_id};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read dataset '{}': {source}", .path.display())]
    IoError { path: PathBuf, source: io::Error },

    #[error("Failed to parse JSON dataset '{}': {source}", .path.display())]
    JsonError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to parse CSV dataset '{}': {source}", .path.display())]
    CsvError { path: PathBuf, source: csv::Error },

    #[error("No records are available for year {0}.")]
    YearNotFound(u16),
}

/// All records of one year, in provider order.
#[derive(Debug, Clone, PartialEq)]
pub struct YearDataset {
    pub year: u16,
    pub records: Vec<RegionRecord>,
}

impl YearDataset {
    pub fn new(year: u16, records: Vec<RegionRecord>) -> Self {
        Self { year, records }
    }

    /// First record whose identifier equals the canonical form of `id`.
    pub fn find(&self, id: &str) -> Option<&RegionRecord> {
        find_record(&self.records, id)
    }
}

pub(crate) fn find_record<'a>(records: &'a [RegionRecord], id: &str) -> Option<&'a RegionRecord> {
    let wanted = canonical_region_id(id);
    records.iter().find(|record| record.id == wanted)
}

/// Source of year datasets.
///
/// Implementations are shared across threads; loading must not mutate the store.
pub trait RecordStore: Send + Sync {
    fn load_year(&self, year: u16) -> Result<YearDataset, StoreError>;
}

/// Fills a missing urban/rural status from population.
///
/// Returns the number of records that were classified.
pub fn derive_urban_rural(records: &mut [RegionRecord], urban_threshold: f64) -> usize {
    let mut classified = 0;
    for record in records.iter_mut().filter(|r| r.urban_rural.is_none()) {
        if let Some(population) = record.population() {
            record.urban_rural = Some(UrbanRural::from_population(population, urban_threshold));
            classified += 1;
        }
    }
    classified
}

/// Population threshold for provider-side urban/rural derivation, if enabled.
fn derivation_threshold(config: &AdjustmentConfig) -> Option<f64> {
    config
        .derive_urban_rural
        .then_some(config.urban_population_threshold)
}

fn finish_loading(
    year: u16,
    mut records: Vec<RegionRecord>,
    urban_threshold: Option<f64>,
) -> YearDataset {
    if let Some(threshold) = urban_threshold {
        let classified = derive_urban_rural(&mut records, threshold);
        log::info!(
            "Derived urban/rural status for {} of {} records in {} (threshold {}).",
            classified,
            records.len(),
            year,
            threshold
        );
    }
    log::debug!("Loaded {} records for {}.", records.len(), year);
    YearDataset::new(year, records)
}

fn read_text(path: &Path) -> Result<String, StoreError> {
    fs::read_to_string(path).map_err(|source| StoreError::IoError {
        path: path.to_path_buf(),
        source,
    })
}

// ----------------------------------------------------------------------------
// JSON files
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum JsonLayout {
    /// `<dir>/<year>.json`, each a JSON array of records.
    PerYear(PathBuf),
    /// One file holding `{ "<year>": [records...], ... }`.
    Combined(PathBuf),
}

/// JSON-backed store in the layout the map front-end consumes.
#[derive(Debug, Clone)]
pub struct JsonYearStore {
    layout: JsonLayout,
    urban_threshold: Option<f64>,
}

impl JsonYearStore {
    pub const DEFAULT_DIR: &'static str = "public/data/years";

    /// Store over a directory of per-year files.
    pub fn per_year(dir: impl Into<PathBuf>) -> Self {
        Self {
            layout: JsonLayout::PerYear(dir.into()),
            urban_threshold: None,
        }
    }

    /// Store over one combined year-keyed file.
    pub fn combined(file: impl Into<PathBuf>) -> Self {
        Self {
            layout: JsonLayout::Combined(file.into()),
            urban_threshold: None,
        }
    }

    /// Chooses the layout from what `path` is: a directory or a single file.
    ///
    /// A path that does not exist is taken as a directory, so loading from it
    /// fails with an I/O error naming the path.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_file() {
            Self::combined(path)
        } else {
            Self::per_year(path)
        }
    }

    pub fn with_config(mut self, config: &AdjustmentConfig) -> Self {
        self.urban_threshold = derivation_threshold(config);
        self
    }
}

impl RecordStore for JsonYearStore {
    fn load_year(&self, year: u16) -> Result<YearDataset, StoreError> {
        let records = match &self.layout {
            JsonLayout::PerYear(dir) => {
                let path = dir.join(format!("{year}.json"));
                let text = match fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) if e.kind() == io::ErrorKind::NotFound && !dir.is_dir() => {
                        return Err(StoreError::IoError {
                            path: dir.clone(),
                            source: io::Error::new(
                                io::ErrorKind::NotFound,
                                "data directory does not exist",
                            ),
                        });
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        return Err(StoreError::YearNotFound(year));
                    }
                    Err(source) => return Err(StoreError::IoError { path, source }),
                };
                serde_json::from_str::<Vec<RegionRecord>>(&text)
                    .map_err(|source| StoreError::JsonError { path, source })?
            }
            JsonLayout::Combined(path) => {
                let text = read_text(path)?;
                let mut by_year: HashMap<String, Vec<RegionRecord>> = serde_json::from_str(&text)
                    .map_err(|source| StoreError::JsonError {
                        path: path.clone(),
                        source,
                    })?;
                by_year
                    .remove(&year.to_string())
                    .ok_or(StoreError::YearNotFound(year))?
            }
        };
        Ok(finish_loading(year, records, self.urban_threshold))
    }
}

// ----------------------------------------------------------------------------
// Merged CSV
// ----------------------------------------------------------------------------

/// One row of the merged county-year CSV. Unparseable cells (`NA`, `Suppressed`,
/// blanks) read as absent.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(deserialize_with = "deserialize_region_id")]
    fips: String,
    #[serde(rename = "Year", default, deserialize_with = "csv::invalid_option")]
    year: Option<f64>,
    #[serde(rename = "DrugDeathRate", default, deserialize_with = "csv::invalid_option")]
    drug_death_rate: Option<f64>,
    #[serde(rename = "SuicideRate", default, deserialize_with = "csv::invalid_option")]
    suicide_rate: Option<f64>,
    #[serde(rename = "UnemploymentRate", default, deserialize_with = "csv::invalid_option")]
    unemployment_rate: Option<f64>,
    #[serde(rename = "PovertyRate", default, deserialize_with = "csv::invalid_option")]
    poverty_rate: Option<f64>,
    #[serde(rename = "MedianIncome", default, deserialize_with = "csv::invalid_option")]
    median_income: Option<f64>,
    #[serde(rename = "Population", default, deserialize_with = "csv::invalid_option")]
    population: Option<f64>,
    #[serde(rename = "urban_rural", default, deserialize_with = "csv::invalid_option")]
    urban_rural: Option<UrbanRural>,
}

impl From<CsvRow> for RegionRecord {
    fn from(row: CsvRow) -> Self {
        RegionRecord {
            id: row.fips,
            drug_death_rate: row.drug_death_rate,
            suicide_rate: row.suicide_rate,
            unemployment_rate: row.unemployment_rate,
            poverty_rate: row.poverty_rate,
            median_income: row.median_income,
            population: row.population,
            urban_rural: row.urban_rural,
        }
    }
}

/// Store over a merged county-year CSV (comma separated, with a header row).
#[derive(Debug, Clone)]
pub struct CsvYearStore {
    path: PathBuf,
    urban_threshold: Option<f64>,
}

impl CsvYearStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            urban_threshold: None,
        }
    }

    pub fn with_config(mut self, config: &AdjustmentConfig) -> Self {
        self.urban_threshold = derivation_threshold(config);
        self
    }

    fn csv_error(&self, source: csv::Error) -> StoreError {
        StoreError::CsvError {
            path: self.path.clone(),
            source,
        }
    }
}

impl RecordStore for CsvYearStore {
    fn load_year(&self, year: u16) -> Result<YearDataset, StoreError> {
        let file = fs::File::open(&self.path).map_err(|source| StoreError::IoError {
            path: self.path.clone(),
            source,
        })?;
        let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file);

        let mut records = Vec::new();
        for row in reader.deserialize::<CsvRow>() {
            let row = row.map_err(|e| self.csv_error(e))?;
            if row.year == Some(f64::from(year)) {
                records.push(RegionRecord::from(row));
            }
        }
        if records.is_empty() {
            return Err(StoreError::YearNotFound(year));
        }
        Ok(finish_loading(year, records, self.urban_threshold))
    }
}

// ----------------------------------------------------------------------------
// In memory
// ----------------------------------------------------------------------------

/// Year datasets held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    years: BTreeMap<u16, Vec<RegionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, year: u16, records: Vec<RegionRecord>) {
        self.years.insert(year, records);
    }

    pub fn with_year(mut self, year: u16, records: Vec<RegionRecord>) -> Self {
        self.insert(year, records);
        self
    }

    pub fn years(&self) -> impl Iterator<Item = u16> + '_ {
        self.years.keys().copied()
    }
}

impl RecordStore for MemoryStore {
    fn load_year(&self, year: u16) -> Result<YearDataset, StoreError> {
        self.years
            .get(&year)
            .map(|records| YearDataset::new(year, records.clone()))
            .ok_or(StoreError::YearNotFound(year))
    }
}
