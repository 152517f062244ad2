//! # Region Records
//!
//! The data model shared by every stage of the adjustment: one county for one
//! year, with its outcome measurements and its confounder values. Records are
//! produced by a [`crate::store::RecordStore`] and are never mutated by the
//! adjustment engine.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// An outcome metric that can be compared between two regions.
///
/// The declaration order is the canonical reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    DrugDeathRate,
    SuicideRate,
    UnemploymentRate,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [
        Outcome::DrugDeathRate,
        Outcome::SuicideRate,
        Outcome::UnemploymentRate,
    ];

    /// The field name of this outcome in the year datasets.
    pub fn name(self) -> &'static str {
        match self {
            Outcome::DrugDeathRate => "DrugDeathRate",
            Outcome::SuicideRate => "SuicideRate",
            Outcome::UnemploymentRate => "UnemploymentRate",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a confounder enters the design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfounderKind {
    /// Used as-is; missing target values are mean-imputed.
    Continuous,
    /// Indicator of the high category; missing target values are mode-imputed.
    Categorical,
}

/// A variable whose influence is removed before two regions are compared.
///
/// The declaration order is the column order of the design matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confounder {
    PovertyRate,
    MedianIncome,
    #[serde(rename = "urban_rural")]
    UrbanRural,
}

impl Confounder {
    pub const ALL: [Confounder; 3] = [
        Confounder::PovertyRate,
        Confounder::MedianIncome,
        Confounder::UrbanRural,
    ];

    /// The field name of this confounder in the year datasets.
    pub fn name(self) -> &'static str {
        match self {
            Confounder::PovertyRate => "PovertyRate",
            Confounder::MedianIncome => "MedianIncome",
            Confounder::UrbanRural => "urban_rural",
        }
    }

    pub fn kind(self) -> ConfounderKind {
        match self {
            Confounder::PovertyRate | Confounder::MedianIncome => ConfounderKind::Continuous,
            Confounder::UrbanRural => ConfounderKind::Categorical,
        }
    }
}

impl fmt::Display for Confounder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Urban/rural status of a county.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrbanRural {
    Urban,
    Rural,
}

impl UrbanRural {
    /// The designated high category, encoded as 1.
    pub const HIGH: UrbanRural = UrbanRural::Urban;
    /// The designated low category, encoded as 0 and used when nothing else is known.
    pub const LOW: UrbanRural = UrbanRural::Rural;

    /// Binary covariate encoding: 1 for the high category, 0 otherwise.
    pub fn indicator(self) -> f64 {
        if self == Self::HIGH { 1.0 } else { 0.0 }
    }

    /// Population-based classification (metropolitan cut-off).
    pub fn from_population(population: f64, urban_threshold: f64) -> Self {
        if population >= urban_threshold {
            UrbanRural::Urban
        } else {
            UrbanRural::Rural
        }
    }
}

/// A raw confounder value as read from a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfounderValue {
    Continuous(f64),
    Category(UrbanRural),
}

/// One region for one year.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RegionRecord {
    /// Canonical region identifier (FIPS code).
    #[serde(rename = "fips", deserialize_with = "deserialize_region_id")]
    pub id: String,
    #[serde(rename = "DrugDeathRate", default)]
    pub drug_death_rate: Option<f64>,
    #[serde(rename = "SuicideRate", default)]
    pub suicide_rate: Option<f64>,
    #[serde(rename = "UnemploymentRate", default)]
    pub unemployment_rate: Option<f64>,
    #[serde(rename = "PovertyRate", default)]
    pub poverty_rate: Option<f64>,
    #[serde(rename = "MedianIncome", default)]
    pub median_income: Option<f64>,
    #[serde(rename = "Population", default)]
    pub population: Option<f64>,
    #[serde(rename = "urban_rural", default)]
    pub urban_rural: Option<UrbanRural>,
}

impl RegionRecord {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self {
            id: canonical_region_id(id.as_ref()),
            ..Self::default()
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome, value: f64) -> Self {
        *self.outcome_slot(outcome) = Some(value);
        self
    }

    pub fn with_poverty_rate(mut self, value: f64) -> Self {
        self.poverty_rate = Some(value);
        self
    }

    pub fn with_median_income(mut self, value: f64) -> Self {
        self.median_income = Some(value);
        self
    }

    pub fn with_urban_rural(mut self, value: UrbanRural) -> Self {
        self.urban_rural = Some(value);
        self
    }

    pub fn with_population(mut self, value: f64) -> Self {
        self.population = Some(value);
        self
    }

    /// The observed value of `outcome`, if present and finite.
    pub fn outcome(&self, outcome: Outcome) -> Option<f64> {
        let value = match outcome {
            Outcome::DrugDeathRate => self.drug_death_rate,
            Outcome::SuicideRate => self.suicide_rate,
            Outcome::UnemploymentRate => self.unemployment_rate,
        };
        value.filter(|v| v.is_finite())
    }

    /// The raw value of `confounder`, if present (and finite, for continuous ones).
    pub fn confounder(&self, confounder: Confounder) -> Option<ConfounderValue> {
        match confounder {
            Confounder::PovertyRate => finite(self.poverty_rate).map(ConfounderValue::Continuous),
            Confounder::MedianIncome => finite(self.median_income).map(ConfounderValue::Continuous),
            Confounder::UrbanRural => self.urban_rural.map(ConfounderValue::Category),
        }
    }

    pub fn population(&self) -> Option<f64> {
        finite(self.population)
    }

    /// True for county-level identifiers; state and national aggregates use codes up to 1000.
    pub fn is_county_level(&self) -> bool {
        self.id.parse::<u64>().is_ok_and(|code| code > 1000)
    }

    fn outcome_slot(&mut self, outcome: Outcome) -> &mut Option<f64> {
        match outcome {
            Outcome::DrugDeathRate => &mut self.drug_death_rate,
            Outcome::SuicideRate => &mut self.suicide_rate,
            Outcome::UnemploymentRate => &mut self.unemployment_rate,
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// Canonical form of a region identifier.
///
/// Identifiers are trimmed; purely numeric identifiers lose their leading
/// zeros so that `"01001"` and `1001` name the same county.
pub fn canonical_region_id(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        let stripped = trimmed.trim_start_matches('0');
        if stripped.is_empty() {
            "0".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        trimmed.to_string()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRegionId {
    Integer(i64),
    Float(f64),
    Text(String),
}

/// Accepts identifiers stored as strings, integers or integral floats.
pub(crate) fn deserialize_region_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match RawRegionId::deserialize(deserializer)? {
        RawRegionId::Integer(code) => Ok(canonical_region_id(&code.to_string())),
        RawRegionId::Float(code) if code.is_finite() && code.fract() == 0.0 && code >= 0.0 => {
            Ok(canonical_region_id(&format!("{}", code as u64)))
        }
        RawRegionId::Float(code) => Err(D::Error::custom(format!(
            "region identifier {code} is not a whole number"
        ))),
        RawRegionId::Text(text) => Ok(canonical_region_id(&text)),
    }
}
