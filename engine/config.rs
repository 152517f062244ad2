//! Thresholds and policies of the adjustment engine.
//!
//! The sample-size floors have no derivation beyond the values the county
//! comparison has always used, so they live here instead of in the code paths.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Minimum number of regions with a primary outcome before any adjustment is attempted.
pub const DEFAULT_MIN_ELIGIBLE_REGIONS: usize = 50;
/// Minimum number of complete rows required to fit a regression.
pub const DEFAULT_MIN_REGRESSION_ROWS: usize = 30;
/// Relative tolerance on the diagonal of R below which the design is declared singular.
pub const DEFAULT_RANK_TOLERANCE: f64 = 1e-7;
/// Population at or above which a county is classified urban.
pub const DEFAULT_URBAN_POPULATION_THRESHOLD: f64 = 50_000.0;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdjustmentConfig {
    pub min_eligible_regions: usize,
    pub min_regression_rows: usize,
    /// When set, only regions with a known population strictly above this
    /// value enter the regression population.
    pub min_population: Option<f64>,
    pub rank_tolerance: f64,
    /// Fill a missing `urban_rural` from `Population` when records are loaded.
    pub derive_urban_rural: bool,
    pub urban_population_threshold: f64,
}

impl Default for AdjustmentConfig {
    fn default() -> Self {
        Self {
            min_eligible_regions: DEFAULT_MIN_ELIGIBLE_REGIONS,
            min_regression_rows: DEFAULT_MIN_REGRESSION_ROWS,
            min_population: None,
            rank_tolerance: DEFAULT_RANK_TOLERANCE,
            derive_urban_rural: false,
            urban_population_threshold: DEFAULT_URBAN_POPULATION_THRESHOLD,
        }
    }
}

impl AdjustmentConfig {
    /// Loads a configuration from a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_regression_rows == 0 {
            return Err(ConfigError::InvalidValue {
                field: "min_regression_rows",
                reason: "a regression needs at least one row".to_string(),
            });
        }
        if !self.rank_tolerance.is_finite() || self.rank_tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "rank_tolerance",
                reason: format!(
                    "must be a finite, non-negative number (got {})",
                    self.rank_tolerance
                ),
            });
        }
        if let Some(min_population) = self.min_population {
            if !min_population.is_finite() {
                return Err(ConfigError::InvalidValue {
                    field: "min_population",
                    reason: format!("must be finite (got {min_population})"),
                });
            }
        }
        if !self.urban_population_threshold.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "urban_population_threshold",
                reason: format!("must be finite (got {})", self.urban_population_threshold),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_document_yields_defaults() {
        let config = AdjustmentConfig::from_toml_str("").unwrap();
        assert_eq!(config, AdjustmentConfig::default());
        assert_eq!(config.min_eligible_regions, 50);
        assert_eq!(config.min_regression_rows, 30);
        assert!(config.min_population.is_none());
    }

    #[test]
    fn partial_document_overrides_only_named_keys() {
        let config = AdjustmentConfig::from_toml_str(
            "min_eligible_regions = 5\nmin_population = 10000.0\n",
        )
        .unwrap();
        assert_eq!(config.min_eligible_regions, 5);
        assert_eq!(config.min_regression_rows, DEFAULT_MIN_REGRESSION_ROWS);
        assert_eq!(config.min_population, Some(10_000.0));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = AdjustmentConfig::from_toml_str("min_rows = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError(_)));
    }

    #[test]
    fn zero_regression_floor_is_invalid() {
        let err = AdjustmentConfig::from_toml_str("min_regression_rows = 0\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "min_regression_rows"),
            other => panic!("Expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn negative_rank_tolerance_is_invalid() {
        let err = AdjustmentConfig::from_toml_str("rank_tolerance = -1.0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "rank_tolerance", .. }
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "derive_urban_rural = true").unwrap();
        writeln!(file, "urban_population_threshold = 25000.0").unwrap();
        file.flush().unwrap();

        let config = AdjustmentConfig::load(file.path()).unwrap();
        assert!(config.derive_urban_rural);
        assert_eq!(config.urban_population_threshold, 25_000.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = AdjustmentConfig::load("/nonexistent/confound.toml").unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
