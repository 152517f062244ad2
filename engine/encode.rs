//! # Confounder Encoding
//!
//! Turns raw confounder values into regression covariates and assembles the
//! design matrix for one outcome.
//!
//! - Continuous confounders enter as-is. A target region missing one takes
//!   the mean over the eligible population.
//! - The urban/rural confounder enters as an indicator of `urban`. A target
//!   region missing it takes the most frequent category of the eligible
//!   population, or `rural` when nothing is known.
//! - Population rows missing any requested confounder are dropped from the
//!   design; imputation only ever applies to the two target regions.
//!
//! Imputation statistics are recomputed from the population slice on every
//! call. Nothing is cached.

use crate::record::{Confounder, ConfounderKind, ConfounderValue, Outcome, RegionRecord, UrbanRural};
use ndarray::{Array1, Array2};

/// Regression inputs for one outcome.
#[derive(Debug, Clone)]
pub struct DesignData {
    /// `[n_rows, 1 + n_confounders]`, the first column being the intercept.
    pub x: Array2<f64>,
    /// Observed outcome for each row of `x`.
    pub y: Array1<f64>,
}

impl DesignData {
    pub fn n_rows(&self) -> usize {
        self.y.len()
    }
}

/// Numeric covariate for a present raw value.
pub fn encode_value(value: ConfounderValue) -> f64 {
    match value {
        ConfounderValue::Continuous(v) => v,
        ConfounderValue::Category(category) => category.indicator(),
    }
}

/// Arithmetic mean of a continuous confounder over the regions that report it, 0 if none do.
pub fn population_mean(population: &[&RegionRecord], confounder: Confounder) -> f64 {
    let (sum, count) = population
        .iter()
        .filter_map(|record| match record.confounder(confounder) {
            Some(ConfounderValue::Continuous(v)) => Some(v),
            _ => None,
        })
        .fold((0.0_f64, 0_usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

/// Most frequent urban/rural category over the regions that report it.
///
/// Ties and empty populations resolve to the low category.
pub fn population_mode(population: &[&RegionRecord]) -> UrbanRural {
    let (urban, rural) = population
        .iter()
        .filter_map(|record| record.urban_rural)
        .fold((0_usize, 0_usize), |(urban, rural), category| match category {
            UrbanRural::Urban => (urban + 1, rural),
            UrbanRural::Rural => (urban, rural + 1),
        });
    if urban > rural { UrbanRural::Urban } else { UrbanRural::Rural }
}

/// Covariate substituted for a missing value of `confounder`.
pub fn imputed_covariate(population: &[&RegionRecord], confounder: Confounder) -> f64 {
    match confounder.kind() {
        ConfounderKind::Continuous => population_mean(population, confounder),
        ConfounderKind::Categorical => population_mode(population).indicator(),
    }
}

/// Covariate vector `[1, c_1, ..., c_k]` for a target region, imputing missing values
/// from `population`.
pub fn encode_target(
    record: &RegionRecord,
    confounders: &[Confounder],
    population: &[&RegionRecord],
) -> Array1<f64> {
    let mut row = Vec::with_capacity(confounders.len() + 1);
    row.push(1.0);
    for &confounder in confounders {
        let covariate = match record.confounder(confounder) {
            Some(value) => encode_value(value),
            None => {
                let fallback = imputed_covariate(population, confounder);
                log::debug!(
                    "Region {} has no {}; imputing {:.4} from {} eligible regions.",
                    record.id,
                    confounder,
                    fallback,
                    population.len()
                );
                fallback
            }
        };
        row.push(covariate);
    }
    Array1::from_vec(row)
}

/// Builds the design matrix and response for `outcome` from the complete rows of `population`.
pub fn build_design(
    population: &[&RegionRecord],
    outcome: Outcome,
    confounders: &[Confounder],
) -> DesignData {
    let n_cols = confounders.len() + 1;
    let mut flat = Vec::with_capacity(population.len() * n_cols);
    let mut y = Vec::with_capacity(population.len());

    'rows: for record in population {
        let Some(observed) = record.outcome(outcome) else {
            continue;
        };
        let start = flat.len();
        flat.push(1.0);
        for &confounder in confounders {
            match record.confounder(confounder) {
                Some(value) => flat.push(encode_value(value)),
                None => {
                    flat.truncate(start);
                    continue 'rows;
                }
            }
        }
        y.push(observed);
    }

    let n_rows = y.len();
    let x = Array2::from_shape_fn((n_rows, n_cols), |(i, j)| flat[i * n_cols + j]);
    DesignData {
        x,
        y: Array1::from_vec(y),
    }
}
