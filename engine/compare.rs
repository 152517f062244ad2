//! # Adjusted Comparison
//!
//! Orchestrates one comparison request over a year dataset:
//!
//! 1. Sufficiency gate on the whole dataset.
//! 2. Resolution of both target regions.
//! 3. For each outcome independently: eligibility, design matrix, OLS fit and
//!    residualization of the two targets.
//! 4. Assembly of the report.
//!
//! Every function here is a pure function of its inputs. Requests may run
//! concurrently over the same dataset.

use crate::adjuster::adjust_pair;
use crate::config::AdjustmentConfig;
use crate::eligibility::{eligible_population, eligible_region_count};
use crate::encode::{build_design, encode_target};
use crate::record::{Confounder, Outcome, RegionRecord};
use crate::regression::fit_least_squares;
use crate::result::{
    AdjustmentReport, OutcomeAdjustment, OutcomeFailure, RequestError, assemble_outcome,
};
use crate::store::{RecordStore, StoreError, find_record};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which confounders a request controls for. Each toggle is independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSet {
    pub poverty: bool,
    pub income: bool,
    pub urban_rural: bool,
}

impl ControlSet {
    pub fn new(poverty: bool, income: bool, urban_rural: bool) -> Self {
        Self {
            poverty,
            income,
            urban_rural,
        }
    }

    pub fn all() -> Self {
        Self::new(true, true, true)
    }

    /// The enabled confounders in design column order.
    pub fn confounders(&self) -> Vec<Confounder> {
        Confounder::ALL
            .into_iter()
            .filter(|confounder| match confounder {
                Confounder::PovertyRate => self.poverty,
                Confounder::MedianIncome => self.income,
                Confounder::UrbanRural => self.urban_rural,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        !(self.poverty || self.income || self.urban_rural)
    }
}

/// A comparison of two regions in one year.
///
/// The two identifiers are expected to differ but this is not enforced: a
/// region compared with itself yields identical A and B values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRequest {
    pub region_a: String,
    pub region_b: String,
    pub year: u16,
    pub controls: ControlSet,
}

impl AdjustmentRequest {
    pub fn new(
        region_a: impl Into<String>,
        region_b: impl Into<String>,
        year: u16,
        controls: ControlSet,
    ) -> Self {
        Self {
            region_a: region_a.into(),
            region_b: region_b.into(),
            year,
            controls,
        }
    }
}

/// Runs a comparison against the year dataset loaded from `store`.
///
/// Only a failure of the store itself is an `Err`; insufficient data and unknown
/// regions are reported inside the returned report.
pub fn adjust<S>(
    store: &S,
    request: &AdjustmentRequest,
    config: &AdjustmentConfig,
) -> Result<AdjustmentReport, StoreError>
where
    S: RecordStore + ?Sized,
{
    let dataset = store.load_year(request.year)?;
    Ok(adjust_dataset(&dataset.records, request, config))
}

/// Runs the same comparison for several years in parallel, keyed by year.
pub fn adjust_years<S>(
    store: &S,
    region_a: &str,
    region_b: &str,
    years: &[u16],
    controls: ControlSet,
    config: &AdjustmentConfig,
) -> BTreeMap<u16, Result<AdjustmentReport, StoreError>>
where
    S: RecordStore + ?Sized,
{
    years
        .iter()
        .copied()
        .unique()
        .collect::<Vec<_>>()
        .into_par_iter()
        .map(|year| {
            let request = AdjustmentRequest::new(region_a, region_b, year, controls);
            (year, adjust(store, &request, config))
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// The comparison core over an in-memory year of records.
pub fn adjust_dataset(
    records: &[RegionRecord],
    request: &AdjustmentRequest,
    config: &AdjustmentConfig,
) -> AdjustmentReport {
    log::info!(
        "Comparing {} vs {} for {} ({} records, controls: {:?}).",
        request.region_a,
        request.region_b,
        request.year,
        records.len(),
        request.controls
    );

    let counties_available = eligible_region_count(records, config);
    if counties_available < config.min_eligible_regions {
        log::warn!(
            "Only {} regions are eligible (minimum {}); no adjustment attempted.",
            counties_available,
            config.min_eligible_regions
        );
        return AdjustmentReport::Failed(RequestError::InsufficientData { counties_available });
    }

    let target_a = find_record(records, &request.region_a);
    let target_b = find_record(records, &request.region_b);
    let (Some(target_a), Some(target_b)) = (target_a, target_b) else {
        let missing: Vec<String> = [(&request.region_a, target_a), (&request.region_b, target_b)]
            .into_iter()
            .filter(|(_, found)| found.is_none())
            .map(|(id, _)| id.clone())
            .unique()
            .collect();
        log::warn!("Unknown region identifier(s): {}", missing.join(", "));
        return AdjustmentReport::Failed(RequestError::CountyNotFound { missing });
    };

    let confounders = request.controls.confounders();
    let results: BTreeMap<Outcome, _> = Outcome::ALL
        .into_iter()
        .map(|outcome| {
            let computed =
                adjust_outcome(records, outcome, target_a, target_b, &confounders, config);
            if let Err(failure) = &computed {
                log::warn!("{}: {}", outcome, failure);
            }
            let result = assemble_outcome(
                target_a.outcome(outcome),
                target_b.outcome(outcome),
                computed,
            );
            (outcome, result)
        })
        .collect();

    AdjustmentReport::Outcomes(results)
}

/// Adjusts both targets for one outcome. Failures stay local to this outcome.
fn adjust_outcome(
    records: &[RegionRecord],
    outcome: Outcome,
    target_a: &RegionRecord,
    target_b: &RegionRecord,
    confounders: &[Confounder],
    config: &AdjustmentConfig,
) -> Result<OutcomeAdjustment, OutcomeFailure> {
    let (Some(raw_a), Some(raw_b)) = (target_a.outcome(outcome), target_b.outcome(outcome)) else {
        return Err(OutcomeFailure::MissingTargetValue);
    };

    if confounders.is_empty() {
        return Ok(OutcomeAdjustment::Uncontrolled { raw_a, raw_b });
    }

    let population = eligible_population(records, outcome, config);
    let design = build_design(&population, outcome, confounders);
    let n_counties = design.n_rows();
    log::debug!(
        "{}: {} eligible regions, {} complete rows for {} confounder(s).",
        outcome,
        population.len(),
        n_counties,
        confounders.len()
    );

    if n_counties < config.min_regression_rows {
        return Err(OutcomeFailure::InsufficientSample { n: n_counties });
    }

    let fit = fit_least_squares(design.x.view(), design.y.view(), config.rank_tolerance)
        .map_err(|e| {
            log::warn!("{}: least-squares fit rejected: {}", outcome, e);
            OutcomeFailure::RegressionFailed
        })?;

    let x_a = encode_target(target_a, confounders, &population);
    let x_b = encode_target(target_b, confounders, &population);
    let pair = adjust_pair(&fit, design.x.view(), x_a.view(), raw_a, x_b.view(), raw_b);

    Ok(OutcomeAdjustment::Adjusted {
        pair,
        n_counties,
        confounders: confounders.to_vec(),
    })
}

/// The first two distinct county-level regions, in dataset order, that report
/// the primary outcome and every confounder in `controls`.
pub fn find_comparable_pair<'a>(
    records: &'a [RegionRecord],
    controls: ControlSet,
) -> Option<(&'a RegionRecord, &'a RegionRecord)> {
    let confounders = controls.confounders();
    let mut candidates = records
        .iter()
        .filter(|record| record.is_county_level())
        .filter(|record| record.outcome(Outcome::DrugDeathRate).is_some())
        .filter(|record| confounders.iter().all(|&c| record.confounder(c).is_some()))
        .unique_by(|record| record.id.clone());
    let first = candidates.next()?;
    let second = candidates.next()?;
    Some((first, second))
}
