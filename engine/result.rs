//! # Result Assembly
//!
//! Formats what the engine computed into the comparison report returned to
//! callers. Each outcome is computed as an explicit `Result`, so one outcome's
//! failure is recorded as a note on that outcome and never touches the others.
//! Request-wide failures replace the whole report with an error object.
//!
//! Values are rounded to 2 decimals and percentages to 1 decimal here, after all
//! arithmetic is done on unrounded numbers.

use crate::adjuster::PairAdjustment;
use crate::record::{Confounder, Outcome};
use itertools::Itertools;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why an outcome could not be adjusted. The message is the outcome's note.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutcomeFailure {
    #[error("Missing data")]
    MissingTargetValue,
    #[error("Insufficient data (n={n})")]
    InsufficientSample { n: usize },
    #[error("Regression failed (multicollinearity?)")]
    RegressionFailed,
}

/// Why a whole request produced no outcome results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Insufficient data for statistical adjustment")]
    InsufficientData { counties_available: usize },
    #[error("County not found")]
    CountyNotFound { missing: Vec<String> },
}

/// What the engine produced for an outcome it could compute.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeAdjustment {
    /// No confounders were requested; adjusted values are the raw values.
    Uncontrolled { raw_a: f64, raw_b: f64 },
    /// A regression was fitted and both targets residualized.
    Adjusted {
        pair: PairAdjustment,
        n_counties: usize,
        confounders: Vec<Confounder>,
    },
}

pub const NO_CONTROLS_NOTE: &str = "No controls applied";

/// The reported comparison of one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeResult {
    pub raw_a: Option<f64>,
    pub raw_b: Option<f64>,
    pub adjusted_a: Option<f64>,
    pub adjusted_b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_pct_a: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjustment_pct_b: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_counties: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confounders: Option<Vec<Confounder>>,
    pub adjustment_note: String,
}

/// The full answer to one adjustment request.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentReport {
    /// One result per outcome, in canonical outcome order.
    Outcomes(BTreeMap<Outcome, OutcomeResult>),
    Failed(RequestError),
}

impl AdjustmentReport {
    pub fn outcome(&self, outcome: Outcome) -> Option<&OutcomeResult> {
        match self {
            AdjustmentReport::Outcomes(results) => results.get(&outcome),
            AdjustmentReport::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&RequestError> {
        match self {
            AdjustmentReport::Outcomes(_) => None,
            AdjustmentReport::Failed(error) => Some(error),
        }
    }
}

impl Serialize for AdjustmentReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AdjustmentReport::Outcomes(results) => results.serialize(serializer),
            AdjustmentReport::Failed(error) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("error", &error.to_string())?;
                match error {
                    RequestError::InsufficientData { counties_available } => {
                        map.serialize_entry("counties_available", counties_available)?;
                    }
                    RequestError::CountyNotFound { missing } => {
                        map.serialize_entry("missing", missing)?;
                    }
                }
                map.end()
            }
        }
    }
}

/// Rounds to `decimals` places, sending exact ties to the even neighbour.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10_f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

fn round_value(value: f64) -> f64 {
    round_to(value, 2)
}

fn round_pct(value: f64) -> f64 {
    round_to(value, 1)
}

/// Note attached to a successful regression adjustment.
pub fn adjusted_note(confounders: &[Confounder]) -> String {
    format!("Adjusted for: {}", confounders.iter().map(|c| c.name()).join(", "))
}

/// Formats one outcome's computation into its reported form.
pub fn assemble_outcome(
    raw_a: Option<f64>,
    raw_b: Option<f64>,
    computed: Result<OutcomeAdjustment, OutcomeFailure>,
) -> OutcomeResult {
    match computed {
        Ok(OutcomeAdjustment::Uncontrolled { raw_a, raw_b }) => OutcomeResult {
            raw_a: Some(round_value(raw_a)),
            raw_b: Some(round_value(raw_b)),
            adjusted_a: Some(round_value(raw_a)),
            adjusted_b: Some(round_value(raw_b)),
            adjustment_pct_a: None,
            adjustment_pct_b: None,
            n_counties: None,
            confounders: None,
            adjustment_note: NO_CONTROLS_NOTE.to_string(),
        },
        Ok(OutcomeAdjustment::Adjusted {
            pair,
            n_counties,
            confounders,
        }) => OutcomeResult {
            raw_a: Some(round_value(pair.a.raw)),
            raw_b: Some(round_value(pair.b.raw)),
            adjusted_a: Some(round_value(pair.a.adjusted)),
            adjusted_b: Some(round_value(pair.b.adjusted)),
            adjustment_pct_a: Some(round_pct(pair.a.adjustment_pct)),
            adjustment_pct_b: Some(round_pct(pair.b.adjustment_pct)),
            n_counties: Some(n_counties),
            adjustment_note: adjusted_note(&confounders),
            confounders: Some(confounders),
        },
        Err(failure) => OutcomeResult {
            raw_a: raw_a.map(round_value),
            raw_b: raw_b.map(round_value),
            adjusted_a: None,
            adjusted_b: None,
            adjustment_pct_a: None,
            adjustment_pct_b: None,
            n_counties: None,
            confounders: None,
            adjustment_note: failure.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adjuster::TargetAdjustment;
    use serde_json::json;

    fn pair() -> PairAdjustment {
        PairAdjustment {
            mean_predicted: 14.5,
            a: TargetAdjustment {
                raw: 30.004,
                predicted: 22.0,
                adjusted: 22.50449,
                adjustment_pct: 24.99621,
            },
            b: TargetAdjustment {
                raw: 0.0,
                predicted: 7.0,
                adjusted: 7.5,
                adjustment_pct: 0.0,
            },
        }
    }

    #[test]
    fn failure_notes_match_reported_text() {
        assert_eq!(OutcomeFailure::MissingTargetValue.to_string(), "Missing data");
        assert_eq!(
            OutcomeFailure::InsufficientSample { n: 5 }.to_string(),
            "Insufficient data (n=5)"
        );
        assert_eq!(
            OutcomeFailure::RegressionFailed.to_string(),
            "Regression failed (multicollinearity?)"
        );
    }

    #[test]
    fn adjusted_outcome_is_rounded_and_annotated() {
        let result = assemble_outcome(
            Some(30.004),
            Some(0.0),
            Ok(OutcomeAdjustment::Adjusted {
                pair: pair(),
                n_counties: 412,
                confounders: vec![Confounder::PovertyRate, Confounder::UrbanRural],
            }),
        );
        assert_eq!(result.raw_a, Some(30.0));
        assert_eq!(result.adjusted_a, Some(22.5));
        assert_eq!(result.adjustment_pct_a, Some(25.0));
        assert_eq!(result.adjustment_pct_b, Some(0.0));
        assert_eq!(result.n_counties, Some(412));
        assert_eq!(result.adjustment_note, "Adjusted for: PovertyRate, urban_rural");
    }

    #[test]
    fn failed_outcome_serializes_without_optional_fields() {
        let result = assemble_outcome(Some(12.346), None, Err(OutcomeFailure::MissingTargetValue));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "raw_a": 12.35,
                "raw_b": null,
                "adjusted_a": null,
                "adjusted_b": null,
                "adjustment_note": "Missing data"
            })
        );
    }

    #[test]
    fn uncontrolled_outcome_echoes_raw_values() {
        let result = assemble_outcome(
            Some(8.0),
            Some(9.5),
            Ok(OutcomeAdjustment::Uncontrolled { raw_a: 8.0, raw_b: 9.5 }),
        );
        assert_eq!(result.adjusted_a, result.raw_a);
        assert_eq!(result.adjusted_b, result.raw_b);
        assert_eq!(result.adjustment_note, NO_CONTROLS_NOTE);
        assert!(result.n_counties.is_none());
    }

    #[test]
    fn request_errors_serialize_as_error_objects() {
        let report = AdjustmentReport::Failed(RequestError::InsufficientData {
            counties_available: 40,
        });
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "error": "Insufficient data for statistical adjustment",
                "counties_available": 40
            })
        );

        let missing = AdjustmentReport::Failed(RequestError::CountyNotFound {
            missing: vec!["99999".to_string()],
        });
        let value = serde_json::to_value(&missing).unwrap();
        assert_eq!(value["error"], "County not found");
        assert_eq!(value["missing"], json!(["99999"]));
    }

    #[test]
    fn outcomes_serialize_in_canonical_order() {
        let mut results = BTreeMap::new();
        for outcome in [Outcome::UnemploymentRate, Outcome::DrugDeathRate, Outcome::SuicideRate] {
            results.insert(
                outcome,
                assemble_outcome(None, None, Err(OutcomeFailure::MissingTargetValue)),
            );
        }
        let text = serde_json::to_string(&AdjustmentReport::Outcomes(results)).unwrap();
        let drug = text.find("DrugDeathRate").unwrap();
        let suicide = text.find("SuicideRate").unwrap();
        let unemployment = text.find("UnemploymentRate").unwrap();
        assert!(drug < suicide && suicide < unemployment);
    }

    #[test]
    fn rounding_helper() {
        assert_eq!(round_to(2.344, 2), 2.34);
        assert_eq!(round_to(17.96, 1), 18.0);
    }

    #[test]
    fn exact_ties_round_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(12.25, 1), 12.2);
        assert_eq!(round_to(12.75, 1), 12.8);
        assert_eq!(round_to(-1.25, 1), -1.2);

        let result = assemble_outcome(
            Some(12.125),
            Some(0.125),
            Ok(OutcomeAdjustment::Uncontrolled {
                raw_a: 12.125,
                raw_b: 0.125,
            }),
        );
        assert_eq!(result.raw_a, Some(12.12));
        assert_eq!(result.adjusted_b, Some(0.12));
    }
}
