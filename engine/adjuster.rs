//! Centered residualization of the two target regions.
//!
//! Each target's observed value is shifted by how far its own prediction lies
//! from the population's average prediction:
//!
//! `adjusted = raw - (x_target . b - mean(X b))`
//!
//! The shift has mean zero over the regression population, so the outcome keeps
//! its units and its population level.

use crate::regression::LinearFit;
use ndarray::{ArrayView1, ArrayView2};

/// Adjusted values for one target region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetAdjustment {
    pub raw: f64,
    pub predicted: f64,
    pub adjusted: f64,
    /// `|adjusted - raw| / raw * 100`, or 0 when `raw` is 0.
    pub adjustment_pct: f64,
}

/// Adjusted values for both targets of a comparison, sharing one population mean prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairAdjustment {
    pub mean_predicted: f64,
    pub a: TargetAdjustment,
    pub b: TargetAdjustment,
}

/// Mean of the fitted values over every row of the design.
pub fn mean_prediction(fit: &LinearFit, x: ArrayView2<f64>) -> f64 {
    fit.predict_all(x).mean().unwrap_or(0.0)
}

pub fn residualize(raw: f64, predicted: f64, mean_predicted: f64) -> f64 {
    raw - (predicted - mean_predicted)
}

/// Magnitude of the adjustment relative to the raw value, in percent.
pub fn adjustment_pct(raw: f64, adjusted: f64) -> f64 {
    if raw == 0.0 {
        0.0
    } else {
        ((adjusted - raw) / raw * 100.0).abs()
    }
}

fn adjust_target(
    fit: &LinearFit,
    covariates: ArrayView1<f64>,
    raw: f64,
    mean_predicted: f64,
) -> TargetAdjustment {
    let predicted = fit.predict(covariates);
    let adjusted = residualize(raw, predicted, mean_predicted);
    TargetAdjustment {
        raw,
        predicted,
        adjusted,
        adjustment_pct: adjustment_pct(raw, adjusted),
    }
}

/// Residualizes both targets against the population design `x`.
///
/// `x_a` and `x_b` are the targets' encoded covariate rows, intercept included.
pub fn adjust_pair(
    fit: &LinearFit,
    x: ArrayView2<f64>,
    x_a: ArrayView1<f64>,
    raw_a: f64,
    x_b: ArrayView1<f64>,
    raw_b: f64,
) -> PairAdjustment {
    let mean_predicted = mean_prediction(fit, x);
    PairAdjustment {
        mean_predicted,
        a: adjust_target(fit, x_a, raw_a, mean_predicted),
        b: adjust_target(fit, x_b, raw_b, mean_predicted),
    }
}
