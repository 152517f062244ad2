//! # Ordinary Least Squares
//!
//! Fits `min ||X b - y||^2` for a design matrix with an intercept column.
//!
//! The solve never forms `X'X`. Columns are equilibrated to unit norm, a thin
//! Householder QR of the scaled design is taken, and the triangular system
//! `R b = Q'y` is back-substituted. A diagonal entry of `R` that is negligible
//! relative to the largest one means the columns are (numerically) linearly
//! dependent, and the fit is refused instead of returning arbitrary
//! coefficients.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::QR;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegressionError {
    #[error("Design matrix has {rows} rows but {cols} columns; the system is underdetermined.")]
    Underdetermined { rows: usize, cols: usize },

    #[error("Design column {column} is numerically dependent on the others (|R_jj| = {pivot:.3e}).")]
    RankDeficient { column: usize, pivot: f64 },

    #[error("Design and response lengths differ: {rows} rows vs {responses} responses.")]
    MismatchedLengths { rows: usize, responses: usize },

    #[error("Least-squares solution contains non-finite coefficients.")]
    NonFiniteSolution,

    #[error("QR decomposition failed: {0}")]
    LinalgError(#[from] ndarray_linalg::error::LinalgError),
}

/// Coefficients of a fitted linear model.
#[derive(Debug, Clone)]
pub struct LinearFit {
    /// `[intercept, b_1, ..., b_k]`, in design column order.
    pub coefficients: Array1<f64>,
}

impl LinearFit {
    /// Linear predictor for one covariate row (intercept entry included).
    pub fn predict(&self, row: ArrayView1<f64>) -> f64 {
        row.dot(&self.coefficients)
    }

    /// Linear predictor for every row of `x`.
    pub fn predict_all(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.dot(&self.coefficients)
    }
}

/// Least-squares fit of `y` on `x`.
///
/// `rank_tolerance` is relative: column `j` is rejected when
/// `|R_jj| <= rank_tolerance * max_i |R_ii|` after column equilibration.
pub fn fit_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    rank_tolerance: f64,
) -> Result<LinearFit, RegressionError> {
    let (rows, cols) = x.dim();
    if rows != y.len() {
        return Err(RegressionError::MismatchedLengths {
            rows,
            responses: y.len(),
        });
    }
    if rows < cols || cols == 0 {
        return Err(RegressionError::Underdetermined { rows, cols });
    }

    // Unit-norm columns so income in dollars and an indicator share one rank scale.
    let scales = x.map_axis(Axis(0), |column| column.dot(&column).sqrt());
    if let Some(column) = scales.iter().position(|&s| s == 0.0 || !s.is_finite()) {
        return Err(RegressionError::RankDeficient { column, pivot: 0.0 });
    }
    let scaled: Array2<f64> = &x / &scales.view().insert_axis(Axis(0));

    let (q, r) = scaled.qr()?;

    let max_pivot = r.diag().iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    for (column, &pivot) in r.diag().iter().enumerate() {
        if pivot.abs() <= rank_tolerance * max_pivot || !pivot.is_finite() {
            log::warn!(
                "Rank-deficient design: column {} has |R_jj| = {:.3e} (max {:.3e}).",
                column,
                pivot.abs(),
                max_pivot
            );
            return Err(RegressionError::RankDeficient {
                column,
                pivot: pivot.abs(),
            });
        }
    }

    let qty = q.t().dot(&y);
    let scaled_beta = back_substitute(&r, &qty);
    let coefficients = scaled_beta / &scales;

    if coefficients.iter().any(|b| !b.is_finite()) {
        return Err(RegressionError::NonFiniteSolution);
    }

    log::debug!(
        "OLS fit on {} rows x {} columns: coefficients {:?}",
        rows,
        cols,
        coefficients.to_vec()
    );
    Ok(LinearFit { coefficients })
}

/// Solves `R b = rhs` for upper-triangular `R` with a non-zero diagonal.
fn back_substitute(r: &Array2<f64>, rhs: &Array1<f64>) -> Array1<f64> {
    let n = r.ncols();
    let mut solution = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let tail: f64 = ((i + 1)..n).map(|j| r[[i, j]] * solution[j]).sum();
        solution[i] = (rhs[i] - tail) / r[[i, i]];
    }
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    const TOL: f64 = 1e-7;

    fn with_intercept(columns: &[Vec<f64>]) -> Array2<f64> {
        let n = columns[0].len();
        Array2::from_shape_fn((n, columns.len() + 1), |(i, j)| {
            if j == 0 { 1.0 } else { columns[j - 1][i] }
        })
    }

    #[test]
    fn recovers_exact_linear_relationship() {
        let poverty = vec![10.0, 20.0, 30.0, 40.0, 50.0];
        let x = with_intercept(&[poverty.clone()]);
        let y = Array1::from_iter(poverty.iter().map(|p| 0.5 * p));
        let fit = fit_least_squares(x.view(), y.view(), TOL).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn matches_normal_equations_on_noisy_data() {
        let x1 = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x2 = vec![0.0, 1.0, 0.0, 1.0, 1.0, 0.0];
        let y = array![2.1, 4.9, 5.8, 9.2, 10.1, 10.9];
        let x = with_intercept(&[x1, x2]);
        let fit = fit_least_squares(x.view(), y.view(), TOL).unwrap();

        // Residuals of a least-squares fit are orthogonal to every design column.
        let residuals = &y - &fit.predict_all(x.view());
        for column in x.columns() {
            assert_abs_diff_eq!(column.dot(&residuals), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn intercept_only_fit_is_the_mean() {
        let x = Array2::ones((4, 1));
        let y = array![1.0, 2.0, 3.0, 6.0];
        let fit = fit_least_squares(x.view(), y.view(), TOL).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn handles_columns_on_very_different_scales() {
        let income: Vec<f64> = (0..40).map(|i| 35_000.0 + 750.0 * i as f64).collect();
        let urban: Vec<f64> = (0..40).map(|i| (i % 3 == 0) as u8 as f64).collect();
        let y = Array1::from_iter(
            income
                .iter()
                .zip(&urban)
                .map(|(inc, u)| 4.0 - 0.0001 * inc + 2.5 * u),
        );
        let x = with_intercept(&[income, urban]);
        let fit = fit_least_squares(x.view(), y.view(), TOL).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 4.0, epsilon = 1e-8);
        assert_abs_diff_eq!(fit.coefficients[1], -0.0001, epsilon = 1e-12);
        assert_abs_diff_eq!(fit.coefficients[2], 2.5, epsilon = 1e-8);
    }

    #[test]
    fn constant_confounder_is_rank_deficient() {
        let x = with_intercept(&[vec![12.0; 8]]);
        let y = Array1::from_iter((0..8).map(|i| i as f64));
        let err = fit_least_squares(x.view(), y.view(), TOL).unwrap_err();
        assert!(matches!(err, RegressionError::RankDeficient { column: 1, .. }));
    }

    #[test]
    fn duplicated_column_is_rank_deficient() {
        let poverty: Vec<f64> = (0..10).map(|i| 5.0 + i as f64).collect();
        let doubled: Vec<f64> = poverty.iter().map(|p| 2.0 * p).collect();
        let x = with_intercept(&[poverty, doubled]);
        let y = Array1::from_iter((0..10).map(|i| (i * i) as f64));
        let err = fit_least_squares(x.view(), y.view(), TOL).unwrap_err();
        assert!(matches!(err, RegressionError::RankDeficient { .. }));
    }

    #[test]
    fn all_zero_indicator_is_rank_deficient() {
        let x = with_intercept(&[vec![0.0; 6]]);
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let err = fit_least_squares(x.view(), y.view(), TOL).unwrap_err();
        assert!(matches!(
            err,
            RegressionError::RankDeficient { column: 1, .. }
        ));
    }

    #[test]
    fn fewer_rows_than_columns_is_underdetermined() {
        let x = with_intercept(&[vec![1.0], vec![2.0]]);
        let y = array![3.0];
        let err = fit_least_squares(x.view(), y.view(), TOL).unwrap_err();
        assert!(matches!(
            err,
            RegressionError::Underdetermined { rows: 1, cols: 3 }
        ));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let x = Array2::ones((3, 1));
        let y = array![1.0, 2.0];
        assert!(matches!(
            fit_least_squares(x.view(), y.view(), TOL),
            Err(RegressionError::MismatchedLengths { rows: 3, responses: 2 })
        ));
    }
}
