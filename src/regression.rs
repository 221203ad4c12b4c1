//! Regression
//!
//! Weighted ridge regression and the sample kernels shared by the Shapley and
//! local-surrogate attributors. Both engines fit their surrogate through
//! [`WeightedRidge`], so they cannot drift apart numerically.
use crate::constants::{KERNEL_WEIGHT_FLOOR, PIVOT_EPS};
use crate::errors::ExplainError;
use serde::{Deserialize, Serialize};

/// A fitted linear surrogate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// One coefficient per input column.
    pub coefficients: Vec<f64>,
    /// Unpenalized intercept, zero when the fit has none.
    pub intercept: f64,
    /// Weighted coefficient of determination.
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.intercept + row.iter().zip(self.coefficients.iter()).map(|(x, c)| x * c).sum::<f64>()
    }
}

/// Weighted least squares with an L2 penalty on the coefficients.
#[derive(Debug, Clone, Copy)]
pub struct WeightedRidge {
    penalty: f64,
    fit_intercept: bool,
}

impl WeightedRidge {
    /// * `penalty` - L2 penalty added to the diagonal of the normal equations.
    /// * `fit_intercept` - Whether to fit an unpenalized intercept.
    pub fn new(penalty: f64, fit_intercept: bool) -> Self {
        WeightedRidge { penalty, fit_intercept }
    }

    /// Fit `y ~ x` with per-row weights `w`.
    ///
    /// Columns that never vary (under the sample weights) get a coefficient of
    /// exactly zero and are left out of the solve.
    pub fn fit(&self, x: &[Vec<f64>], y: &[f64], w: &[f64]) -> Result<LinearFit, ExplainError> {
        if x.is_empty() || x.len() != y.len() || x.len() != w.len() {
            return Err(ExplainError::InsufficientData(format!(
                "{} rows, {} targets and {} weights can not form a regression.",
                x.len(),
                y.len(),
                w.len()
            )));
        }
        let n_cols = x[0].len();
        let w_sum: f64 = w.iter().sum();
        if !(w_sum > 0.0) {
            return Err(ExplainError::SingularFit("sample weights sum to zero.".to_string()));
        }

        // Weighted means, used for centering when an intercept is fitted.
        let (x_mean, y_mean) = if self.fit_intercept {
            let mut xm = vec![0.0; n_cols];
            for (row, wi) in x.iter().zip(w.iter()) {
                for (m, v) in xm.iter_mut().zip(row.iter()) {
                    *m += wi * v;
                }
            }
            xm.iter_mut().for_each(|m| *m /= w_sum);
            let ym = y.iter().zip(w.iter()).map(|(yi, wi)| yi * wi).sum::<f64>() / w_sum;
            (xm, ym)
        } else {
            (vec![0.0; n_cols], 0.0)
        };

        let active: Vec<usize> = (0..n_cols)
            .filter(|j| {
                let first = x[0][*j];
                if self.fit_intercept {
                    x.iter().any(|row| row[*j] != first)
                } else {
                    x.iter().zip(w.iter()).any(|(row, wi)| *wi > 0.0 && row[*j] != 0.0)
                }
            })
            .collect();

        let k = active.len();
        let mut a = vec![vec![0.0; k]; k];
        let mut b = vec![0.0; k];
        for ((row, yi), wi) in x.iter().zip(y.iter()).zip(w.iter()) {
            let yc = yi - y_mean;
            for (p, &jp) in active.iter().enumerate() {
                let xp = row[jp] - x_mean[jp];
                if xp == 0.0 {
                    continue;
                }
                b[p] += wi * xp * yc;
                for (q, &jq) in active.iter().enumerate().skip(p) {
                    a[p][q] += wi * xp * (row[jq] - x_mean[jq]);
                }
            }
        }
        for p in 0..k {
            for q in 0..p {
                a[p][q] = a[q][p];
            }
            a[p][p] += self.penalty;
        }

        let solved = solve_linear_system(a, b)?;
        let mut coefficients = vec![0.0; n_cols];
        for (p, &j) in active.iter().enumerate() {
            coefficients[j] = solved[p];
        }
        let intercept = if self.fit_intercept {
            y_mean - coefficients.iter().zip(x_mean.iter()).map(|(c, m)| c * m).sum::<f64>()
        } else {
            0.0
        };

        let mut fit = LinearFit {
            coefficients,
            intercept,
            r_squared: 0.0,
        };
        fit.r_squared = weighted_r_squared(&fit, x, y, w);
        Ok(fit)
    }
}

/// Weighted R² of `fit` on the given samples.
pub fn weighted_r_squared(fit: &LinearFit, x: &[Vec<f64>], y: &[f64], w: &[f64]) -> f64 {
    let w_sum: f64 = w.iter().sum();
    if w_sum <= 0.0 {
        return 0.0;
    }
    let y_mean = y.iter().zip(w.iter()).map(|(yi, wi)| yi * wi).sum::<f64>() / w_sum;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for ((row, yi), wi) in x.iter().zip(y.iter()).zip(w.iter()) {
        let r = yi - fit.predict(row);
        ss_res += wi * r * r;
        ss_tot += wi * (yi - y_mean) * (yi - y_mean);
    }
    if ss_tot <= f64::EPSILON * w_sum {
        // Constant target: a perfect fit explains it, anything else does not.
        if ss_res <= f64::EPSILON * w_sum {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Solve `a * x = b` by Gaussian elimination with partial pivoting.
pub fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, ExplainError> {
    let n = b.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, r)| r[i].abs())
        .fold(0.0_f64, f64::max)
        .max(1.0);
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|i, j| a[*i][col].abs().total_cmp(&a[*j][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() < PIVOT_EPS * scale {
            return Err(ExplainError::SingularFit(format!(
                "pivot {} of {} is numerically zero.",
                col, n
            )));
        }
        a.swap(col, pivot_row);
        b.swap(col, pivot_row);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ExplainError::SingularFit("solution is not finite.".to_string()));
    }
    Ok(x)
}

/// Exponential kernel `exp(-d² / width²)`, floored so distant samples keep a
/// small positive weight.
#[inline]
pub fn exponential_kernel(distance: f64, width: f64) -> f64 {
    (-(distance * distance) / (width * width)).exp().max(KERNEL_WEIGHT_FLOOR)
}

/// Shapley kernel weight `(n-1) / (C(n, s) * s * (n - s))` of a coalition of size `s`.
///
/// Only defined for `0 < s < n`; the empty and full coalitions are anchored by the
/// caller instead.
pub fn shapley_kernel(n: usize, s: usize) -> f64 {
    debug_assert!(s > 0 && s < n);
    let log_w = ((n - 1) as f64).ln() - ln_binomial(n, s) - (s as f64).ln() - ((n - s) as f64).ln();
    log_w.exp().max(KERNEL_WEIGHT_FLOOR)
}

/// Natural log of the binomial coefficient `C(n, k)`.
pub fn ln_binomial(n: usize, k: usize) -> f64 {
    let k = k.min(n - k);
    (1..=k).map(|i| ((n - k + i) as f64).ln() - (i as f64).ln()).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_linear_model() {
        let x: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, ((i * 7) % 5) as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 1.5 + 2.0 * r[0] - 3.0 * r[1]).collect();
        let w = vec![1.0; x.len()];
        let fit = WeightedRidge::new(0.0, true).fit(&x, &y, &w).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-8);
        assert!((fit.coefficients[1] + 3.0).abs() < 1e-8);
        assert!((fit.intercept - 1.5).abs() < 1e-8);
        assert!((fit.r_squared - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_constant_column_gets_zero() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 4.0]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0]).collect();
        let w = vec![1.0; x.len()];
        let fit = WeightedRidge::new(0.0, true).fit(&x, &y, &w).unwrap();
        assert_eq!(fit.coefficients[1], 0.0);
        assert!((fit.coefficients[0] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_ridge_solves_underdetermined() {
        // More columns than rows: only solvable with a penalty.
        let x = vec![vec![1.0, 1.0, 0.0], vec![0.0, 1.0, 1.0]];
        let y = vec![1.0, 2.0];
        let w = vec![1.0, 1.0];
        assert!(WeightedRidge::new(0.0, false).fit(&x, &y, &w).is_err());
        let fit = WeightedRidge::new(1e-3, false).fit(&x, &y, &w).unwrap();
        assert!(fit.coefficients.iter().all(|c| c.is_finite()));
        assert!((fit.predict(&x[0]) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_weights_pull_fit() {
        let x = vec![vec![0.0], vec![1.0], vec![1.0]];
        let y = vec![0.0, 1.0, 3.0];
        let heavy_second = WeightedRidge::new(0.0, true).fit(&x, &y, &[1.0, 1000.0, 1.0]).unwrap();
        let heavy_third = WeightedRidge::new(0.0, true).fit(&x, &y, &[1.0, 1.0, 1000.0]).unwrap();
        assert!(heavy_second.coefficients[0] < heavy_third.coefficients[0]);
    }

    #[test]
    fn test_kernels() {
        assert_eq!(exponential_kernel(0.0, 0.75), 1.0);
        assert_eq!(exponential_kernel(1e6, 0.75), KERNEL_WEIGHT_FLOOR);
        assert!((ln_binomial(5, 2) - 10f64.ln()).abs() < 1e-12);
        // n = 4, s = 1: 3 / (4 * 1 * 3)
        assert!((shapley_kernel(4, 1) - 0.25).abs() < 1e-12);
        assert!(shapley_kernel(4, 2) < shapley_kernel(4, 1));
    }
}
