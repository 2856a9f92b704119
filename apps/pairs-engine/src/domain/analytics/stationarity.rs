//! Augmented Dickey-Fuller stationarity test (constant, no trend).
//!
//! The lag order is chosen by AIC over `0..=maxlag` on a common sample, then
//! the chosen model is refit on the longest sample it allows. p-values and
//! critical values use MacKinnon's response-surface approximations for a
//! single series with constant.

use serde::Serialize;

use crate::domain::series::Series;

/// Minimum observations for a test result.
pub const MIN_OBSERVATIONS: usize = 10;

/// Smallest-p polynomial, used at or below [`TAU_STAR`].
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038_269];
/// Large-p polynomial, used above [`TAU_STAR`].
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.932_02, -0.127_45, -0.010_368];
const TAU_STAR: f64 = -1.61;
const TAU_MIN: f64 = -18.83;
const TAU_MAX: f64 = 2.74;

/// Finite-sample critical value surfaces `b0 + b1/T + b2/T² + b3/T³`.
const CRIT_1PCT: [f64; 4] = [-3.430_35, -6.5393, -16.786, -79.433];
const CRIT_5PCT: [f64; 4] = [-2.861_54, -2.8903, -4.234, -40.040];
const CRIT_10PCT: [f64; 4] = [-2.566_77, -1.5384, -2.809, 0.0];

/// Result of [`stationarity_test`]. All fields are `NaN` when the sample is
/// too short or degenerate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StationarityResult {
    /// ADF t-statistic on the lagged level.
    pub statistic: f64,
    /// MacKinnon approximate p-value.
    pub p_value: f64,
    /// Augmentation lags chosen by AIC.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub nobs: usize,
    /// Critical values at 1%, 5% and 10%.
    pub critical_values: CriticalValues,
}

/// ADF critical values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriticalValues {
    /// 1% level.
    pub one_pct: f64,
    /// 5% level.
    pub five_pct: f64,
    /// 10% level.
    pub ten_pct: f64,
}

impl StationarityResult {
    /// The insufficient-data sentinel.
    #[must_use]
    pub const fn nan() -> Self {
        Self {
            statistic: f64::NAN,
            p_value: f64::NAN,
            used_lag: 0,
            nobs: 0,
            critical_values: CriticalValues {
                one_pct: f64::NAN,
                five_pct: f64::NAN,
                ten_pct: f64::NAN,
            },
        }
    }

    /// True for the insufficient-data sentinel.
    #[must_use]
    pub const fn is_nan(&self) -> bool {
        self.statistic.is_nan()
    }
}

/// Run the ADF test on the non-NaN values of `series`.
///
/// Fewer than [`MIN_OBSERVATIONS`] points, or a sample whose regressions are
/// singular (e.g. a constant series), yields [`StationarityResult::nan`].
#[must_use]
pub fn stationarity_test(series: &Series) -> StationarityResult {
    let y: Vec<f64> = series
        .values()
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .collect();
    adf(&y).unwrap_or_else(StationarityResult::nan)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn adf(y: &[f64]) -> Option<StationarityResult> {
    let n = y.len();
    if n < MIN_OBSERVATIONS {
        return None;
    }

    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    let maxlag = schwert.min((n / 2).checked_sub(2)?);
    let dy: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    // Lag search on the sample that the largest model allows.
    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=maxlag {
        let (target, rows) = design(y, &dy, lag, maxlag);
        let Some(fit) = ols(&target, &rows) else {
            continue;
        };
        let aic = fit.aic();
        if best.is_none_or(|(b, _)| aic < b) {
            best = Some((aic, lag));
        }
    }
    let (_, used_lag) = best?;

    let (target, rows) = design(y, &dy, used_lag, used_lag);
    let fit = ols(&target, &rows)?;
    let statistic = fit.coef[0] / fit.std_err[0];
    if !statistic.is_finite() {
        return None;
    }

    let nobs = target.len();
    Some(StationarityResult {
        statistic,
        p_value: mackinnon_p(statistic),
        used_lag,
        nobs,
        critical_values: critical_values(nobs as f64),
    })
}

/// Regression of `dy_t` on `[y_{t-1}, dy_{t-1}..dy_{t-lag}, 1]`, using the
/// rows available once `sample_lag` leading differences are dropped.
fn design(y: &[f64], dy: &[f64], lag: usize, sample_lag: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let rows: Vec<usize> = (sample_lag..dy.len()).collect();
    let target = rows.iter().map(|&t| dy[t]).collect();
    let design = rows
        .iter()
        .map(|&t| {
            let mut row = Vec::with_capacity(lag + 2);
            row.push(y[t]);
            row.extend((1..=lag).map(|k| dy[t - k]));
            row.push(1.0);
            row
        })
        .collect();
    (target, design)
}

struct OlsFit {
    coef: Vec<f64>,
    std_err: Vec<f64>,
    ssr: f64,
    nobs: usize,
}

impl OlsFit {
    #[allow(clippy::cast_precision_loss)]
    fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        2.0f64.mul_add(self.coef.len() as f64, -2.0 * llf)
    }
}

/// Smallest pivot accepted once the normal matrix has unit diagonal.
const PIVOT_TOLERANCE: f64 = 1e-12;

/// A regressor whose spread is below this fraction of its magnitude
/// (in squares) is treated as constant.
const MIN_RELATIVE_VARIATION: f64 = 1e-20;

/// Least squares for a design whose last column is the constant `1`.
///
/// The other columns and the target are centered before the normal
/// equations are formed, so a regressor sitting at a large level (a price
/// near 60 000) keeps its variation. `None` when the design is singular or
/// leaves no residual degrees of freedom.
#[allow(clippy::cast_precision_loss, clippy::needless_range_loop)]
fn ols(target: &[f64], rows: &[Vec<f64>]) -> Option<OlsFit> {
    let k = rows.first()?.len();
    let n = rows.len();
    if k < 2 || n <= k {
        return None;
    }
    let p = k - 1;
    let count = n as f64;

    let means: Vec<f64> = (0..p)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / count)
        .collect();
    let target_mean = target.iter().sum::<f64>() / count;

    let mut xtx = vec![vec![0.0_f64; p]; p];
    let mut xty = vec![0.0_f64; p];
    let mut magnitude = vec![0.0_f64; p];
    for (row, &t) in rows.iter().zip(target) {
        let dt = t - target_mean;
        for i in 0..p {
            let xi = row[i] - means[i];
            magnitude[i] += row[i] * row[i];
            xty[i] += xi * dt;
            for j in 0..p {
                xtx[i][j] += xi * (row[j] - means[j]);
            }
        }
    }
    if (0..p).any(|i| xtx[i][i] <= magnitude[i] * MIN_RELATIVE_VARIATION) {
        return None;
    }

    let inv = invert_normal(&xtx)?;
    let slopes: Vec<f64> = (0..p)
        .map(|i| (0..p).map(|j| inv[i][j] * xty[j]).sum())
        .collect();
    let intercept = target_mean
        - slopes
            .iter()
            .zip(&means)
            .map(|(b, m)| b * m)
            .sum::<f64>();

    let ssr: f64 = rows
        .iter()
        .zip(target)
        .map(|(row, &t)| {
            let fitted: f64 = (0..p).map(|j| slopes[j] * (row[j] - means[j])).sum();
            (t - target_mean - fitted).powi(2)
        })
        .sum();
    let sigma2 = ssr / (n - k) as f64;

    let mut std_err: Vec<f64> = (0..p).map(|i| (sigma2 * inv[i][i]).sqrt()).collect();
    let leverage: f64 = (0..p)
        .map(|i| (0..p).map(|j| means[i] * inv[i][j] * means[j]).sum::<f64>())
        .sum();
    std_err.push((sigma2 * (1.0 / count + leverage)).sqrt());

    let mut coef = slopes;
    coef.push(intercept);

    Some(OlsFit {
        coef,
        std_err,
        ssr,
        nobs: n,
    })
}

/// Inverse of a symmetric normal matrix with a positive diagonal.
///
/// The matrix is scaled to unit diagonal before elimination so the pivot
/// tolerance is relative to each column's own size.
fn invert_normal(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let d: Vec<f64> = a.iter().enumerate().map(|(i, row)| row[i].sqrt()).collect();
    let scaled = a
        .iter()
        .enumerate()
        .map(|(i, row)| row.iter().enumerate().map(|(j, v)| v / (d[i] * d[j])).collect())
        .collect();
    let inv = gauss_jordan(scaled)?;
    Some(
        inv.into_iter()
            .enumerate()
            .map(|(i, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(j, v)| v / (d[i] * d[j]))
                    .collect()
            })
            .collect(),
    )
}

/// Gauss-Jordan inverse with partial pivoting.
fn gauss_jordan(mut a: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let k = a.len();
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot_row = (col..k).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot_row][col].abs() <= PIVOT_TOLERANCE {
            return None;
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..k {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }

        for r in 0..k {
            if r == col {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                a[r][j] -= factor * a[col][j];
                inv[r][j] -= factor * inv[col][j];
            }
        }
    }

    Some(inv)
}

/// MacKinnon (1994) approximate p-value, one series, constant only.
#[must_use]
pub fn mackinnon_p(statistic: f64) -> f64 {
    if statistic > TAU_MAX {
        return 1.0;
    }
    if statistic < TAU_MIN {
        return 0.0;
    }
    let coef: &[f64] = if statistic <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    let z = coef.iter().rev().fold(0.0_f64, |acc, c| acc.mul_add(statistic, *c));
    normal_cdf(z)
}

fn critical_values(nobs: f64) -> CriticalValues {
    let surface = |b: [f64; 4]| b[0] + b[1] / nobs + b[2] / nobs.powi(2) + b[3] / nobs.powi(3);
    CriticalValues {
        one_pct: surface(CRIT_1PCT),
        five_pct: surface(CRIT_5PCT),
        ten_pct: surface(CRIT_10PCT),
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * libm::erfc(-z / std::f64::consts::SQRT_2)
}
