//! Pairwise and rolling statistics over aligned series.
//!
//! Degenerate input (too few points, zero variance) produces `NaN`, never an
//! error. Only misaligned input or an unusable window is an error.
//!
//! Moments are computed on values shifted by the first observation of the
//! window so that constant input yields an exactly-zero variance.

use crate::domain::series::Series;
use crate::error::QueryError;

/// Ordinary-least-squares slope of `y` regressed on `x` with intercept.
///
/// # Errors
///
/// Returns [`QueryError::Misaligned`] when the series differ in timestamps.
pub fn hedge_ratio(y: &Series, x: &Series) -> Result<f64, QueryError> {
    y.ensure_aligned(x)?;
    Ok(ols_slope(y.values(), x.values()))
}

/// Pointwise `y - hedge_ratio * x`.
///
/// # Errors
///
/// Returns [`QueryError::Misaligned`] when the series differ in timestamps.
pub fn spread(y: &Series, x: &Series, hedge_ratio: f64) -> Result<Series, QueryError> {
    y.ensure_aligned(x)?;
    let values = y
        .values()
        .iter()
        .zip(x.values())
        .map(|(yv, xv)| yv - hedge_ratio * xv)
        .collect();
    Ok(y.with_values(values))
}

/// Trailing-window z-score of each point.
///
/// Uses the population standard deviation. The first `window - 1` points
/// and any window with zero deviation are `NaN`.
///
/// # Errors
///
/// Returns [`QueryError::ZeroWindow`] when `window` is zero.
pub fn rolling_zscore(series: &Series, window: usize) -> Result<Series, QueryError> {
    if window == 0 {
        return Err(QueryError::ZeroWindow);
    }
    let values = series.values();
    let out = (0..values.len())
        .map(|i| {
            trailing(values, i, window).map_or(f64::NAN, |w| {
                let (mean, var) = shifted_moments(w);
                let sd = var.sqrt();
                if sd > 0.0 {
                    (values[i] - w[0] - mean) / sd
                } else {
                    f64::NAN
                }
            })
        })
        .collect();
    Ok(series.with_values(out))
}

/// Trailing-window Pearson correlation of two aligned series.
///
/// # Errors
///
/// Returns [`QueryError::Misaligned`] for misaligned input and
/// [`QueryError::ZeroWindow`] when `window` is zero.
pub fn rolling_corr(a: &Series, b: &Series, window: usize) -> Result<Series, QueryError> {
    a.ensure_aligned(b)?;
    if window == 0 {
        return Err(QueryError::ZeroWindow);
    }
    let (av, bv) = (a.values(), b.values());
    let out = (0..av.len())
        .map(|i| match (trailing(av, i, window), trailing(bv, i, window)) {
            (Some(wa), Some(wb)) => pearson(wa, wb),
            _ => f64::NAN,
        })
        .collect();
    Ok(a.with_values(out))
}

/// The `window` values ending at index `i`, if that many exist.
fn trailing(values: &[f64], i: usize, window: usize) -> Option<&[f64]> {
    (i + 1 >= window).then(|| &values[i + 1 - window..=i])
}

/// Mean and population variance of `w[k] - w[0]`.
#[allow(clippy::cast_precision_loss)]
fn shifted_moments(w: &[f64]) -> (f64, f64) {
    let n = w.len() as f64;
    let origin = w[0];
    let mean = w.iter().map(|v| v - origin).sum::<f64>() / n;
    let var = w
        .iter()
        .map(|v| {
            let d = v - origin - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    (mean, var)
}

/// Centered cross products `(Sxx, Syy, Sxy)` of two equal-length slices.
#[allow(clippy::cast_precision_loss)]
fn centered_products(x: &[f64], y: &[f64]) -> (f64, f64, f64) {
    let n = x.len() as f64;
    let (x0, y0) = (x[0], y[0]);
    let mx = x.iter().map(|v| v - x0).sum::<f64>() / n;
    let my = y.iter().map(|v| v - y0).sum::<f64>() / n;

    x.iter()
        .zip(y)
        .fold((0.0, 0.0, 0.0), |(sxx, syy, sxy), (xv, yv)| {
            let dx = xv - x0 - mx;
            let dy = yv - y0 - my;
            (sxx + dx * dx, syy + dy * dy, sxy + dx * dy)
        })
}

fn ols_slope(y: &[f64], x: &[f64]) -> f64 {
    if x.len() < 2 {
        return f64::NAN;
    }
    let (sxx, _, sxy) = centered_products(x, y);
    if sxx > 0.0 { sxy / sxx } else { f64::NAN }
}

fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let (saa, sbb, sab) = centered_products(a, b);
    let denom = (saa * sbb).sqrt();
    if denom > 0.0 {
        (sab / denom).clamp(-1.0, 1.0)
    } else {
        f64::NAN
    }
}
