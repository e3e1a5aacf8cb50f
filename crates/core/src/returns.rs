//! Return series alignment and correlation statistics.
//!
//! Series are sparse: a missing date is simply absent, and non-finite
//! returns are dropped on construction so they can never leak into a
//! correlation estimate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Daily returns for one candidate, keyed by calendar date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<NaiveDate, f64>", into = "BTreeMap<NaiveDate, f64>")]
pub struct ReturnSeries {
    points: BTreeMap<NaiveDate, f64>,
}

impl ReturnSeries {
    /// Builds a series from `(date, return)` pairs; later duplicates win.
    pub fn from_points(points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            points: points.into_iter().filter(|(_, r)| r.is_finite()).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Aligns two series on the intersection of their dates.
    ///
    /// Returns the paired values in ascending date order, so `a.align(b)` and
    /// `b.align(a)` yield the same pairs with the columns swapped.
    #[must_use]
    pub fn align(&self, other: &Self) -> (Vec<f64>, Vec<f64>) {
        self.points
            .iter()
            .filter_map(|(date, x)| other.points.get(date).map(|y| (*x, *y)))
            .unzip()
    }
}

impl From<BTreeMap<NaiveDate, f64>> for ReturnSeries {
    fn from(points: BTreeMap<NaiveDate, f64>) -> Self {
        Self::from_points(points)
    }
}

impl From<ReturnSeries> for BTreeMap<NaiveDate, f64> {
    fn from(series: ReturnSeries) -> Self {
        series.points
    }
}

/// Pearson product-moment correlation of two equally long samples.
///
/// # Formula
/// ```text
/// r = sum((x - mean_x) * (y - mean_y)) / sqrt(sum((x - mean_x)^2) * sum((y - mean_y)^2))
/// ```
///
/// Returns `NaN` when fewer than two pairs are supplied or when either
/// sample has zero variance; callers decide how to treat an undefined
/// estimate. Finite results are clamped to `[-1, 1]` to absorb rounding.
///
/// # Examples
/// ```
/// use algo_admission_core::returns::pearson;
///
/// let r = pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]);
/// assert!((r - 1.0).abs() < 1e-12);
/// ```
#[must_use]
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }

    let (xs, ys) = (&xs[..n], &ys[..n]);
    let constant = |s: &[f64]| s.iter().all(|v| *v == s[0]);
    if constant(xs) || constant(ys) {
        return f64::NAN;
    }

    let n_f = n as f64;
    let mean_x = xs.iter().sum::<f64>() / n_f;
    let mean_y = ys.iter().sum::<f64>() / n_f;

    let mut covariance = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    (covariance / (var_x * var_y).sqrt()).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn drops_non_finite_returns() {
        let series = ReturnSeries::from_points(vec![
            (day(1), 0.01),
            (day(2), f64::NAN),
            (day(3), f64::INFINITY),
        ]);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn aligns_on_common_dates_only() {
        let a = ReturnSeries::from_points(vec![(day(1), 0.1), (day(2), 0.2), (day(4), 0.4)]);
        let b = ReturnSeries::from_points(vec![(day(2), -0.2), (day(3), -0.3), (day(4), -0.4)]);

        let (xa, xb) = a.align(&b);
        assert_eq!(xa, vec![0.2, 0.4]);
        assert_eq!(xb, vec![-0.2, -0.4]);

        let (ya, yb) = b.align(&a);
        assert_eq!(ya, xb);
        assert_eq!(yb, xa);
    }

    #[test]
    fn perfect_negative_correlation() {
        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[4.0, 3.0, 2.0, 1.0]);
        assert!((r + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_variance_is_undefined() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[0.5, 0.7, 0.9]).is_nan());
    }

    #[test]
    fn too_few_points_is_undefined() {
        assert!(pearson(&[1.0], &[2.0]).is_nan());
        assert!(pearson(&[], &[]).is_nan());
    }

    #[test]
    fn correlation_is_symmetric() {
        let xs = [0.01, -0.02, 0.015, 0.003, -0.007];
        let ys = [0.004, -0.01, 0.02, -0.001, 0.0];
        assert_eq!(pearson(&xs, &ys).to_bits(), pearson(&ys, &xs).to_bits());
    }

    #[test]
    fn serializes_as_date_keyed_map() {
        let series = ReturnSeries::from_points(vec![(day(2), 0.5), (day(1), -0.25)]);
        let json = serde_json::to_string(&series).unwrap();
        assert_eq!(json, r#"{"2024-01-01":-0.25,"2024-01-02":0.5}"#);

        let back: ReturnSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back, series);
    }
}
