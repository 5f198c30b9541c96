// src/services/pe.rs
use crate::models::{DatedValue, PePoint, PricePoint};

/// `price / ttm_eps`, or `None` when the denominator is missing or not positive
/// or the ratio is not finite.
pub fn pe_ratio(price: f64, ttm_eps: Option<f64>) -> Option<f64> {
    let eps = ttm_eps?;
    if eps <= 0.0 {
        return None;
    }
    let pe = price / eps;
    pe.is_finite().then_some(pe)
}

/// Joins prices with TTM EPS aligned to the same dates.
pub fn compute_pe_series(prices: &[PricePoint], ttm_eps: &[Option<f64>]) -> Vec<PePoint> {
    prices
        .iter()
        .zip(ttm_eps.iter().copied())
        .map(|(p, eps)| PePoint {
            date: p.date,
            price: p.close,
            ttm_eps: eps,
            pe: pe_ratio(p.close, eps),
        })
        .collect()
}

/// Trailing mean over `window` values, skipping missing ones.
///
/// A position is `None` only when every value in its window is missing.
/// Windows of 0 or 1 leave the series unchanged.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window <= 1 {
        return values.to_vec();
    }

    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let (sum, count) = values[start..=i]
                .iter()
                .flatten()
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            (count > 0).then(|| sum / count as f64)
        })
        .collect()
}

/// Defined P/E values as `{date, value}` pairs.
pub fn defined_values(points: &[PePoint]) -> Vec<DatedValue> {
    points
        .iter()
        .filter_map(|p| p.pe.map(|value| DatedValue { date: p.date, value }))
        .collect()
}
