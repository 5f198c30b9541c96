// src/services/ttm.rs
use chrono::NaiveDate;

use crate::models::EpsRecord;

/// Quarters summed into one trailing-twelve-month value.
pub const TTM_QUARTERS: usize = 4;

/// Rolling sum over the last [`TTM_QUARTERS`] records, indexed by each record's date.
///
/// The first quarters use whatever is available, so the second record's value is
/// the sum of two quarters rather than missing.
pub fn rolling_ttm(records: &[EpsRecord]) -> Vec<(NaiveDate, f64)> {
    let mut sorted = records.to_vec();
    sorted.sort_by_key(|r| r.date);

    (0..sorted.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(TTM_QUARTERS);
            let sum = sorted[start..=i].iter().map(|r| r.eps).sum();
            (sorted[i].date, sum)
        })
        .collect()
}

/// Forward-fills the rolling TTM series onto `dates`.
///
/// Each target date takes the latest TTM value dated at or before it; dates that
/// precede every EPS record are `None`. `dates` must be ascending.
pub fn build_ttm_series(records: &[EpsRecord], dates: &[NaiveDate]) -> Vec<Option<f64>> {
    let ttm = rolling_ttm(records);
    let mut next = 0;
    let mut current = None;

    dates
        .iter()
        .map(|date| {
            while next < ttm.len() && ttm[next].0 <= *date {
                current = Some(ttm[next].1);
                next += 1;
            }
            current
        })
        .collect()
}
