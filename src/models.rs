// src/models.rs
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily close. Dates are always timezone-naive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    #[serde(rename = "Close")]
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        PricePoint { date, close }
    }
}

/// Reported EPS for a single quarter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpsRecord {
    pub date: NaiveDate,
    pub eps: f64,
}

impl EpsRecord {
    pub fn new(date: NaiveDate, eps: f64) -> Self {
        EpsRecord { date, eps }
    }
}

/// A P/E observation on a price date. `pe` is `None` when undefined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PePoint {
    pub date: NaiveDate,
    pub price: f64,
    pub ttm_eps: Option<f64>,
    pub pe: Option<f64>,
}

/// `{date, value}` pair as served to chart clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DatedValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Which trailing range of prices a caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceWindow {
    /// Everything the cache or source has.
    All,
    /// `[max_date - years, max_date]`.
    Years(u32),
    /// Explicit bounds; either side may be open.
    Range {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

/// Whether prices came from a healthy path or a degraded fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Stale { reason: String },
}

impl Freshness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Freshness::Stale { .. })
    }
}

/// Outcome of asking the price adapter for a ticker.
#[derive(Debug, Clone, PartialEq)]
pub enum PriceFetch {
    Fresh(Vec<PricePoint>),
    Stale {
        prices: Vec<PricePoint>,
        reason: String,
    },
    Unavailable {
        reason: String,
    },
}

impl PriceFetch {
    /// Splits into the usable series and its freshness. `None` when no data exists.
    pub fn into_parts(self) -> Option<(Vec<PricePoint>, Freshness)> {
        match self {
            PriceFetch::Fresh(prices) if !prices.is_empty() => Some((prices, Freshness::Fresh)),
            PriceFetch::Stale { prices, reason } if !prices.is_empty() => {
                Some((prices, Freshness::Stale { reason }))
            }
            _ => None,
        }
    }

    pub fn prices(&self) -> &[PricePoint] {
        match self {
            PriceFetch::Fresh(prices) => prices,
            PriceFetch::Stale { prices, .. } => prices,
            PriceFetch::Unavailable { .. } => &[],
        }
    }
}

/// Statistics and component scores behind an average-blended valuation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationDetails {
    pub current_pe: f64,
    pub avg_pe: f64,
    pub min_pe: f64,
    pub max_pe: f64,
    pub score_avg: f64,
    pub score_range: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvgValuation {
    pub score: f64,
    pub details: ValuationDetails,
    pub price_freshness: Freshness,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MinMaxValuation {
    pub score: f64,
    pub current_pe: f64,
    pub min_pe: f64,
    pub max_pe: f64,
    /// Windowed P/E values, oldest first.
    pub pe_history: Vec<DatedValue>,
    pub price_freshness: Freshness,
}

/// Features a caller may ask for that the configured source cannot provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ForwardPe,
    AutoEps,
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feature::ForwardPe => write!(f, "forward P/E"),
            Feature::AutoEps => write!(f, "auto EPS source"),
        }
    }
}

/// Time-aligned chart series for one ticker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeRatioSeries {
    pub pe_ttm: Vec<DatedValue>,
    pub pe_forward: Option<Vec<DatedValue>>,
    pub price: Vec<DatedValue>,
    pub unsupported: Vec<Feature>,
    pub price_freshness: Freshness,
}

/// Diagnostic view of one cache file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub ticker: String,
    pub age_hours: f64,
    pub size_kb: f64,
    pub valid: bool,
}
