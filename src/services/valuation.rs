// src/services/valuation.rs
//! Scores a ticker's current TTM P/E against its own history.
//!
//! Both strategies share the same pipeline: load the ticker's EPS, fetch prices
//! through the cache, forward-fill a rolling TTM EPS onto the price dates,
//! divide, and keep the trailing `years` of defined P/E values. They differ only
//! in how the window is reduced to a score in `[0, 1]` (higher is cheaper).

use log::{info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::models::{
    AvgValuation, DatedValue, Feature, Freshness, MinMaxValuation, PePoint, PeRatioSeries, PricePoint,
    PriceWindow, ValuationDetails,
};
use crate::services::dates::years_before;
use crate::services::eps_store::{EpsStore, EpsStoreError};
use crate::services::pe::{compute_pe_series, defined_values, rolling_mean};
use crate::services::price_source::PriceProvider;
use crate::services::ttm::build_ttm_series;

/// Guards the average-relative score when the average sits on the min or max.
pub const AVG_EPSILON: f64 = 1e-9;
pub const AVG_WEIGHT: f64 = 0.7;
pub const RANGE_WEIGHT: f64 = 0.3;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("{ticker} not found in {file}")]
    UnknownTicker { ticker: String, file: String },
    #[error("No price data found for {0}")]
    NoPriceData(String),
    #[error("Not enough EPS/price data for {ticker} over {years} years")]
    InsufficientData { ticker: String, years: u32 },
    #[error("{feature} not available with {provider}. Use \"manual\" source.")]
    Unsupported { feature: Feature, provider: String },
    #[error("Unknown source: {0}")]
    UnknownSource(String),
    #[error("Invalid EPS file name: {0:?}")]
    InvalidEpsFile(String),
    #[error(transparent)]
    Eps(#[from] EpsStoreError),
}

/// Where TTM EPS comes from for chart series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpsSource {
    Manual,
    Auto,
}

impl EpsSource {
    pub fn parse(raw: &str) -> Result<Self, ValuationError> {
        match raw.trim().to_lowercase().as_str() {
            "manual" => Ok(EpsSource::Manual),
            "auto" => Ok(EpsSource::Auto),
            other => Err(ValuationError::UnknownSource(other.to_string())),
        }
    }
}

/// Options for [`Valuator::pe_ratios`].
#[derive(Debug, Clone, Deserialize)]
pub struct PeRatioOptions {
    #[serde(default = "default_chart_years")]
    pub years: u32,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub include_forward: bool,
    #[serde(default)]
    pub smoothing: usize,
    #[serde(default)]
    pub filename: Option<String>,
}

pub fn default_chart_years() -> u32 {
    5
}

fn default_source() -> String {
    "manual".to_string()
}

impl Default for PeRatioOptions {
    fn default() -> Self {
        PeRatioOptions {
            years: default_chart_years(),
            source: default_source(),
            include_forward: false,
            smoothing: 0,
            filename: None,
        }
    }
}

/// Summary of the trailing window of defined P/E values.
#[derive(Debug, Clone, PartialEq)]
pub struct PeWindow {
    pub history: Vec<DatedValue>,
    pub current: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

impl PeWindow {
    /// Keeps rows dated on or after `max_date - years` with a defined P/E.
    ///
    /// `max_date` is taken over every row, including those whose P/E is missing.
    pub fn from_series(points: &[PePoint], years: u32) -> Option<Self> {
        let last = points.iter().map(|p| p.date).max()?;
        let cutoff = years_before(last, years);

        let history: Vec<DatedValue> = defined_values(points)
            .into_iter()
            .filter(|v| v.date >= cutoff)
            .collect();

        let current = history.last()?.value;
        let (min, max, sum) = history.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), v| (min.min(v.value), max.max(v.value), sum + v.value),
        );
        let avg = sum / history.len() as f64;

        Some(PeWindow {
            history,
            current,
            min,
            max,
            avg,
        })
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

/// Position of `current` in `[min, max]`, inverted: 1 at the minimum, 0 at the maximum.
/// A flat window scores 0.5.
pub fn score_range(current: f64, min: f64, max: f64) -> f64 {
    if max == min {
        return 0.5;
    }
    (1.0 - (current - min) / (max - min)).clamp(0.0, 1.0)
}

/// Score pivoting on the average: 0.5 at `avg`, rising to 1 at `min` and falling to 0 at `max`.
pub fn score_avg(current: f64, avg: f64, min: f64, max: f64) -> f64 {
    let score = if current <= avg {
        0.5 + 0.5 * (avg - current) / AVG_EPSILON.max(avg - min)
    } else {
        0.5 - 0.5 * (current - avg) / AVG_EPSILON.max(max - avg)
    };
    score.clamp(0.0, 1.0)
}

pub fn blended_score(score_avg: f64, score_range: f64) -> f64 {
    AVG_WEIGHT * score_avg + RANGE_WEIGHT * score_range
}

pub struct Valuator {
    prices: PriceProvider,
    eps_dir: PathBuf,
    default_eps_file: String,
}

impl Valuator {
    pub fn new(prices: PriceProvider, eps_dir: impl Into<PathBuf>, default_eps_file: impl Into<String>) -> Self {
        Valuator {
            prices,
            eps_dir: eps_dir.into(),
            default_eps_file: default_eps_file.into(),
        }
    }

    pub fn prices(&self) -> &PriceProvider {
        &self.prices
    }

    /// Resolves a caller-supplied EPS file name inside the EPS directory.
    pub fn eps_path(&self, filename: Option<&str>) -> Result<PathBuf, ValuationError> {
        let name = filename
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(self.default_eps_file.as_str());

        if name.contains(['/', '\\']) || name == ".." || name == "." {
            return Err(ValuationError::InvalidEpsFile(name.to_string()));
        }
        Ok(self.eps_dir.join(name))
    }

    fn load_eps(&self, filename: Option<&str>) -> Result<(EpsStore, String), ValuationError> {
        let path = self.eps_path(filename)?;
        let store = EpsStore::load(&path)?;
        let shown = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((store, shown))
    }

    async fn fetch_prices(&self, ticker: &str, years: u32) -> Result<(Vec<PricePoint>, Freshness), ValuationError> {
        self.prices
            .get_prices(ticker, &PriceWindow::Years(years))
            .await
            .into_parts()
            .ok_or_else(|| ValuationError::NoPriceData(ticker.to_string()))
    }

    /// EPS lookup, price fetch and P/E join shared by both strategies.
    async fn pe_history(
        &self,
        ticker: &str,
        years: u32,
        filename: Option<&str>,
    ) -> Result<(PeWindow, Freshness), ValuationError> {
        let (store, file) = self.load_eps(filename)?;
        let records = store.get(ticker).ok_or_else(|| ValuationError::UnknownTicker {
            ticker: ticker.to_string(),
            file,
        })?;

        let (prices, freshness) = self.fetch_prices(ticker, years).await?;
        if let Freshness::Stale { reason } = &freshness {
            warn!("Scoring {} on cached prices: {}", ticker, reason);
        }

        let dates: Vec<_> = prices.iter().map(|p| p.date).collect();
        let ttm = build_ttm_series(records, &dates);
        let series = compute_pe_series(&prices, &ttm);

        let window = PeWindow::from_series(&series, years).ok_or_else(|| ValuationError::InsufficientData {
            ticker: ticker.to_string(),
            years,
        })?;
        Ok((window, freshness))
    }

    /// Min-max normalized score of the current P/E within the window.
    pub async fn value_pe_min_max(
        &self,
        ticker: &str,
        years: u32,
        filename: Option<&str>,
    ) -> Result<MinMaxValuation, ValuationError> {
        let (window, price_freshness) = self.pe_history(ticker, years, filename).await?;
        let score = score_range(window.current, window.min, window.max);
        info!("{} min-max score over {}y: {:.4} (P/E {:.2})", ticker, years, score, window.current);

        Ok(MinMaxValuation {
            score,
            current_pe: window.current,
            min_pe: window.min,
            max_pe: window.max,
            pe_history: window.history,
            price_freshness,
        })
    }

    /// 70/30 blend of the average-relative score and the min-max score.
    pub async fn value_pe_avg(
        &self,
        ticker: &str,
        years: u32,
        filename: Option<&str>,
    ) -> Result<AvgValuation, ValuationError> {
        let (window, price_freshness) = self.pe_history(ticker, years, filename).await?;

        let score_range = score_range(window.current, window.min, window.max);
        let score_avg = score_avg(window.current, window.avg, window.min, window.max);
        let score = blended_score(score_avg, score_range);
        info!("{} average score over {}y: {:.4} (P/E {:.2})", ticker, years, score, window.current);

        Ok(AvgValuation {
            score,
            details: ValuationDetails {
                current_pe: window.current,
                avg_pe: window.avg,
                min_pe: window.min,
                max_pe: window.max,
                score_avg,
                score_range,
                data_points: window.len(),
            },
            price_freshness,
        })
    }

    /// Chart series: TTM P/E (defined points only) and price, optionally smoothed.
    ///
    /// A ticker missing from the EPS file yields an empty P/E series rather than
    /// an error.
    pub async fn pe_ratios(&self, ticker: &str, options: &PeRatioOptions) -> Result<PeRatioSeries, ValuationError> {
        if EpsSource::parse(&options.source)? == EpsSource::Auto {
            return Err(ValuationError::Unsupported {
                feature: Feature::AutoEps,
                provider: self.prices.source_name().to_string(),
            });
        }

        let (prices, price_freshness) = self.fetch_prices(ticker, options.years).await?;
        let (store, _) = self.load_eps(options.filename.as_deref())?;

        let dates: Vec<_> = prices.iter().map(|p| p.date).collect();
        let ttm = build_ttm_series(store.get(ticker).unwrap_or_default(), &dates);
        let series = compute_pe_series(&prices, &ttm);

        let pe: Vec<Option<f64>> = series.iter().map(|p| p.pe).collect();
        let close: Vec<Option<f64>> = prices.iter().map(|p| Some(p.close)).collect();
        let pe = rolling_mean(&pe, options.smoothing);
        let close = rolling_mean(&close, options.smoothing);

        let pe_ttm = dates
            .iter()
            .zip(&pe)
            .filter_map(|(date, value)| value.map(|value| DatedValue { date: *date, value }))
            .collect();
        let price = dates
            .iter()
            .zip(&close)
            .filter_map(|(date, value)| value.map(|value| DatedValue { date: *date, value }))
            .collect();

        let mut unsupported = Vec::new();
        if options.include_forward {
            unsupported.push(Feature::ForwardPe);
        }

        Ok(PeRatioSeries {
            pe_ttm,
            pe_forward: None,
            price,
            unsupported,
            price_freshness,
        })
    }
}
