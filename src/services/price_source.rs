// src/services/price_source.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use csv::Reader;
use log::{debug, info, warn};
use reqwest::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{PriceFetch, PricePoint, PriceWindow};
use crate::services::dates::parse_naive_date;
use crate::services::price_cache::{filter_window, is_valid_ticker, series_covers, PriceCache};

#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Full available daily history, ascending by date.
    async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>>;
}

/// Daily CSV download from Stooq (`Date,Open,High,Low,Close,Volume`).
pub struct StooqSource {
    client: Client,
    base_url: String,
}

impl StooqSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()?;
        Ok(StooqSource {
            client,
            base_url: base_url.into(),
        })
    }

    /// Bare US symbols need the `.US` suffix; anything with a dot is passed through.
    pub fn symbol_for(ticker: &str) -> String {
        if ticker.contains('.') {
            ticker.to_string()
        } else {
            format!("{}.US", ticker)
        }
    }
}

#[async_trait]
impl PriceSource for StooqSource {
    fn name(&self) -> &str {
        "stooq"
    }

    async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>> {
        let symbol = Self::symbol_for(ticker);
        info!("Fetching daily prices for {} from {}", symbol, self.base_url);

        let csv_text = self
            .client
            .get(&self.base_url)
            .query(&[("s", symbol.as_str()), ("i", "d")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_price_csv(&csv_text).with_context(|| format!("malformed price data for {}", ticker))
    }
}

/// Reads a `Date`/`Close` table into a sorted series with unique dates.
///
/// Rows with an unparseable date or a non-finite close are skipped; a table
/// without a `Close` column, or without a single usable row, is an error.
pub fn parse_price_csv(text: &str) -> Result<Vec<PricePoint>> {
    let mut rdr = Reader::from_reader(text.as_bytes());

    let headers = rdr.headers()?.clone();
    let idx_date = headers
        .iter()
        .position(|h| h.trim() == "Date")
        .ok_or_else(|| anyhow!("no 'Date' column in price CSV"))?;
    let idx_close = headers
        .iter()
        .position(|h| h.trim() == "Close")
        .ok_or_else(|| anyhow!("no 'Close' column in price CSV"))?;

    // Later rows win on duplicate dates.
    let mut by_date = BTreeMap::new();
    let mut skipped = 0usize;
    for record in rdr.records() {
        let row = record?;
        let date = row.get(idx_date).and_then(parse_naive_date);
        let close = row
            .get(idx_close)
            .and_then(|cell| cell.trim().parse::<f64>().ok())
            .filter(|c| c.is_finite());
        match (date, close) {
            (Some(date), Some(close)) => {
                by_date.insert(date, close);
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        debug!("Skipped {} unusable price rows", skipped);
    }
    if by_date.is_empty() {
        return Err(anyhow!("price CSV has no usable rows"));
    }

    Ok(by_date
        .into_iter()
        .map(|(date, close)| PricePoint::new(date, close))
        .collect())
}

/// Cache-first access to a [`PriceSource`] with stale fallback.
pub struct PriceProvider {
    source: Arc<dyn PriceSource>,
    cache: PriceCache,
    in_flight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PriceProvider {
    pub fn new(source: Arc<dyn PriceSource>, cache: PriceCache) -> Self {
        PriceProvider {
            source,
            cache,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    fn gate(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(key.to_string()).or_default().clone()
    }

    /// Drops the gate for `key` once no other caller holds or waits on it.
    fn release(&self, key: &str, gate: Arc<tokio::sync::Mutex<()>>) {
        let mut map = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // one count in the map, one here
        if Arc::strong_count(&gate) == 2 {
            map.remove(key);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Prices for `ticker` restricted to `window`.
    ///
    /// A fresh covering cache entry is served without a remote call. Otherwise the
    /// full history is fetched and cached; if that fails, any cached series (even
    /// a stale one) is returned as [`PriceFetch::Stale`].
    pub async fn get_prices(&self, ticker: &str, window: &PriceWindow) -> PriceFetch {
        let key = ticker.trim().to_uppercase();
        if !is_valid_ticker(&key) {
            warn!("Rejecting price request for invalid ticker {:?}", ticker);
            return PriceFetch::Unavailable {
                reason: format!("invalid ticker {:?}", ticker),
            };
        }

        // One fetch per ticker at a time; later callers then see the fresh entry.
        let gate = self.gate(&key);
        let fetch = {
            let _guard = gate.lock().await;
            self.fetch_gated(&key, window).await
        };
        self.release(&key, gate);
        fetch
    }

    async fn fetch_gated(&self, key: &str, window: &PriceWindow) -> PriceFetch {
        let mut cached = Vec::new();
        if self.cache.is_valid(key) {
            cached = self.cache.load(key);
            if !cached.is_empty() && series_covers(&cached, window) {
                debug!("Cache hit for {}", key);
                return PriceFetch::Fresh(filter_window(cached, window));
            }
        }

        let reason = match self.source.fetch_history(key).await {
            Ok(prices) if !prices.is_empty() => {
                self.cache.save(key, &prices);
                return PriceFetch::Fresh(filter_window(prices, window));
            }
            Ok(_) => format!("{} returned no prices", self.source.name()),
            Err(e) => format!("{} failed: {:#}", self.source.name(), e),
        };
        warn!("Price fetch for {}: {}", key, reason);

        if cached.is_empty() {
            cached = self.cache.load(key);
        }
        if cached.is_empty() {
            return PriceFetch::Unavailable { reason };
        }

        info!("Using cached data for {}", key);
        PriceFetch::Stale {
            prices: filter_window(cached, window),
            reason,
        }
    }
}
