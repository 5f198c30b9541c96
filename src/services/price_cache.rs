// src/services/price_cache.rs
//! On-disk cache of daily closes, one CSV per ticker.
//!
//! The file's modification time is the freshness clock. Every operation is
//! best-effort: read problems look like an empty cache and write problems are
//! logged, so a broken cache never fails a valuation.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info, warn};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::config::CacheConfig;
use crate::models::{CacheInfo, PricePoint, PriceWindow};
use crate::services::dates::years_before;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used to age cache entries in tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|e| *e.into_inner())
    }
}

/// Tickers double as cache file names, so only symbol characters are allowed.
pub fn is_valid_ticker(ticker: &str) -> bool {
    !ticker.is_empty()
        && !ticker.starts_with('.')
        && !ticker.contains("..")
        && ticker.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

pub struct PriceCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        PriceCache { config, clock }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// `None` for tickers that are not plain symbols.
    fn path_for(&self, ticker: &str) -> Option<PathBuf> {
        if !is_valid_ticker(ticker) {
            warn!("Refusing cache path for ticker {:?}", ticker);
            return None;
        }
        Some(self.config.dir.join(format!("{}.csv", ticker.to_uppercase())))
    }

    fn age_of(&self, path: &PathBuf) -> Option<Duration> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        let modified: DateTime<Utc> = modified.into();
        Some(self.clock.now() - modified)
    }

    /// True iff an entry exists and is younger than the TTL.
    pub fn is_valid(&self, ticker: &str) -> bool {
        match self.path_for(ticker).and_then(|path| self.age_of(&path)) {
            Some(age) => age < self.config.ttl,
            None => false,
        }
    }

    /// Persisted series, or empty if missing or unreadable.
    pub fn load(&self, ticker: &str) -> Vec<PricePoint> {
        let Some(path) = self.path_for(ticker).filter(|path| path.exists()) else {
            return Vec::new();
        };

        let mut reader = match csv::Reader::from_path(&path) {
            Ok(reader) => reader,
            Err(e) => {
                error!("Error loading cache for {}: {}", ticker, e);
                return Vec::new();
            }
        };

        let mut series = Vec::new();
        for row in reader.deserialize::<PricePoint>() {
            match row {
                Ok(point) => series.push(point),
                Err(e) => {
                    error!("Error loading cache for {}: {}", ticker, e);
                    return Vec::new();
                }
            }
        }
        debug!("Loaded {} cached closes for {}", series.len(), ticker);
        series
    }

    /// Writes date and close only. Empty input is ignored.
    pub fn save(&self, ticker: &str, series: &[PricePoint]) {
        if series.is_empty() {
            return;
        }
        if let Err(e) = self.write(ticker, series) {
            error!("Error saving cache for {}: {}", ticker, e);
        }
    }

    fn write(&self, ticker: &str, series: &[PricePoint]) -> anyhow::Result<()> {
        let path = self
            .path_for(ticker)
            .ok_or_else(|| anyhow::anyhow!("invalid ticker {:?}", ticker))?;
        fs::create_dir_all(&self.config.dir)?;
        // Write beside the target and rename so readers never see a torn file.
        let tmp = path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp)?;
            for point in series {
                writer.serialize(point)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &path)?;
        info!("Cached {} closes for {}", series.len(), ticker.to_uppercase());
        Ok(())
    }

    /// Whether the persisted span contains `window`.
    pub fn covers(&self, ticker: &str, window: &PriceWindow) -> bool {
        series_covers(&self.load(ticker), window)
    }

    /// Removes one ticker's entry, or every entry when `ticker` is `None`.
    /// Returns how many files were deleted.
    pub fn clear(&self, ticker: Option<&str>) -> usize {
        match ticker {
            Some(ticker) => {
                let Some(path) = self.path_for(ticker).filter(|path| path.exists()) else {
                    return 0;
                };
                match fs::remove_file(&path) {
                    Ok(()) => 1,
                    Err(e) => {
                        warn!("Failed to clear cache for {}: {}", ticker, e);
                        0
                    }
                }
            }
            None => self
                .entries()
                .into_iter()
                .filter(|(_, path)| match fs::remove_file(path) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to remove {}: {}", path.display(), e);
                        false
                    }
                })
                .count(),
        }
    }

    pub fn info(&self) -> Vec<CacheInfo> {
        let mut info: Vec<CacheInfo> = self
            .entries()
            .into_iter()
            .filter_map(|(ticker, path)| {
                let size = fs::metadata(&path).ok()?.len();
                let age = self.age_of(&path)?;
                Some(CacheInfo {
                    valid: age < self.config.ttl,
                    ticker,
                    age_hours: age.num_seconds() as f64 / 3600.0,
                    size_kb: size as f64 / 1024.0,
                })
            })
            .collect();
        info.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        info
    }

    fn entries(&self) -> Vec<(String, PathBuf)> {
        let dir = match fs::read_dir(&self.config.dir) {
            Ok(dir) => dir,
            Err(e) => {
                debug!("Cache dir {} not readable: {}", self.config.dir.display(), e);
                return Vec::new();
            }
        };

        dir.filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "csv"))
            .filter_map(|path| {
                let ticker = path.file_stem()?.to_str()?.to_string();
                Some((ticker, path))
            })
            .collect()
    }
}

/// Span check on an already loaded series; see [`PriceCache::covers`].
pub fn series_covers(series: &[PricePoint], window: &PriceWindow) -> bool {
    let (Some(first), Some(last)) = (series.first(), series.last()) else {
        return false;
    };

    match *window {
        PriceWindow::All => true,
        PriceWindow::Years(years) => first.date <= years_before(last.date, years),
        PriceWindow::Range { start, end } => {
            start.map_or(true, |start| first.date <= start) && end.map_or(true, |end| last.date >= end)
        }
    }
}

/// Rows of `series` that fall inside `window`.
pub fn filter_window(series: Vec<PricePoint>, window: &PriceWindow) -> Vec<PricePoint> {
    match *window {
        PriceWindow::All => series,
        PriceWindow::Years(years) => match series.last() {
            Some(last) => {
                let cutoff = years_before(last.date, years);
                series.into_iter().filter(|p| p.date >= cutoff).collect()
            }
            None => series,
        },
        PriceWindow::Range { start, end } => series
            .into_iter()
            .filter(|p| start.map_or(true, |s| p.date >= s) && end.map_or(true, |e| p.date <= e))
            .collect(),
    }
}
