// src/services/eps_store.rs
//! Reader for the manual EPS file.
//!
//! ```text
//! AAPL
//! 2024-06-29    $1.40
//! 2024-09-28    $0.97
//! END
//! ```
//!
//! A later block for the same ticker replaces the earlier one wholesale.

use chrono::NaiveDate;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::EpsRecord;
use crate::services::dates::parse_naive_date;

#[derive(Debug, Error)]
pub enum EpsStoreError {
    #[error("cannot read EPS file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: invalid date {value:?} for {ticker}")]
    InvalidDate {
        line: usize,
        ticker: String,
        value: String,
    },
    #[error("line {line}: invalid EPS value {value:?} for {ticker}")]
    InvalidEps {
        line: usize,
        ticker: String,
        value: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EpsStore {
    by_ticker: HashMap<String, Vec<EpsRecord>>,
}

impl EpsStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EpsStoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EpsStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::parse(&text)?;
        debug!("Loaded EPS for {} tickers from {}", store.len(), path.display());
        Ok(store)
    }

    pub fn parse(text: &str) -> Result<Self, EpsStoreError> {
        let mut by_ticker = HashMap::new();
        let mut current: Option<String> = None;
        let mut rows: Vec<(usize, String, String)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if line == "END" {
                if let Some(ticker) = current.take() {
                    if !rows.is_empty() {
                        let records = build_records(&ticker, &rows)?;
                        by_ticker.insert(ticker, records);
                    }
                }
                rows.clear();
                continue;
            }

            if is_block_ticker(line) {
                current = Some(line.to_uppercase());
                rows.clear();
                continue;
            }

            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(date), Some(eps)) => rows.push((idx + 1, date.to_string(), eps.to_string())),
                _ => warn!("Skipping EPS line {}: {:?} is neither a ticker nor a DATE EPS row", idx + 1, line),
            }
        }

        if let Some(ticker) = current {
            warn!("EPS block for {} has no END marker; ignoring it", ticker);
        }

        Ok(EpsStore { by_ticker })
    }

    /// Records for `ticker` in date order. Lookup ignores case.
    pub fn get(&self, ticker: &str) -> Option<&[EpsRecord]> {
        self.by_ticker
            .get(&ticker.to_uppercase())
            .map(|records| records.as_slice())
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.get(ticker).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_ticker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ticker.is_empty()
    }
}

fn build_records(
    ticker: &str,
    rows: &[(usize, String, String)],
) -> Result<Vec<EpsRecord>, EpsStoreError> {
    let mut records = rows
        .iter()
        .map(|(line, date, eps)| {
            let date: NaiveDate = parse_naive_date(date).ok_or_else(|| EpsStoreError::InvalidDate {
                line: *line,
                ticker: ticker.to_string(),
                value: date.clone(),
            })?;
            let eps = eps
                .replace(['$', ','], "")
                .parse::<f64>()
                .map_err(|_| EpsStoreError::InvalidEps {
                    line: *line,
                    ticker: ticker.to_string(),
                    value: eps.clone(),
                })?;
            Ok(EpsRecord::new(date, eps))
        })
        .collect::<Result<Vec<_>, EpsStoreError>>()?;

    records.sort_by_key(|r| r.date);
    Ok(records)
}

/// Ticker lines are letters only; anything else in a block is read as a row.
pub fn is_block_ticker(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c.is_alphabetic())
}

/// Renders one block in the store's file format.
pub fn format_block(ticker: &str, records: &[EpsRecord]) -> String {
    let mut out = format!("\n{}\n", ticker.to_uppercase());
    for record in records {
        out.push_str(&format!("{}\t${}\n", record.date.format("%Y-%m-%d"), record.eps));
    }
    out.push_str("END\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_blocks_and_strips_currency() {
        let text = "AAPL\n2024-09-28  $0.97\n2024-06-29\t$1,40\nEND\n\nMSFT\n2024-06-30 2.95\nEND\n";
        let store = EpsStore::parse(text).unwrap();

        let aapl = store.get("AAPL").unwrap();
        assert_eq!(aapl.len(), 2);
        // sorted ascending regardless of file order
        assert_eq!(aapl[0].date, d(2024, 6, 29));
        assert_eq!(aapl[0].eps, 140.0);
        assert_eq!(aapl[1].eps, 0.97);
        assert_eq!(store.get("msft").unwrap()[0].eps, 2.95);
    }

    #[test]
    fn last_block_wins_without_merging() {
        let text = "NVDA\n2023-01-01 1.0\n2023-04-01 2.0\nEND\nNVDA\n2024-01-01 5.0\nEND\n";
        let store = EpsStore::parse(text).unwrap();
        let nvda = store.get("NVDA").unwrap();
        assert_eq!(nvda, &[EpsRecord::new(d(2024, 1, 1), 5.0)]);
    }

    #[test]
    fn empty_or_unterminated_blocks_are_ignored() {
        let text = "AMD\n2024-01-01 1.0\nEND\nAMD\nEND\nINTC\n2024-01-01 0.5\n";
        let store = EpsStore::parse(text).unwrap();
        assert_eq!(store.get("AMD").unwrap().len(), 1);
        assert!(!store.contains("INTC"));
    }

    #[test]
    fn bad_value_reports_line() {
        let err = EpsStore::parse("GOOG\n2024-01-01 abc\nEND\n").unwrap_err();
        match err {
            EpsStoreError::InvalidEps { line, ticker, .. } => {
                assert_eq!(line, 2);
                assert_eq!(ticker, "GOOG");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn formatted_block_parses_back() {
        let records = vec![EpsRecord::new(d(2024, 3, 31), 1.25), EpsRecord::new(d(2024, 6, 30), -0.5)];
        let store = EpsStore::parse(&format_block("tsla", &records)).unwrap();
        assert_eq!(store.get("TSLA").unwrap(), records.as_slice());
    }

    #[test]
    fn dotted_ticker_block_is_skipped() {
        let text = "BRK.B\n2024-03-31 $1.00\nEND\nAAPL\n2024-03-31 1.5\nEND\n";
        let store = EpsStore::parse(text).unwrap();
        assert_eq!(store.len(), 1);
        assert!(!store.contains("BRK.B"));
        assert!(store.contains("aapl"));
        assert!(!is_block_ticker("BRK.B"));
        assert!(is_block_ticker("brk"));
    }
}
