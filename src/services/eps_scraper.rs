// src/services/eps_scraper.rs
//! Pulls reported EPS from a public financials page and appends it to the EPS file.

use chrono::NaiveDate;
use log::{info, warn};
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::models::EpsRecord;
use crate::services::eps_store::format_block;

pub const DEFAULT_FINANCIALS_URL: &str = "https://stockanalysis.com";

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Scraper Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to fetch data: HTTP {0}")]
    Status(u16),
    #[error("invalid selector: {0}")]
    Selector(String),
    #[error("Could not parse table from HTML")]
    NoTable,
    #[error("EPS row not found in any table")]
    NoEpsRow,
    #[error("No valid EPS data found")]
    NoData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedEps {
    pub records: Vec<EpsRecord>,
    /// Only fiscal-year columns were found; values are annual, not quarterly.
    pub annual_only: bool,
}

pub struct EpsScraper {
    client: Client,
    base_url: String,
}

impl EpsScraper {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ScrapeError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .build()?;
        Ok(EpsScraper {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn get_page(&self, url: &str) -> Result<Result<String, u16>, ScrapeError> {
        info!("Fetching EPS page: {}", url);
        let resp = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Ok(Err(status.as_u16()));
        }
        Ok(Ok(resp.text().await?))
    }

    /// Quarterly statements first; the default (annual) page if that one is missing.
    pub async fn fetch(&self, ticker: &str) -> Result<ScrapedEps, ScrapeError> {
        let slug = ticker.trim().to_lowercase();
        let quarterly = format!("{}/stocks/{}/financials/quarterly/", self.base_url, slug);

        let html = match self.get_page(&quarterly).await? {
            Ok(html) => html,
            Err(code) => {
                warn!("Quarterly page for {} returned HTTP {}; trying default page", ticker, code);
                let fallback = format!("{}/stocks/{}/financials/", self.base_url, slug);
                self.get_page(&fallback).await?.map_err(ScrapeError::Status)?
            }
        };

        extract_eps(&html, chrono::Local::now().date_naive())
    }
}

fn selector(css: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(css).map_err(|e| ScrapeError::Selector(format!("{:?}", e)))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cell texts of one row, repeating a cell across its `colspan`.
fn row_cells(row: ElementRef<'_>, cells: &Selector) -> Vec<String> {
    let mut out = Vec::new();
    for cell in row.select(cells) {
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let text = cell_text(cell);
        out.extend(std::iter::repeat(text).take(span));
    }
    out
}

/// Column headers, joining stacked header rows with a space.
fn column_headers(header_rows: &[Vec<String>]) -> Vec<String> {
    let width = header_rows.iter().map(|r| r.len()).max().unwrap_or(0);
    (0..width)
        .map(|i| {
            header_rows
                .iter()
                .filter_map(|r| r.get(i))
                .filter(|s| !s.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

/// Finds the EPS row in the page's tables and reads one value per dated column.
///
/// Columns dated after `today` are skipped, as are `TTM` columns and empty or
/// `-` cells. Quarterly columns are preferred; fiscal-year columns are only
/// used when no quarterly value exists.
pub fn extract_eps(html: &str, today: NaiveDate) -> Result<ScrapedEps, ScrapeError> {
    let document = Html::parse_document(html);
    let table_sel = selector("table")?;
    let head_row_sel = selector("thead tr")?;
    let body_row_sel = selector("tbody tr")?;
    let any_row_sel = selector("tr")?;
    let cell_sel = selector("th, td")?;
    let date_re = Regex::new(r"([A-Za-z]{3}\s+\d{1,2},\s+\d{4})")
        .map_err(|e| ScrapeError::Selector(e.to_string()))?;

    let mut saw_table = false;
    for table in document.select(&table_sel) {
        saw_table = true;

        let mut header_rows: Vec<Vec<String>> = table
            .select(&head_row_sel)
            .map(|row| row_cells(row, &cell_sel))
            .collect();
        let mut body_rows: Vec<Vec<String>> = table
            .select(&body_row_sel)
            .map(|row| row_cells(row, &cell_sel))
            .collect();
        if header_rows.is_empty() {
            let mut rows = table.select(&any_row_sel).map(|row| row_cells(row, &cell_sel));
            header_rows = rows.next().into_iter().collect();
            body_rows = rows.collect();
        }

        let eps_row = body_rows.iter().find(|row| {
            row.first().is_some_and(|label| {
                let label = label.to_lowercase();
                label.contains("eps (diluted)") || label.contains("earnings per share")
            })
        });
        let Some(eps_row) = eps_row else {
            continue;
        };

        let headers = column_headers(&header_rows);
        let mut quarterly = Vec::new();
        let mut annual = Vec::new();

        for (i, header) in headers.iter().enumerate().skip(1) {
            let Some(date) = date_re
                .captures(header)
                .and_then(|caps| caps.get(1))
                .and_then(|m| {
                    let normalized = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
                    NaiveDate::parse_from_str(&normalized, "%b %d, %Y").ok()
                })
            else {
                continue;
            };
            if date > today {
                continue;
            }

            let raw = eps_row.get(i).map(|s| s.trim()).unwrap_or("");
            if raw.is_empty() || raw == "-" || raw.to_lowercase().contains("nan") {
                continue;
            }
            let Ok(eps) = raw.replace(['$', ','], "").parse::<f64>() else {
                continue;
            };

            if header.contains("FY") || header.contains("Year") {
                annual.push(EpsRecord::new(date, eps));
            } else if !header.contains("TTM") {
                quarterly.push(EpsRecord::new(date, eps));
            }
        }

        let (mut records, annual_only) = if !quarterly.is_empty() {
            (quarterly, false)
        } else if !annual.is_empty() {
            (annual, true)
        } else {
            return Err(ScrapeError::NoData);
        };
        records.sort_by_key(|r| r.date);
        return Ok(ScrapedEps { records, annual_only });
    }

    if saw_table {
        Err(ScrapeError::NoEpsRow)
    } else {
        Err(ScrapeError::NoTable)
    }
}

/// Appends a block to the EPS file. Readers keep the last block per ticker,
/// so appending an existing ticker replaces it.
pub fn append_block(path: impl AsRef<Path>, ticker: &str, records: &[EpsRecord]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path.as_ref())?;
    file.write_all(format_block(ticker, records).as_bytes())?;
    info!("Appended {} EPS rows for {} to {}", records.len(), ticker.to_uppercase(), path.as_ref().display());
    Ok(())
}
