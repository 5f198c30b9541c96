// tests/api.rs
use anyhow::{anyhow, Result};
use approx::assert_relative_eq;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use warp::http::StatusCode;

use pe_valuation::config::CacheConfig;
use pe_valuation::models::{EpsRecord, PricePoint};
use pe_valuation::routes::routes;
use pe_valuation::services::eps_store::format_block;
use pe_valuation::services::price_cache::{ManualClock, PriceCache};
use pe_valuation::services::price_source::{PriceProvider, PriceSource};
use pe_valuation::services::valuation::Valuator;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Serves canned histories per ticker; unknown tickers fail like a dead upstream.
struct Canned {
    histories: HashMap<String, Vec<PricePoint>>,
}

#[async_trait]
impl PriceSource for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    async fn fetch_history(&self, ticker: &str) -> Result<Vec<PricePoint>> {
        self.histories
            .get(ticker)
            .cloned()
            .ok_or_else(|| anyhow!("no route to host"))
    }
}

/// First of every month from 2021-01 through 2024-06, flat at 80.
fn flat_prices() -> Vec<PricePoint> {
    let mut out = Vec::new();
    for year in 2021..=2024 {
        let last_month = if year == 2024 { 6 } else { 12 };
        for month in 1..=last_month {
            out.push(PricePoint::new(d(year, month, 1), 80.0));
        }
    }
    out
}

/// Quarterly EPS of 1.0 from 2020 on, so TTM is 4 at every price date.
fn flat_eps() -> Vec<EpsRecord> {
    let mut out = Vec::new();
    for year in 2020..=2024 {
        for (month, day) in [(3, 31), (6, 30), (9, 30), (12, 31)] {
            out.push(EpsRecord::new(d(year, month, day), 1.0));
        }
    }
    out
}

struct Harness {
    dir: TempDir,
    valuator: Arc<Valuator>,
}

impl Harness {
    fn new(healthy: bool) -> Self {
        let dir = tempdir().unwrap();

        let mut eps_file = format_block("MSFT", &flat_eps());
        eps_file.push_str(&format_block(
            "RAMP",
            &[EpsRecord::new(d(2023, 12, 31), 1.0)],
        ));
        // Reported only after the last price, so no date has a TTM EPS.
        eps_file.push_str(&format_block(
            "LATE",
            &[EpsRecord::new(d(2025, 3, 31), 1.0)],
        ));
        std::fs::write(dir.path().join("EPS_manual.txt"), eps_file).unwrap();

        let mut histories = HashMap::new();
        if healthy {
            histories.insert("MSFT".to_string(), flat_prices());
            histories.insert("LATE".to_string(), flat_prices());
            histories.insert(
                "RAMP".to_string(),
                vec![
                    PricePoint::new(d(2024, 1, 2), 10.0),
                    PricePoint::new(d(2024, 1, 3), 20.0),
                    PricePoint::new(d(2024, 1, 4), 30.0),
                ],
            );
        }

        // Entries written now are a day and a half old by the time they are read.
        let clock = Arc::new(ManualClock::new(Utc::now()));
        clock.advance(Duration::hours(36));
        let cache = PriceCache::with_clock(
            CacheConfig {
                dir: dir.path().join("cache"),
                ttl: if healthy { Duration::hours(48) } else { Duration::hours(24) },
            },
            clock,
        );

        let provider = PriceProvider::new(Arc::new(Canned { histories }), cache);
        let valuator = Arc::new(Valuator::new(provider, dir.path(), "EPS_manual.txt"));
        Harness { dir, valuator }
    }

    async fn get(&self, path: &str) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("GET")
            .path(path)
            .reply(&routes(self.valuator.clone()))
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("POST")
            .path(path)
            .json(&body)
            .reply(&routes(self.valuator.clone()))
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap())
    }

    async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let res = warp::test::request()
            .method("DELETE")
            .path(path)
            .reply(&routes(self.valuator.clone()))
            .await;
        (res.status(), serde_json::from_slice(res.body()).unwrap())
    }
}

#[tokio::test]
async fn health_is_ok() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn flat_history_scores_one_half() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/value_pe_avg/MSFT?years=2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["ticker"], json!("MSFT"));
    assert_relative_eq!(body["score"].as_f64().unwrap(), 0.5);
    assert_relative_eq!(body["score_100"].as_f64().unwrap(), 50.0);

    let details = &body["details"];
    assert_relative_eq!(details["current_pe"].as_f64().unwrap(), 20.0);
    assert_relative_eq!(details["avg_pe"].as_f64().unwrap(), 20.0);
    assert_relative_eq!(details["score_avg"].as_f64().unwrap(), 0.5);
    assert_relative_eq!(details["score_range"].as_f64().unwrap(), 0.5);
    assert_eq!(body["price_freshness"], json!("fresh"));
}

#[tokio::test]
async fn min_max_endpoint_reports_window() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/value_pe_min_max/msft").await;

    assert_eq!(status, StatusCode::OK);
    assert_relative_eq!(body["score"].as_f64().unwrap(), 0.5);
    assert_relative_eq!(body["min_pe"].as_f64().unwrap(), 20.0);
    assert_relative_eq!(body["max_pe"].as_f64().unwrap(), 20.0);
    // 2022-06-01 through 2024-06-01
    assert_eq!(body["data_points"], json!(25));
}

#[tokio::test]
async fn unknown_ticker_is_bad_request() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/value_pe_avg/NOPE").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("NOPE not found in EPS_manual.txt"));
}

#[tokio::test]
async fn escaping_eps_filename_is_rejected() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/value_pe_avg/MSFT?filename=..%2Fsecrets.txt").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn malformed_query_is_bad_request() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/value_pe_avg/MSFT?years=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/nothing_here").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], json!("Not Found"));
}

#[tokio::test]
async fn auto_source_is_unsupported() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/pe_ratios/MSFT?source=auto").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("canned"), "{error}");
    assert!(error.contains("manual"), "{error}");
}

#[tokio::test]
async fn forward_pe_request_is_flagged_unsupported() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/pe_ratios/MSFT?include_forward=true").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unsupported"], json!(["forward_pe"]));
    assert_eq!(body["pe_forward"], Value::Null);
    assert_eq!(body["pe_ttm"][0]["date"], json!("2021-01-01"));
    assert_relative_eq!(body["pe_ttm"][0]["value"].as_f64().unwrap(), 20.0);
}

#[tokio::test]
async fn smoothing_averages_trailing_values() {
    let h = Harness::new(true);
    let (status, body) = h.get("/api/pe_ratios/RAMP?smoothing=2").await;

    assert_eq!(status, StatusCode::OK);
    let price: Vec<f64> = body["price"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].as_f64().unwrap())
        .collect();
    assert_eq!(price, vec![10.0, 15.0, 25.0]);

    let pe: Vec<f64> = body["pe_ttm"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["value"].as_f64().unwrap())
        .collect();
    assert_eq!(pe, vec![10.0, 15.0, 25.0]);
}

#[tokio::test]
async fn batch_isolates_failures() {
    let h = Harness::new(true);
    let (status, body) = h
        .post(
            "/api/batch/value_pe_avg",
            json!({ "tickers": ["NOPE", "MSFT"], "years": 2 }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["ticker"], json!("NOPE"));
    assert_eq!(results[0]["success"], json!(false));
    assert_eq!(results[1]["ticker"], json!("MSFT"));
    assert_eq!(results[1]["success"], json!(true));
    assert_relative_eq!(results[1]["score"].as_f64().unwrap(), 0.5);
}

#[tokio::test]
async fn batch_pe_ratios_takes_shared_options() {
    let h = Harness::new(true);
    let (status, body) = h
        .post(
            "/api/batch/pe_ratios",
            json!({ "tickers": ["RAMP", "MSFT"], "source": "auto" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert!(results.iter().all(|r| r["success"] == json!(false)));
}

#[tokio::test]
async fn cache_endpoints_list_and_clear() {
    let h = Harness::new(true);
    h.get("/api/value_pe_avg/MSFT").await;
    h.get("/api/pe_ratios/RAMP").await;

    let (status, body) = h.get("/api/cache").await;
    assert_eq!(status, StatusCode::OK);
    let tickers: Vec<&str> = body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["ticker"].as_str().unwrap())
        .collect();
    assert_eq!(tickers, vec!["MSFT", "RAMP"]);

    let (_, body) = h.delete("/api/cache/msft").await;
    assert_eq!(body["removed"], json!(1));

    let (_, body) = h.delete("/api/cache").await;
    assert_eq!(body["removed"], json!(1));
    assert!(!h.dir.path().join("cache").join("RAMP.csv").exists());
}

#[tokio::test]
async fn dead_upstream_scores_on_stale_cache() {
    let h = Harness::new(false);
    h.valuator.prices().cache().save("MSFT", &flat_prices());

    let (status, body) = h.get("/api/value_pe_avg/MSFT").await;
    assert_eq!(status, StatusCode::OK);
    assert_relative_eq!(body["score"].as_f64().unwrap(), 0.5);
    let reason = body["price_freshness"]["stale"]["reason"].as_str().unwrap();
    assert!(reason.contains("no route to host"), "{reason}");
}

#[tokio::test]
async fn dead_upstream_without_cache_is_bad_request() {
    let h = Harness::new(false);
    let (status, body) = h.get("/api/value_pe_avg/MSFT").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("No price data found for MSFT"));
}

#[tokio::test]
async fn no_overlapping_eps_is_insufficient_for_both_strategies() {
    let h = Harness::new(true);
    for path in ["/api/value_pe_avg/LATE", "/api/value_pe_min_max/LATE"] {
        let (status, body) = h.get(path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["success"], json!(false));
        assert_eq!(
            body["error"],
            json!("Not enough EPS/price data for LATE over 2 years"),
            "{path}"
        );
    }
}

#[tokio::test]
async fn path_like_batch_ticker_stays_out_of_the_filesystem() {
    let h = Harness::new(true);
    std::fs::write(h.dir.path().join("SECRET.csv"), "Date,Close\n2024-01-02,42.0\n").unwrap();

    let (status, body) = h
        .post("/api/batch/pe_ratios", json!({ "tickers": ["../secret"] }))
        .await;

    assert_eq!(status, StatusCode::OK);
    let result = &body["results"][0];
    assert_eq!(result["success"], json!(false));
    assert_eq!(result["error"], json!("No price data found for ../secret"));
}
