// src/config.rs
use chrono::Duration;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_CACHE_DIR: &str = "cache";
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;
pub const DEFAULT_EPS_FILE: &str = "EPS_manual.txt";
pub const DEFAULT_PRICE_SOURCE_URL: &str = "https://stooq.com/q/d/l/";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Where and how long price series are kept on disk.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            dir: PathBuf::from(DEFAULT_CACHE_DIR),
            ttl: Duration::hours(DEFAULT_CACHE_TTL_HOURS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cache: CacheConfig,
    /// Directory that `filename` query parameters are resolved against.
    pub eps_dir: PathBuf,
    pub eps_file: String,
    pub price_source_url: String,
    pub fetch_timeout: std::time::Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: DEFAULT_PORT,
            cache: CacheConfig::default(),
            eps_dir: PathBuf::from("."),
            eps_file: DEFAULT_EPS_FILE.to_string(),
            price_source_url: DEFAULT_PRICE_SOURCE_URL.to_string(),
            fetch_timeout: std::time::Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    /// Reads `.env` (if present) and the process environment, falling back to defaults.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = AppConfig::default();

        AppConfig {
            port: parse_var("PORT", defaults.port),
            cache: CacheConfig {
                dir: env::var("CACHE_DIR").map(PathBuf::from).unwrap_or(defaults.cache.dir),
                ttl: Duration::hours(parse_var("CACHE_TTL_HOURS", DEFAULT_CACHE_TTL_HOURS)),
            },
            eps_dir: env::var("EPS_DIR").map(PathBuf::from).unwrap_or(defaults.eps_dir),
            eps_file: env::var("EPS_FILE").unwrap_or(defaults.eps_file),
            price_source_url: env::var("PRICE_SOURCE_URL").unwrap_or(defaults.price_source_url),
            fetch_timeout: std::time::Duration::from_secs(parse_var(
                "FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
        }
    }
}

fn parse_var<T: FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("${} is not valid ({:?}), defaulting to {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_behavior() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl, Duration::hours(24));
        assert_eq!(config.fetch_timeout, std::time::Duration::from_secs(10));
        assert_eq!(config.eps_file, "EPS_manual.txt");
    }

    #[test]
    fn unparseable_values_fall_back() {
        assert_eq!(parse_var("PE_VALUATION_TEST_UNSET_VAR", 7u16), 7);
    }
}
