// src/services/mod.rs
pub mod dates;
pub mod eps_scraper;
pub mod eps_store;
pub mod pe;
pub mod price_cache;
pub mod price_source;
pub mod ttm;
pub mod valuation;
