// src/bin/value_tickers.rs
//! Scores a list of tickers one by one and prints a table.

use clap::Parser;
use log::error;
use std::sync::Arc;

use pe_valuation::config::AppConfig;
use pe_valuation::services::price_cache::PriceCache;
use pe_valuation::services::price_source::{PriceProvider, StooqSource};
use pe_valuation::services::valuation::Valuator;

#[derive(Parser)]
#[command(name = "value_tickers")]
#[command(about = "Print the average-relative P/E score for each ticker", long_about = None)]
struct Cli {
    /// Tickers to score
    #[arg(required = true)]
    tickers: Vec<String>,
    /// Lookback window in years
    #[arg(long, default_value_t = 2)]
    years: u32,
    /// EPS file name inside EPS_DIR
    #[arg(long)]
    filename: Option<String>,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let source = StooqSource::new(config.price_source_url.clone(), config.fetch_timeout)?;
    let provider = PriceProvider::new(Arc::new(source), PriceCache::new(config.cache.clone()));
    let valuator = Valuator::new(provider, config.eps_dir, config.eps_file);

    println!("{:<8} {:>7} {:>9} {:>9} {:>9} {:>9}", "TICKER", "SCORE", "P/E", "AVG", "MIN", "MAX");
    for ticker in &cli.tickers {
        match valuator.value_pe_avg(ticker, cli.years, cli.filename.as_deref()).await {
            Ok(valuation) => {
                let d = &valuation.details;
                let marker = if valuation.price_freshness.is_stale() { " (stale prices)" } else { "" };
                println!(
                    "{:<8} {:>7.1} {:>9.2} {:>9.2} {:>9.2} {:>9.2}{}",
                    ticker.to_uppercase(),
                    valuation.score * 100.0,
                    d.current_pe,
                    d.avg_pe,
                    d.min_pe,
                    d.max_pe,
                    marker
                );
            }
            Err(e) => {
                error!("{}: {}", ticker, e);
                println!("{:<8} error: {}", ticker.to_uppercase(), e);
            }
        }
    }
    Ok(())
}
