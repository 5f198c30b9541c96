// src/bin/fetch_eps.rs
//! Scrapes reported EPS for each ticker and appends it to the EPS file.

use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use std::time::Duration;

use pe_valuation::config::AppConfig;
use pe_valuation::services::eps_scraper::{append_block, EpsScraper, DEFAULT_FINANCIALS_URL};
use pe_valuation::services::eps_store::is_block_ticker;

#[derive(Parser)]
#[command(name = "fetch_eps")]
#[command(about = "Append scraped quarterly EPS to the manual EPS file", long_about = None)]
struct Cli {
    /// Tickers to scrape
    #[arg(required = true)]
    tickers: Vec<String>,
    /// EPS file to append to (defaults to EPS_DIR/EPS_FILE)
    #[arg(long)]
    output: Option<PathBuf>,
    /// Financials site base URL
    #[arg(long, default_value = DEFAULT_FINANCIALS_URL)]
    base_url: String,
    /// Seconds to pause between tickers
    #[arg(long, default_value_t = 2)]
    delay: u64,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env();

    let output = cli.output.unwrap_or_else(|| config.eps_dir.join(&config.eps_file));
    let scraper = EpsScraper::new(cli.base_url, config.fetch_timeout)?;

    let mut failed = 0;
    for (i, ticker) in cli.tickers.iter().enumerate() {
        // The EPS file only recognises letter-only ticker lines.
        if !is_block_ticker(ticker) {
            error!("{}: EPS file tickers must be letters only", ticker);
            println!("{:<8} skipped: not storable in the EPS file", ticker.to_uppercase());
            failed += 1;
            continue;
        }

        if i > 0 && cli.delay > 0 {
            tokio::time::sleep(Duration::from_secs(cli.delay)).await;
        }

        match scraper.fetch(ticker).await {
            Ok(scraped) => {
                if scraped.annual_only {
                    warn!("{}: only annual EPS found, values are fiscal-year totals", ticker);
                }
                append_block(&output, ticker, &scraped.records)?;
                info!("{}: appended {} records to {}", ticker, scraped.records.len(), output.display());
                println!("{:<8} {} records", ticker.to_uppercase(), scraped.records.len());
            }
            Err(e) => {
                error!("{}: {}", ticker, e);
                println!("{:<8} failed: {}", ticker.to_uppercase(), e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        warn!("{} of {} tickers failed", failed, cli.tickers.len());
    }
    Ok(())
}
