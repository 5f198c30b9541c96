// src/bin/cache_admin.rs
use clap::{Parser, Subcommand};

use pe_valuation::config::AppConfig;
use pe_valuation::services::price_cache::PriceCache;

#[derive(Parser)]
#[command(name = "cache_admin")]
#[command(about = "Inspect or clear the on-disk price cache", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List cached tickers with age and size
    List,
    /// Remove one ticker's entry, or all entries with --all
    Clear {
        ticker: Option<String>,
        #[arg(long, conflicts_with = "ticker")]
        all: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::from_env();
    let cache = PriceCache::new(config.cache);

    match cli.command {
        Commands::List => {
            let entries = cache.info();
            if entries.is_empty() {
                println!("Cache at {} is empty", cache.config().dir.display());
                return;
            }
            println!("{:<8} {:>10} {:>10} {:>6}", "TICKER", "AGE (h)", "SIZE (KB)", "VALID");
            for entry in entries {
                println!(
                    "{:<8} {:>10.1} {:>10.1} {:>6}",
                    entry.ticker, entry.age_hours, entry.size_kb, entry.valid
                );
            }
        }
        Commands::Clear { ticker, all } => {
            if ticker.is_none() && !all {
                eprintln!("Pass a ticker or --all");
                std::process::exit(2);
            }
            let removed = cache.clear(ticker.as_deref());
            println!("Removed {} cache entries", removed);
        }
    }
}
