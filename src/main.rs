use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use warp::Filter;

use pe_valuation::config::AppConfig;
use pe_valuation::routes;
use pe_valuation::services::price_cache::PriceCache;
use pe_valuation::services::price_source::{PriceProvider, StooqSource};
use pe_valuation::services::valuation::Valuator;

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Logger initialized. Starting the application...");

    let config = AppConfig::from_env();
    info!(
        "Using PORT: {}, cache dir: {}, TTL: {}h",
        config.port,
        config.cache.dir.display(),
        config.cache.ttl.num_hours()
    );

    let source = match StooqSource::new(config.price_source_url.clone(), config.fetch_timeout) {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to build price source client: {}", e);
            std::process::exit(1);
        }
    };

    let provider = PriceProvider::new(Arc::new(source), PriceCache::new(config.cache.clone()));
    let valuator = Arc::new(Valuator::new(provider, config.eps_dir.clone(), config.eps_file.clone()));

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

    let cors = warp::cors()
        .allow_any_origin()
        .allow_header("content-type")
        .allow_methods(vec!["GET", "POST", "PUT", "DELETE"]);

    let api = routes::routes(valuator).with(cors);
    info!("Routes configured successfully with CORS.");

    info!("Starting server on {}", addr);
    warp::serve(api).run(addr).await;
}
