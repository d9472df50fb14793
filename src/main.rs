//! Party Catalog - list products from the shop's catalog sheet
//!
//! Fetches the catalog once and prints it, or with `--watch` keeps the cache
//! refreshing in the background and reprints after every cycle.

use chrono::{DateTime, Local, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use partycatalog::cache::CatalogCache;
use partycatalog::cli::{Cli, StartupConfig};
use partycatalog::data::{filter_by_category, Product, SheetsClient};
use partycatalog::display::render_listing;
use partycatalog::refresh::{RefreshConfig, RefreshHandle, RefreshMessage};

/// Prints the filtered catalog as text or JSON
fn print_catalog(
    products: &[Product],
    fetched_at: Option<DateTime<Utc>>,
    config: &StartupConfig,
) -> Result<(), serde_json::Error> {
    let selected = filter_by_category(products, config.category);

    if config.json {
        println!("{}", serde_json::to_string_pretty(&selected)?);
        return Ok(());
    }

    let fetched = fetched_at
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("{} products (fetched {})\n", selected.len(), fetched);
    print!("{}", render_listing(&selected));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "partycatalog=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match StartupConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let client = SheetsClient::new(config.sheet.clone())?;
    let cache = CatalogCache::new(client, config.catalog.clone());

    let products = cache.get_products().await;
    print_catalog(&products, cache.fetched_at(), &config)?;

    if !config.watch {
        return Ok(());
    }

    let mut refresh = RefreshHandle::spawn(cache.clone(), RefreshConfig::for_cache(&cache));
    loop {
        tokio::select! {
            message = refresh.recv() => match message {
                Some(RefreshMessage::Refreshed { products, outcome }) => {
                    info!(?outcome, count = products.len(), "catalog refresh finished");
                    print_catalog(&products, cache.fetched_at(), &config)?;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping refresh");
                break;
            }
        }
    }

    refresh.shutdown().await;
    Ok(())
}
