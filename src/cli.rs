//! Command-line interface parsing for the party catalog
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the fixed configuration the catalog runs with.

use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::cache::CatalogConfig;
use crate::data::{Category, SheetConfig};

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified category name is not recognized
    #[error("Invalid category: '{0}'. Valid categories: all, balloons, paper-plates, other")]
    InvalidCategory(String),

    /// A TTL of zero would refetch on every read
    #[error("TTL must be at least one second")]
    ZeroTtl,

    /// A zero timeout would fail every request
    #[error("Timeout must be at least one second")]
    ZeroTimeout,
}

/// Party catalog - list products from the catalog sheet
#[derive(Parser, Debug)]
#[command(name = "partycatalog")]
#[command(about = "Cached product catalog backed by a Google Sheet")]
#[command(version)]
pub struct Cli {
    /// Google Sheets document id (defaults to the shop's catalog sheet)
    #[arg(long, value_name = "ID")]
    pub sheet_id: Option<String>,

    /// Sheet tab holding the products
    #[arg(long, value_name = "NAME")]
    pub sheet: Option<String>,

    /// Seconds a fetched catalog is served before refetching
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    pub ttl: u64,

    /// Seconds before a sheet request is abandoned
    #[arg(long, value_name = "SECONDS", default_value_t = 10)]
    pub timeout: u64,

    /// Only show one category
    ///
    /// Valid categories: all, balloons, paper-plates, other
    #[arg(long, value_name = "CATEGORY", default_value = "all")]
    pub category: String,

    /// Print products as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Keep running and reprint the catalog after every refresh
    #[arg(long)]
    pub watch: bool,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone, Default)]
pub struct StartupConfig {
    /// Where to fetch the catalog from
    pub sheet: SheetConfig,
    /// Cache settings
    pub catalog: CatalogConfig,
    /// Category filter; `None` shows everything
    pub category: Option<Category>,
    /// Emit JSON output
    pub json: bool,
    /// Keep refreshing until interrupted
    pub watch: bool,
}

/// Parses a category filter argument
///
/// # Returns
/// * `Ok(None)` for "all"
/// * `Ok(Some(Category))` for a recognized category
/// * `Err(CliError::InvalidCategory)` otherwise
pub fn parse_category_arg(s: &str) -> Result<Option<Category>, CliError> {
    match s.to_lowercase().as_str() {
        "all" => Ok(None),
        "balloons" | "balloon" => Ok(Some(Category::Balloons)),
        "paper-plates" | "paper plates" | "plates" => Ok(Some(Category::PaperPlates)),
        "other" => Ok(Some(Category::Other)),
        _ => Err(CliError::InvalidCategory(s.to_string())),
    }
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with appropriate settings
    /// * `Err(CliError)` if a value is out of range or unrecognized
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        if cli.ttl == 0 {
            return Err(CliError::ZeroTtl);
        }
        if cli.timeout == 0 {
            return Err(CliError::ZeroTimeout);
        }

        let defaults = SheetConfig::default();
        let sheet = SheetConfig {
            sheet_id: cli.sheet_id.clone().unwrap_or(defaults.sheet_id),
            sheet_name: cli.sheet.clone().unwrap_or(defaults.sheet_name),
            base_url: defaults.base_url,
            request_timeout: Duration::from_secs(cli.timeout),
        };

        Ok(StartupConfig {
            sheet,
            catalog: CatalogConfig {
                ttl: Duration::from_secs(cli.ttl),
            },
            category: parse_category_arg(&cli.category)?,
            json: cli.json,
            watch: cli.watch,
        })
    }
}
