//! Core data models for the party catalog
//!
//! This module contains the product record served to the presentation layer,
//! the canonical category set, and the submodules that fetch and normalize
//! rows from the upstream sheet.

pub mod normalize;
pub mod sheets;

pub use normalize::{normalize, ParseError};
pub use sheets::{FetchError, ProductSource, SheetConfig, SheetsClient};

use serde::Serialize;
use std::sync::Arc;

/// An immutable, shareable snapshot of the catalog
///
/// Readers hold the `Arc`; the cache swaps in a new one on every successful
/// fetch, so a snapshot never changes underneath its holder.
pub type Products = Arc<Vec<Product>>;

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Identifier from the first sheet column
    pub id: String,
    /// Display name
    pub name: String,
    /// Canonical category
    pub category: Category,
    /// Free-form subcategory label
    pub subcategory: String,
    /// Price in dollars, never negative
    pub price: f64,
    /// Product description
    pub description: String,
    /// Image URL, or empty when the sheet has none
    pub image_url: String,
    /// Pipe-delimited specification lines
    pub specifications: String,
    /// Availability label
    pub stock_status: String,
}

/// The three categories the catalog recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Balloons,
    #[serde(rename = "Paper Plates")]
    PaperPlates,
    Other,
}

impl Category {
    /// Maps a raw sheet value onto a category
    ///
    /// Only the exact strings "Balloons" and "Paper Plates" are recognized;
    /// everything else, including case variants, lands in `Other`.
    pub fn from_cell(value: &str) -> Self {
        match value {
            "Balloons" => Category::Balloons,
            "Paper Plates" => Category::PaperPlates,
            _ => Category::Other,
        }
    }

    /// Human-readable label, matching the sheet spelling
    pub fn label(&self) -> &'static str {
        match self {
            Category::Balloons => "Balloons",
            Category::PaperPlates => "Paper Plates",
            Category::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl Product {
    /// Splits `specifications` into trimmed, non-empty lines
    pub fn spec_lines(&self) -> Vec<&str> {
        self.specifications
            .split('|')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Returns the `Key: Value` pairs found in the specification lines
    ///
    /// Lines without a `": "` separator are skipped.
    pub fn spec_pairs(&self) -> Vec<(&str, &str)> {
        self.spec_lines()
            .into_iter()
            .filter_map(|line| line.split_once(": "))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect()
    }
}

/// Returns the products in `category`, preserving catalog order
///
/// `None` selects every product.
pub fn filter_by_category(products: &[Product], category: Option<Category>) -> Vec<&Product> {
    products
        .iter()
        .filter(|product| category.map_or(true, |c| product.category == c))
        .collect()
}
