//! Display helpers for catalog products
//!
//! Pure formatting functions shared by anything that renders the catalog:
//! currency formatting, image fallbacks, and a plain-text listing.

use crate::data::sheets::urlencoded;
use crate::data::{Category, Product};

/// Placeholder image service used when a product has no usable image
const PLACEHOLDER_BASE_URL: &str = "https://placehold.co/400x300?text=";

/// Formats a price as US dollars, e.g. `$1,234.50`
pub fn format_price(price: f64) -> String {
    let cents = (price.abs() * 100.0).round() as u64;
    let dollars = (cents / 100).to_string();

    let mut grouped = String::with_capacity(dollars.len() + dollars.len() / 3);
    for (i, digit) in dollars.chars().enumerate() {
        if i > 0 && (dollars.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 && cents > 0 { "-" } else { "" };
    format!("{}${}.{:02}", sign, grouped, cents % 100)
}

/// Returns the image to show for a product
///
/// Uses the product's own URL when it looks like one, otherwise a
/// category-themed placeholder labelled with the product name.
pub fn image_url(product: &Product) -> String {
    if product.image_url.starts_with("http") {
        return product.image_url.clone();
    }

    let icon = match product.category {
        Category::Balloons => "🎈",
        Category::PaperPlates | Category::Other => "🍽️",
    };
    format!(
        "{}{}",
        PLACEHOLDER_BASE_URL,
        urlencoded(&format!("{}{}", icon, product.name))
    )
}

/// "Category › Subcategory", or just the category when there is no subcategory
pub fn category_heading(product: &Product) -> String {
    if product.subcategory.is_empty() {
        product.category.label().to_string()
    } else {
        format!("{} › {}", product.category.label(), product.subcategory)
    }
}

/// Renders products as a plain-text listing, one block per product
pub fn render_listing(products: &[&Product]) -> String {
    let mut out = String::new();
    for product in products {
        out.push_str(&format!(
            "{}  {}  [{}]\n",
            product.name,
            format_price(product.price),
            product.stock_status
        ));
        out.push_str(&format!("  {}\n", category_heading(product)));
        if !product.description.is_empty() {
            out.push_str(&format!("  {}\n", product.description));
        }
        for line in product.spec_lines() {
            out.push_str(&format!("  - {}\n", line));
        }
        out.push_str(&format!("  {}\n", image_url(product)));
    }
    out
}
