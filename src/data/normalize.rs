//! Record normalizer for Google Visualization query responses
//!
//! The sheet endpoint answers with JavaScript, not JSON: the payload is wrapped
//! in a `google.visualization.Query.setResponse(...)` call. This module strips
//! the wrapper, decodes the table into a loosely-typed intermediate form, and
//! converts each row positionally into a [`Product`], applying a default for
//! every cell that is missing, null, or of the wrong type.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Number, Value};
use thiserror::Error;
use tracing::warn;

use super::{Category, Product};

/// Matches the JavaScript call that wraps the JSON payload
static ENVELOPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)google\.visualization\.Query\.setResponse\((.*)\);")
        .expect("envelope pattern is a valid regex")
});

const DEFAULT_NAME: &str = "Unnamed Product";
const DEFAULT_STOCK_STATUS: &str = "In Stock";

/// Column positions in the products sheet
const COL_ID: usize = 0;
const COL_NAME: usize = 1;
const COL_CATEGORY: usize = 2;
const COL_SUBCATEGORY: usize = 3;
const COL_PRICE: usize = 4;
const COL_DESCRIPTION: usize = 5;
const COL_IMAGE_URL: usize = 6;
const COL_SPECIFICATIONS: usize = 7;
const COL_STOCK_STATUS: usize = 8;

/// Errors that can occur when normalizing a response body
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body does not contain the `setResponse(...)` wrapper
    #[error("envelope not found")]
    EnvelopeNotFound,

    /// The wrapped payload is not valid JSON or lacks `table.rows`
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Top-level query response payload
#[derive(Debug, Deserialize)]
struct QueryResponse {
    table: Table,
}

#[derive(Debug, Deserialize)]
struct Table {
    rows: Vec<Row>,
}

/// A sheet row; `c` may be absent or null on blank rows
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(default)]
    c: Option<Vec<Option<Cell>>>,
}

/// A sheet cell; only the raw value `v` is used, the formatted `f` is ignored
#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

/// Parses a raw response body into products, in sheet row order
///
/// # Returns
/// * `Ok(Vec<Product>)` - One product per row; an empty table yields an empty list
/// * `Err(ParseError)` - If the wrapper is missing or the payload cannot be decoded
pub fn normalize(raw_body: &str) -> Result<Vec<Product>, ParseError> {
    let payload = extract_payload(raw_body)?;
    let response: QueryResponse = serde_json::from_str(payload)?;

    Ok(response
        .table
        .rows
        .iter()
        .map(|row| product_from_cells(row.c.as_deref().unwrap_or_default()))
        .collect())
}

/// Returns the JSON text between `setResponse(` and the final `);`
fn extract_payload(raw_body: &str) -> Result<&str, ParseError> {
    ENVELOPE
        .captures(raw_body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::EnvelopeNotFound)
}

/// Maps one row's cells onto product fields by position
fn product_from_cells(cells: &[Option<Cell>]) -> Product {
    let category = text_field(cells, COL_CATEGORY, "category", "");

    Product {
        id: text_field(cells, COL_ID, "id", ""),
        name: text_field(cells, COL_NAME, "name", DEFAULT_NAME),
        category: Category::from_cell(&category),
        subcategory: text_field(cells, COL_SUBCATEGORY, "subcategory", ""),
        price: price_field(cells, COL_PRICE),
        description: text_field(cells, COL_DESCRIPTION, "description", ""),
        image_url: text_field(cells, COL_IMAGE_URL, "image_url", ""),
        specifications: text_field(cells, COL_SPECIFICATIONS, "specifications", ""),
        stock_status: text_field(cells, COL_STOCK_STATUS, "stock_status", DEFAULT_STOCK_STATUS),
    }
}

/// Returns the cell value at `index`, treating missing cells and nulls alike
fn cell_value(cells: &[Option<Cell>], index: usize) -> Option<&Value> {
    cells
        .get(index)
        .and_then(Option::as_ref)
        .map(|cell| &cell.v)
        .filter(|value| !value.is_null())
}

/// Reads a text field, falling back to `default`
///
/// Strings pass through unless empty. Numbers are rendered as text, since
/// sheets commonly store ids as numbers. Any other type is a coercion warning.
fn text_field(cells: &[Option<Cell>], index: usize, field: &'static str, default: &str) -> String {
    match cell_value(cells, index) {
        None => default.to_string(),
        Some(Value::String(s)) if s.is_empty() => default.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => number_text(n),
        Some(other) => {
            warn!(field, value = %other, "unexpected cell type, using default");
            default.to_string()
        }
    }
}

/// Reads the price, defaulting to 0 for anything but a finite non-negative number
fn price_field(cells: &[Option<Cell>], index: usize) -> f64 {
    match cell_value(cells, index) {
        None => 0.0,
        Some(Value::Number(n)) => match n.as_f64() {
            // Adding zero turns -0.0 into 0.0
            Some(price) if price.is_finite() && price >= 0.0 => price + 0.0,
            _ => {
                warn!(field = "price", value = %n, "price out of range, using 0");
                0.0
            }
        },
        Some(other) => {
            warn!(field = "price", value = %other, "price is not numeric, using 0");
            0.0
        }
    }
}

/// Formats a JSON number, dropping a zero fractional part (`7.0` becomes `"7"`)
fn number_text(n: &Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}
