//! Google Sheets query endpoint client
//!
//! Fetches the raw `gviz/tq` response for the products tab. The body is handed
//! back untouched; turning it into products is the normalizer's job.

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::ParseError;

/// Base URL for published Google Sheets documents
const SHEETS_BASE_URL: &str = "https://docs.google.com/spreadsheets/d";

/// Sheet document holding the catalog
const DEFAULT_SHEET_ID: &str = "1lNomVmepAIZ_gwvYiTDir4i79C-iYgza6s9U69SxrWE";

/// Tab within the document that lists products
const DEFAULT_SHEET_NAME: &str = "Products";

/// Upper bound on a single request, connection included
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when fetching the catalog
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed (connection, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("HTTP error status: {0}")]
    Status(StatusCode),

    /// The response body could not be normalized
    #[error("Failed to parse sheet response: {0}")]
    Parse(#[from] ParseError),
}

/// Where the catalog lives upstream
///
/// Fixed at startup; nothing mutates it afterwards.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    /// Google Sheets document identifier
    pub sheet_id: String,
    /// Name of the tab to query
    pub sheet_name: String,
    /// Base URL of the sheets service (overridable for testing)
    pub base_url: String,
    /// Timeout applied to every request
    pub request_timeout: Duration,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            sheet_id: DEFAULT_SHEET_ID.to_string(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            base_url: SHEETS_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl SheetConfig {
    /// Builds the JSON query URL for the configured tab
    pub fn endpoint_url(&self) -> String {
        format!(
            "{}/{}/gviz/tq?tqx=out:json&sheet={}",
            self.base_url.trim_end_matches('/'),
            self.sheet_id,
            urlencoded(&self.sheet_name)
        )
    }
}

/// Anything that can produce a raw catalog response body
///
/// The HTTP client is the production implementation; tests substitute
/// scripted sources.
pub trait ProductSource: Send + Sync + 'static {
    /// Fetches one raw response body
    fn fetch_body(&self) -> BoxFuture<'_, Result<String, FetchError>>;
}

/// HTTP client for the sheet's query endpoint
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http_client: Client,
    config: SheetConfig,
}

impl SheetsClient {
    /// Creates a client whose requests are bounded by `config.request_timeout`
    pub fn new(config: SheetConfig) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self::with_client(http_client, config))
    }

    /// Creates a client around an existing HTTP client
    pub fn with_client(http_client: Client, config: SheetConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// The configuration this client queries
    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    async fn request_body(&self) -> Result<String, FetchError> {
        let url = self.config.endpoint_url();
        debug!(%url, "requesting sheet");

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        debug!(%status, "sheet responded");
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        Ok(response.text().await?)
    }
}

impl ProductSource for SheetsClient {
    fn fetch_body(&self) -> BoxFuture<'_, Result<String, FetchError>> {
        self.request_body().boxed()
    }
}

/// Percent-encodes a string for use in a URL query or path segment
pub fn urlencoded(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
