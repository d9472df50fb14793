//! Party Catalog Library
//!
//! A product catalog read from a Google Sheet, normalized into typed records,
//! and served from a TTL cache that a background task keeps warm.

pub mod cache;
pub mod cli;
pub mod data;
pub mod display;
pub mod refresh;
