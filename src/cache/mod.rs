//! Cache module for the product catalog
//!
//! This module provides an in-memory catalog cache with a configurable TTL
//! (time-to-live). It supports graceful degradation by continuing to serve the
//! last good snapshot when the upstream sheet is unavailable, and collapses
//! concurrent fetches into a single request.

mod catalog;

pub use catalog::{
    CacheState, CatalogCache, CatalogConfig, RefreshOutcome, Refreshed, DEFAULT_TTL,
};
