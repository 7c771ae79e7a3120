//! HTTP client for the screener backend.
//!
//! Covers the filter catalog, screener execution, and the symbol listing.

pub mod backend;
pub mod rest;

pub use backend::ScreenerBackend;
pub use rest::ScreenerRestClient;
