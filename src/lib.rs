//! Client-side state engine for a stock screener.
//!
//! Loads the filter catalog, tracks which filters are enabled and with what
//! parameters, submits runs, and renders the results as text.

pub mod config;
pub mod render;
pub mod session;

pub use session::{ScreenerSession, SessionView};
