//! Shared types, config, and error definitions for the screener client.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::ScreenerConfig;
pub use error::Error;
pub use events::ScreenerEvent;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
