//! Filter selection state.
//!
//! Holds the loaded catalog and the enabled filters with their parameter
//! values, and derives the payload for a screener run.

pub mod defaults;
pub mod store;

pub use defaults::{default_params, default_selection};
pub use store::{SelectionSnapshot, SelectionStore};
