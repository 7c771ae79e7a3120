//! Unified error type for the screener client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Filter catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("Screener execution failed (status={status:?}): {message}")]
    ExecutionFailed { status: Option<u16>, message: String },

    #[error("No active filters to submit")]
    EmptySelection,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Static, user-facing message for the failure. Details stay in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::CatalogUnavailable(_) => "Could not load the filter list",
            Error::ExecutionFailed { .. } => "Running the screener failed",
            Error::EmptySelection => "Select at least one filter",
            Error::InvalidRequest(_) => "The request was not valid",
            Error::Config(_) => "The client is misconfigured",
            Error::Http(_) | Error::Json(_) | Error::Io(_) => "Something went wrong",
        }
    }
}
