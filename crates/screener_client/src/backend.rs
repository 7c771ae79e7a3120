use async_trait::async_trait;
use common::{Error, FilterDefinition, ScreenerResult, SelectedFilter};

/// The two backend calls a screener session depends on.
#[async_trait]
pub trait ScreenerBackend: Send + Sync {
    /// Fetch every filter definition. Fails with `Error::CatalogUnavailable`.
    async fn fetch_catalog(&self) -> Result<Vec<FilterDefinition>, Error>;

    /// Execute a screen. Fails with `Error::ExecutionFailed`.
    async fn run_screener(
        &self,
        filters: Vec<SelectedFilter>,
    ) -> Result<Vec<ScreenerResult>, Error>;
}
