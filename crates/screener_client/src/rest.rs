//! REST client for the screener backend.
//!
//! Every request is `api_base_url + path`, so a proxy base works the same
//! as a direct backend address.

use std::time::Duration;

use async_trait::async_trait;
use common::{
    Error, FilterDefinition, ScreenerConfig, ScreenerResult, ScreenerRunRequest, SelectedFilter,
    SymbolInfo, SymbolQuery,
};
use tracing::{debug, warn};

use crate::backend::ScreenerBackend;

const FILTERS_PATH: &str = "/api/filters";
const RUN_PATH: &str = "/api/screener/run";
const SYMBOLS_PATH: &str = "/api/symbols";
const MAX_PAGE_SIZE: u32 = 100;
/// Upper bound on error-body bytes copied into messages.
const ERROR_BODY_LIMIT: usize = 500;

/// Async REST client for the screener API.
#[derive(Debug, Clone)]
pub struct ScreenerRestClient {
    client: reqwest::Client,
    base_url: String,
}

impl ScreenerRestClient {
    pub fn new(config: &ScreenerConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL helper.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // ── Catalog ───────────────────────────────────────────────────────

    /// GET /api/filters. No retries.
    pub async fn get_filters(&self) -> Result<Vec<FilterDefinition>, Error> {
        let url = self.url(FILTERS_PATH);
        debug!("Fetching filter catalog: {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("HTTP error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::CatalogUnavailable(format!(
                "backend returned {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }

        let defs: Vec<FilterDefinition> = resp
            .json()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("JSON parse error: {e}")))?;

        debug!("Got {} filter definitions", defs.len());
        Ok(defs)
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// POST /api/screener/run with the given selections.
    ///
    /// An empty selection is rejected before anything is sent.
    pub async fn run(&self, filters: Vec<SelectedFilter>) -> Result<Vec<ScreenerResult>, Error> {
        if filters.is_empty() {
            return Err(Error::EmptySelection);
        }

        let body = ScreenerRunRequest { filters };
        let url = self.url(RUN_PATH);
        debug!("Submitting screener run with {} filters", body.filters.len());

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::ExecutionFailed {
                status: None,
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!("Screener run returned {}", status.as_u16());
            return Err(Error::ExecutionFailed {
                status: Some(status.as_u16()),
                message: truncate(&text).to_string(),
            });
        }

        let results: Vec<ScreenerResult> =
            resp.json().await.map_err(|e| Error::ExecutionFailed {
                status: Some(status.as_u16()),
                message: format!("JSON parse error: {e}"),
            })?;

        debug!("Screener matched {} symbols", results.len());
        Ok(results)
    }

    // ── Symbols ───────────────────────────────────────────────────────

    /// GET /api/symbols with search and paging.
    pub async fn list_symbols(&self, query: &SymbolQuery) -> Result<Vec<SymbolInfo>, Error> {
        if query.page == 0 {
            return Err(Error::InvalidRequest("page must be >= 1".into()));
        }
        if query.page_size == 0 || query.page_size > MAX_PAGE_SIZE {
            return Err(Error::InvalidRequest(format!(
                "page_size must be in 1..={MAX_PAGE_SIZE}"
            )));
        }

        let resp = self
            .client
            .get(self.url(SYMBOLS_PATH))
            .query(&[
                ("search", query.search.clone()),
                ("page", query.page.to_string()),
                ("page_size", query.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!(
                "symbols returned {}: {}",
                status.as_u16(),
                truncate(&body)
            )));
        }

        resp.json().await.map_err(|e| Error::Http(e.to_string()))
    }
}

#[async_trait]
impl ScreenerBackend for ScreenerRestClient {
    async fn fetch_catalog(&self) -> Result<Vec<FilterDefinition>, Error> {
        self.get_filters().await
    }

    async fn run_screener(
        &self,
        filters: Vec<SelectedFilter>,
    ) -> Result<Vec<ScreenerResult>, Error> {
        self.run(filters).await
    }
}

fn truncate(body: &str) -> &str {
    if body.len() <= ERROR_BODY_LIMIT {
        return body;
    }
    let mut end = ERROR_BODY_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
