//! Screener session: catalog load, selection edits, and runs.
//!
//! A session is a cheap, cloneable handle. State lives behind a mutex that
//! is only held for synchronous updates, never across a backend call.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{
    Error, FilterDefinition, ScreenerEvent, ScreenerResult, ScreenerRunRequest, SelectedFilter,
};
use screener_client::ScreenerBackend;
use selection::{SelectionSnapshot, SelectionStore};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct SessionState {
    store: SelectionStore,
    results: Arc<Vec<ScreenerResult>>,
    loading: bool,
    error: Option<&'static str>,
}

/// Point-in-time view of a session for rendering.
#[derive(Debug, Clone)]
pub struct SessionView {
    pub catalog: Vec<FilterDefinition>,
    pub selection: SelectionSnapshot,
    /// Results to display; empty while a run is in flight.
    pub results: Arc<Vec<ScreenerResult>>,
    pub loading: bool,
    pub error: Option<&'static str>,
}

impl SessionView {
    pub fn is_enabled(&self, id: &str) -> bool {
        self.selection.contains_key(id)
    }
}

#[derive(Clone)]
pub struct ScreenerSession {
    backend: Arc<dyn ScreenerBackend>,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<ScreenerEvent>,
}

impl ScreenerSession {
    pub fn new(backend: Arc<dyn ScreenerBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = SessionState {
            store: SelectionStore::with_events(events.clone()),
            ..SessionState::default()
        };
        Self {
            backend,
            state: Arc::new(Mutex::new(state)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScreenerEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // Updates are single assignments, so a poisoned guard still holds
        // consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ScreenerEvent) {
        let _ = self.events.send(event);
    }

    // ── Catalog ───────────────────────────────────────────────────────

    /// Fetch the catalog and enable every filter with its defaults.
    ///
    /// On failure the selection stays as it was (empty at startup) and the
    /// error message is recorded.
    pub async fn load_catalog(&self) -> Result<usize, Error> {
        match self.backend.fetch_catalog().await {
            Ok(defs) => {
                let count = defs.len();
                let mut state = self.lock();
                state.store.install_catalog(defs);
                state.error = None;
                info!("Loaded {} filters", count);
                Ok(count)
            }
            Err(e) => {
                error!("Catalog load failed: {}", e);
                self.lock().error = Some(e.user_message());
                self.publish(ScreenerEvent::CatalogUnavailable);
                Err(e)
            }
        }
    }

    /// Fetch the catalog again, keeping the current selection. Ids that
    /// vanished stop counting as active.
    pub async fn refresh_catalog(&self) -> Result<usize, Error> {
        match self.backend.fetch_catalog().await {
            Ok(defs) => {
                let count = defs.len();
                self.lock().store.refresh_catalog(defs);
                debug!("Refreshed catalog: {} filters", count);
                Ok(count)
            }
            Err(e) => {
                warn!("Catalog refresh failed: {}", e);
                self.lock().error = Some(e.user_message());
                self.publish(ScreenerEvent::CatalogUnavailable);
                Err(e)
            }
        }
    }

    pub fn catalog(&self) -> Vec<FilterDefinition> {
        self.lock().store.catalog().to_vec()
    }

    // ── Selection ─────────────────────────────────────────────────────

    pub fn toggle_filter(&self, id: &str, enabled: bool) {
        self.lock().store.toggle_filter(id, enabled);
    }

    pub fn set_parameter(&self, id: &str, name: &str, raw: &str) {
        self.lock().store.set_parameter(id, name, raw);
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.lock().store.is_enabled(id)
    }

    pub fn selection(&self, id: &str) -> Option<SelectedFilter> {
        self.lock().store.selection(id).cloned()
    }

    pub fn active_selections(&self) -> Vec<SelectedFilter> {
        self.lock().store.active_selections()
    }

    /// The body a run would submit right now.
    pub fn run_request(&self) -> ScreenerRunRequest {
        ScreenerRunRequest {
            filters: self.active_selections(),
        }
    }

    // ── Execution ─────────────────────────────────────────────────────

    /// Whether the submit action should be offered: something is active and
    /// no run is in flight.
    pub fn can_run(&self) -> bool {
        let state = self.lock();
        !state.loading && state.store.has_active()
    }

    /// Submit the active selection and display the response.
    ///
    /// An empty selection returns `Error::EmptySelection` without touching
    /// the backend. Overlapping runs are not tracked: whichever response
    /// lands last is displayed, so callers gate on `can_run`.
    pub async fn run(&self) -> Result<usize, Error> {
        let filters = {
            let mut state = self.lock();
            let filters = state.store.active_selections();
            if filters.is_empty() {
                debug!("Run requested with no active filters");
                return Err(Error::EmptySelection);
            }
            state.loading = true;
            state.error = None;
            filters
        };
        self.publish(ScreenerEvent::RunStarted);

        let outcome = self.backend.run_screener(filters).await;

        let mut state = self.lock();
        state.loading = false;
        match outcome {
            Ok(results) => {
                let count = results.len();
                state.results = Arc::new(results);
                drop(state);
                info!("Screener returned {} symbols", count);
                self.publish(ScreenerEvent::ResultsReady { count });
                Ok(count)
            }
            Err(e) => {
                state.error = Some(e.user_message());
                drop(state);
                error!("Screener run failed: {}", e);
                self.publish(ScreenerEvent::RunFailed);
                Err(e)
            }
        }
    }

    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error_message(&self) -> Option<&'static str> {
        self.lock().error
    }

    /// Last successful result set, including while a new run is in flight.
    pub fn results(&self) -> Arc<Vec<ScreenerResult>> {
        Arc::clone(&self.lock().results)
    }

    pub fn view(&self) -> SessionView {
        let state = self.lock();
        let results = if state.loading {
            Arc::new(Vec::new())
        } else {
            Arc::clone(&state.results)
        };
        SessionView {
            catalog: state.store.catalog().to_vec(),
            selection: state.store.snapshot(),
            results,
            loading: state.loading,
            error: state.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use common::{FilterParameter, ParamType, ParamValue};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn pe_low() -> FilterDefinition {
        FilterDefinition {
            id: "pe_low".into(),
            name: "Low P/E".into(),
            description: "P/E under a ceiling".into(),
            parameters: vec![FilterParameter {
                name: "max_pe".into(),
                param_type: ParamType::Float,
                description: "Max P/E".into(),
                default: Some(10.0),
            }],
        }
    }

    fn min_volume() -> FilterDefinition {
        FilterDefinition {
            id: "min_volume".into(),
            name: "Minimum volume".into(),
            description: String::new(),
            parameters: vec![FilterParameter {
                name: "min_volume".into(),
                param_type: ParamType::Int,
                description: "Shares".into(),
                default: Some(1_000_000.0),
            }],
        }
    }

    fn row(symbol: &str) -> ScreenerResult {
        ScreenerResult {
            symbol: symbol.into(),
            company_name: format!("{symbol} Co"),
            last_price: 1000.0,
            volume: 2_000_000.0,
            trade_value: 2_000_000_000.0,
            percent_change: 1.5,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            reason: "matched".into(),
            score: None,
        }
    }

    /// Scripted backend recording every run body.
    #[derive(Default)]
    struct FakeBackend {
        catalog: Mutex<Option<Vec<FilterDefinition>>>,
        runs: Mutex<VecDeque<Result<Vec<ScreenerResult>, u16>>>,
        bodies: Mutex<Vec<Vec<SelectedFilter>>>,
        run_calls: AtomicUsize,
    }

    impl FakeBackend {
        fn with_catalog(defs: Vec<FilterDefinition>) -> Self {
            let fake = Self::default();
            *fake.catalog.lock().unwrap() = Some(defs);
            fake
        }

        fn push_run(&self, outcome: Result<Vec<ScreenerResult>, u16>) {
            self.runs.lock().unwrap().push_back(outcome);
        }

        fn set_catalog(&self, defs: Vec<FilterDefinition>) {
            *self.catalog.lock().unwrap() = Some(defs);
        }
    }

    #[async_trait]
    impl ScreenerBackend for FakeBackend {
        async fn fetch_catalog(&self) -> Result<Vec<FilterDefinition>, Error> {
            self.catalog
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::CatalogUnavailable("connection refused".into()))
        }

        async fn run_screener(
            &self,
            filters: Vec<SelectedFilter>,
        ) -> Result<Vec<ScreenerResult>, Error> {
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            self.bodies.lock().unwrap().push(filters);
            match self.runs.lock().unwrap().pop_front() {
                Some(Ok(results)) => Ok(results),
                Some(Err(status)) => Err(Error::ExecutionFailed {
                    status: Some(status),
                    message: String::new(),
                }),
                None => Ok(vec![]),
            }
        }
    }

    async fn loaded(defs: Vec<FilterDefinition>) -> (ScreenerSession, Arc<FakeBackend>) {
        let fake = Arc::new(FakeBackend::with_catalog(defs));
        let session = ScreenerSession::new(fake.clone());
        session.load_catalog().await.unwrap();
        (session, fake)
    }

    #[tokio::test]
    async fn scenario_a_load_enables_defaults() {
        let (session, _) = loaded(vec![pe_low()]).await;
        let active = session.active_selections();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "pe_low");
        assert_eq!(active[0].params["max_pe"], ParamValue::Float(10.0));
        assert_eq!(
            serde_json::to_value(&active).unwrap(),
            json!([{"id": "pe_low", "params": {"max_pe": 10}}])
        );
    }

    #[tokio::test]
    async fn scenario_b_disable_empties_active() {
        let (session, _) = loaded(vec![pe_low()]).await;
        session.toggle_filter("pe_low", false);
        assert!(session.active_selections().is_empty());
        assert!(!session.can_run());
    }

    #[tokio::test]
    async fn scenario_c_edit_then_run_submits_body() {
        let (session, fake) = loaded(vec![pe_low()]).await;
        fake.push_run(Ok(vec![row("FOLD")]));

        session.set_parameter("pe_low", "max_pe", "15");
        let count = session.run().await.unwrap();

        assert_eq!(count, 1);
        let bodies = fake.bodies.lock().unwrap();
        let sent = ScreenerRunRequest {
            filters: bodies[0].clone(),
        };
        assert_eq!(
            serde_json::to_string(&sent).unwrap(),
            r#"{"filters":[{"id":"pe_low","params":{"max_pe":15}}]}"#
        );
        assert_eq!(session.results()[0].symbol, "FOLD");
    }

    #[tokio::test]
    async fn scenario_d_failure_keeps_previous_results() {
        let (session, fake) = loaded(vec![pe_low()]).await;
        fake.push_run(Ok(vec![row("FOLD"), row("SHASTA")]));
        fake.push_run(Err(500));

        session.run().await.unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, Error::ExecutionFailed { status: Some(500), .. }));
        assert!(!session.is_loading());
        assert_eq!(session.error_message(), Some("Running the screener failed"));
        let results = session.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].symbol, "SHASTA");
        assert_eq!(session.view().results.len(), 2);
    }

    #[tokio::test]
    async fn empty_selection_never_reaches_backend() {
        let (session, fake) = loaded(vec![pe_low()]).await;
        session.toggle_filter("pe_low", false);

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, Error::EmptySelection));
        assert_eq!(fake.run_calls.load(Ordering::SeqCst), 0);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn stale_only_selection_never_reaches_backend() {
        let (session, fake) = loaded(vec![pe_low()]).await;
        fake.set_catalog(vec![min_volume()]);
        session.refresh_catalog().await.unwrap();

        // pe_low is still in the map but no longer in the catalog.
        assert!(session.is_enabled("pe_low"));
        assert!(session.active_selections().is_empty());
        assert!(matches!(session.run().await, Err(Error::EmptySelection)));
        assert_eq!(fake.run_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn catalog_failure_leaves_selection_empty() {
        let fake = Arc::new(FakeBackend::default());
        let session = ScreenerSession::new(fake);
        let mut events = session.subscribe();

        let err = session.load_catalog().await.unwrap_err();
        assert!(matches!(err, Error::CatalogUnavailable(_)));
        assert!(session.catalog().is_empty());
        assert!(session.active_selections().is_empty());
        assert_eq!(session.error_message(), Some("Could not load the filter list"));
        assert_eq!(events.recv().await.unwrap(), ScreenerEvent::CatalogUnavailable);
    }

    #[tokio::test]
    async fn run_emits_lifecycle_events() {
        let (session, fake) = loaded(vec![pe_low(), min_volume()]).await;
        fake.push_run(Ok(vec![row("FOLD")]));
        fake.push_run(Err(502));
        let mut events = session.subscribe();

        session.run().await.unwrap();
        let _ = session.run().await;

        assert_eq!(events.recv().await.unwrap(), ScreenerEvent::RunStarted);
        assert_eq!(
            events.recv().await.unwrap(),
            ScreenerEvent::ResultsReady { count: 1 }
        );
        assert_eq!(events.recv().await.unwrap(), ScreenerEvent::RunStarted);
        assert_eq!(events.recv().await.unwrap(), ScreenerEvent::RunFailed);
    }

    #[tokio::test]
    async fn selection_edits_emit_selection_changed() {
        let (session, _) = loaded(vec![pe_low()]).await;
        let mut events = session.subscribe();

        session.set_parameter("pe_low", "max_pe", "12");
        assert!(matches!(
            events.recv().await.unwrap(),
            ScreenerEvent::SelectionChanged { .. }
        ));
    }

    #[tokio::test]
    async fn new_run_clears_previous_error() {
        let (session, fake) = loaded(vec![pe_low()]).await;
        fake.push_run(Err(500));
        fake.push_run(Ok(vec![]));

        let _ = session.run().await;
        assert!(session.error_message().is_some());
        session.run().await.unwrap();
        assert!(session.error_message().is_none());
        assert!(session.results().is_empty());
    }

    #[tokio::test]
    async fn end_to_end_over_http() {
        use common::ScreenerConfig;
        use screener_client::ScreenerRestClient;
        use wiremock::matchers::{body_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/filters"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "pe_low", "name": "Low P/E", "description": "",
                 "parameters": [{"name": "max_pe", "type": "float", "description": "", "default": 10}]}
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/screener/run"))
            .and(body_json(json!({"filters": [{"id": "pe_low", "params": {"max_pe": 15}}]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "symbol": "FOLD",
                "company_name": "Foolad",
                "last_price": 5230.0,
                "volume": 1200000.0,
                "trade_value": 6276000000.0,
                "percent_change": 2.4,
                "last_updated": "2024-03-01T09:30:00",
                "reason": "cheap",
                "score": null
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = ScreenerRestClient::new(&ScreenerConfig::with_base_url(server.uri())).unwrap();
        let session = ScreenerSession::new(Arc::new(client));
        assert_eq!(session.load_catalog().await.unwrap(), 1);
        session.set_parameter("pe_low", "max_pe", "15");
        assert_eq!(session.run().await.unwrap(), 1);

        let view = session.view();
        assert_eq!(view.results[0].reason, "cheap");
        assert!(view.error.is_none());
    }

    /// Backend whose runs finish only when the test releases them.
    struct GatedBackend {
        gates: Mutex<VecDeque<(oneshot::Receiver<()>, Vec<ScreenerResult>)>>,
        run_calls: AtomicUsize,
    }

    #[async_trait]
    impl ScreenerBackend for GatedBackend {
        async fn fetch_catalog(&self) -> Result<Vec<FilterDefinition>, Error> {
            Ok(vec![pe_low()])
        }

        async fn run_screener(
            &self,
            _filters: Vec<SelectedFilter>,
        ) -> Result<Vec<ScreenerResult>, Error> {
            let (gate, results) = self
                .gates
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected run");
            self.run_calls.fetch_add(1, Ordering::SeqCst);
            let _ = gate.await;
            Ok(results)
        }
    }

    async fn wait_for_calls(backend: &GatedBackend, n: usize) {
        while backend.run_calls.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn overlapping_runs_last_response_wins() {
        let (release_first, first_gate) = oneshot::channel();
        let (release_second, second_gate) = oneshot::channel();
        let backend = Arc::new(GatedBackend {
            gates: Mutex::new(VecDeque::from(vec![
                (first_gate, vec![row("SLOW")]),
                (second_gate, vec![row("FAST"), row("FASTER")]),
            ])),
            run_calls: AtomicUsize::new(0),
        });
        let session = ScreenerSession::new(backend.clone());
        session.load_catalog().await.unwrap();

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });
        wait_for_calls(&backend, 1).await;
        assert!(session.is_loading());
        assert!(!session.can_run());
        assert!(session.view().results.is_empty());

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.run().await }
        });
        wait_for_calls(&backend, 2).await;

        release_second.send(()).unwrap();
        assert_eq!(second.await.unwrap().unwrap(), 2);
        assert_eq!(session.results()[0].symbol, "FAST");

        // The slower, older response lands last and replaces the newer one.
        release_first.send(()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), 1);
        assert_eq!(session.results()[0].symbol, "SLOW");
        assert!(!session.is_loading());
    }
}
