//! Events broadcast to renderers after state changes.

/// Notification emitted by the selection store and the session.
///
/// Events carry only counts and revisions; subscribers read the current
/// state from the session when they handle one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenerEvent {
    /// A catalog was installed (one-shot at startup, again on refresh).
    CatalogReady { filters: usize },
    /// The catalog fetch failed; selection state was left empty.
    CatalogUnavailable,
    /// The selection map was replaced.
    SelectionChanged { revision: u64 },
    /// A run was submitted; results are hidden until it settles.
    RunStarted,
    /// A run completed and its results are now displayed.
    ResultsReady { count: usize },
    /// A run failed; previous results are untouched.
    RunFailed,
}
