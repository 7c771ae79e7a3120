//! Copy-on-write selection store.
//!
//! The selection map lives behind an `Arc`. Every mutation goes through
//! `Arc::make_mut`, so a snapshot handed out earlier keeps its contents while
//! the store moves on to a new map.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use common::{FilterDefinition, ParamValue, ScreenerEvent, SelectedFilter};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::defaults::default_selection;

/// Immutable view of the selection map at one revision.
pub type SelectionSnapshot = Arc<BTreeMap<String, SelectedFilter>>;

const EVENT_CAPACITY: usize = 64;

/// Catalog plus the enabled filters and their parameter values.
#[derive(Debug)]
pub struct SelectionStore {
    catalog: Arc<Vec<FilterDefinition>>,
    state: SelectionSnapshot,
    revision: u64,
    events: broadcast::Sender<ScreenerEvent>,
}

impl Default for SelectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectionStore {
    /// Empty store with its own event channel.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self::with_events(events)
    }

    /// Empty store publishing on an existing channel.
    pub fn with_events(events: broadcast::Sender<ScreenerEvent>) -> Self {
        Self {
            catalog: Arc::new(Vec::new()),
            state: Arc::new(BTreeMap::new()),
            revision: 0,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScreenerEvent> {
        self.events.subscribe()
    }

    // ── Catalog ───────────────────────────────────────────────────────

    /// Install a freshly loaded catalog and enable every filter with its
    /// defaults. Any previous selection is replaced.
    pub fn install_catalog(&mut self, defs: Vec<FilterDefinition>) {
        let defs = dedupe(defs);
        let seeded: BTreeMap<String, SelectedFilter> = defs
            .iter()
            .map(|d| (d.id.clone(), default_selection(d)))
            .collect();

        self.catalog = Arc::new(defs);
        self.publish(ScreenerEvent::CatalogReady {
            filters: self.catalog.len(),
        });
        self.commit(seeded);
    }

    /// Swap the catalog, keeping the selection. Entries whose id disappeared
    /// become stale and drop out of `active_selections`. Surviving entries
    /// are fitted to the new parameter list: edited values are kept for
    /// names still declared, new names get their defaults, and removed names
    /// are dropped.
    pub fn refresh_catalog(&mut self, defs: Vec<FilterDefinition>) {
        self.catalog = Arc::new(dedupe(defs));

        let mut stale = 0;
        let mut next = BTreeMap::new();
        for (id, entry) in self.state.iter() {
            let fitted = match self.definition(id) {
                Some(def) => SelectedFilter {
                    id: id.clone(),
                    params: def
                        .parameters
                        .iter()
                        .map(|p| {
                            let value = entry
                                .params
                                .get(&p.name)
                                .copied()
                                .unwrap_or_else(|| p.default_value());
                            (p.name.clone(), value)
                        })
                        .collect(),
                },
                None => {
                    stale += 1;
                    entry.clone()
                }
            };
            next.insert(id.clone(), fitted);
        }
        if stale > 0 {
            debug!("{} selected filters are no longer in the catalog", stale);
        }

        self.publish(ScreenerEvent::CatalogReady {
            filters: self.catalog.len(),
        });
        self.commit(next);
    }

    pub fn catalog(&self) -> &[FilterDefinition] {
        &self.catalog
    }

    pub fn definition(&self, id: &str) -> Option<&FilterDefinition> {
        self.catalog.iter().find(|d| d.id == id)
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Enable or disable a filter.
    ///
    /// Disabling drops the entry and its edits. Enabling always reseeds from
    /// the catalog defaults; an id missing from the catalog gets empty params.
    pub fn toggle_filter(&mut self, id: &str, enabled: bool) {
        if !enabled {
            if !self.state.contains_key(id) {
                return;
            }
            let mut next = Arc::clone(&self.state);
            Arc::make_mut(&mut next).remove(id);
            self.swap(next);
            debug!("Disabled filter {}", id);
            return;
        }

        let entry = match self.definition(id) {
            Some(def) => default_selection(def),
            None => {
                warn!("Enabling filter {} which is not in the catalog", id);
                SelectedFilter::empty(id)
            }
        };

        let mut next = Arc::clone(&self.state);
        Arc::make_mut(&mut next).insert(id.to_string(), entry);
        self.swap(next);
        debug!("Enabled filter {} with defaults", id);
    }

    /// Set one parameter from raw user input, coerced by its declared type.
    ///
    /// Input that does not parse is stored as `NotANumber`. An edit on a
    /// filter with no entry creates an empty one first.
    ///
    /// The value is only stored when `name` is declared on the filter's
    /// catalog definition, so params keys always name declared parameters.
    /// For an id the catalog does not know, or an undeclared name, the
    /// entry is still created but the edit itself is dropped with a warning.
    pub fn set_parameter(&mut self, id: &str, name: &str, raw: &str) {
        let declared = self
            .definition(id)
            .and_then(|d| d.parameter(name))
            .map(|p| p.param_type);

        let mut next = Arc::clone(&self.state);
        let map = Arc::make_mut(&mut next);
        let entry = map
            .entry(id.to_string())
            .or_insert_with(|| SelectedFilter::empty(id));

        match declared {
            Some(param_type) => {
                let value = ParamValue::parse(param_type, raw);
                if value == ParamValue::NotANumber {
                    debug!("{}.{}: {:?} is not a number, passing it through", id, name, raw);
                }
                entry.params.insert(name.to_string(), value);
            }
            None => warn!("Ignoring edit of undeclared parameter {}.{}", id, name),
        }

        self.swap(next);
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Enabled filters that still exist in the catalog, in catalog order.
    pub fn active_selections(&self) -> Vec<SelectedFilter> {
        self.catalog
            .iter()
            .filter_map(|d| self.state.get(&d.id).cloned())
            .collect()
    }

    pub fn has_active(&self) -> bool {
        self.catalog.iter().any(|d| self.state.contains_key(&d.id))
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.state.contains_key(id)
    }

    pub fn selection(&self, id: &str) -> Option<&SelectedFilter> {
        self.state.get(id)
    }

    /// The current map, including stale entries.
    pub fn snapshot(&self) -> SelectionSnapshot {
        Arc::clone(&self.state)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    // ── Internals ─────────────────────────────────────────────────────

    fn commit(&mut self, next: BTreeMap<String, SelectedFilter>) {
        self.swap(Arc::new(next));
    }

    fn swap(&mut self, next: SelectionSnapshot) {
        self.state = next;
        self.revision += 1;
        self.publish(ScreenerEvent::SelectionChanged {
            revision: self.revision,
        });
    }

    fn publish(&self, event: ScreenerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Keep the first definition for each id.
fn dedupe(defs: Vec<FilterDefinition>) -> Vec<FilterDefinition> {
    let mut seen = HashSet::new();
    defs.into_iter()
        .filter(|d| {
            let fresh = seen.insert(d.id.clone());
            if !fresh {
                warn!("Duplicate filter id {} in catalog, keeping the first", d.id);
            }
            fresh
        })
        .collect()
}
