//! Default materialization of catalog entries.

use std::collections::BTreeMap;

use common::{FilterDefinition, ParamValue, SelectedFilter};

/// Params seeded from a definition: each declared default coerced to the
/// parameter's type, `Unset` where no default exists.
pub fn default_params(def: &FilterDefinition) -> BTreeMap<String, ParamValue> {
    def.parameters
        .iter()
        .map(|p| (p.name.clone(), p.default_value()))
        .collect()
}

/// A freshly enabled selection for `def`.
pub fn default_selection(def: &FilterDefinition) -> SelectedFilter {
    SelectedFilter {
        id: def.id.clone(),
        params: default_params(def),
    }
}
