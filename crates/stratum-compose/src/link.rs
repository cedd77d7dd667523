//! Named property bags exposed to runtime consumers.
//!
//! A component that implements [`Linkable`] publishes a stable set of
//! property names. External code reads a component's resolved attributes
//! only through this bag, never through its resource nodes.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::args::{Input, resolve_inputs};
use crate::component::Component;
use crate::deferred::{OutputRef, OutputSource, Resolution};

/// Property name to value, each possibly deferred.
#[derive(Debug, Clone, Default)]
pub struct LinkProperties {
    entries: BTreeMap<String, Input>,
}

impl LinkProperties {
    /// Creates an empty bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds property `key` and returns `self`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        let _ = self.entries.insert(key.into(), value.into());
        self
    }

    /// Returns property `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Input> {
        self.entries.get(key)
    }

    /// Iterates over property names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Output fields any property reads.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<OutputRef> {
        self.entries.values().flat_map(Input::dependencies).collect()
    }

    /// Resolves every property against `source`.
    pub fn resolve(&self, source: &dyn OutputSource) -> Resolution<BTreeMap<String, Value>> {
        resolve_inputs(&self.entries, source)
    }
}

/// A component that exposes its attributes to runtime consumers.
pub trait Linkable: Component {
    /// Returns the component's property bag.
    fn link(&self) -> LinkProperties;
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use stratum_common::types::Urn;

    use super::*;
    use crate::deferred::{Deferred, OutputTable, ResolutionError};

    fn urn() -> Urn {
        Urn::new("app", "test", "test:Cache", "CacheCluster")
    }

    fn bag() -> LinkProperties {
        let host: Deferred<String> = Deferred::output(urn(), "address");
        LinkProperties::new().with("host", host).with("port", 6379_u32)
    }

    #[test]
    fn resolves_once_all_properties_are_known() {
        let bag = bag();
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["host", "port"]);
        let mut table = OutputTable::new();
        assert_eq!(bag.resolve(&table), Resolution::Pending);

        table.record_ready(urn(), BTreeMap::from([("address".to_string(), json!("cache.local"))]));
        let resolved = bag.resolve(&table).ready().expect("ready");
        assert_eq!(resolved["host"], json!("cache.local"));
        assert_eq!(resolved["port"], json!(6379));
    }

    #[test]
    fn failed_property_fails_the_bag() {
        let mut table = OutputTable::new();
        table.record_failed(urn(), ResolutionError::new(urn().as_str(), "capacity"));
        assert!(bag().resolve(&table).is_failed());
    }
}
