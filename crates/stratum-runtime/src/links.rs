//! Link bags looked up by component name.

use std::collections::BTreeMap;

use serde_json::Value;
use stratum_common::error::{Result, StratumError};
use stratum_compose::deferred::{OutputSource, Resolution};
use stratum_compose::link::{LinkProperties, Linkable};

/// Registry of the link bags published by linkable components.
///
/// Components are keyed by their path (`Parent/Child`), which equals the
/// plain name for root-level components.
#[derive(Debug, Clone, Default)]
pub struct LinkRegistry {
    bags: BTreeMap<String, LinkProperties>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the bag of `component`.
    pub fn register<L: Linkable + ?Sized>(&mut self, component: &L) {
        let name = component.path().to_string();
        tracing::debug!(component = %name, "link bag registered");
        let _ = self.bags.insert(name, component.link());
    }

    /// Names of every registered component.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bags.keys().map(String::as_str)
    }

    /// Returns the bag of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&LinkProperties> {
        self.bags.get(name)
    }

    /// Resolves the bag of `name` against `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if no component named `name` is linkable.
    pub fn resolve(
        &self,
        name: &str,
        source: &dyn OutputSource,
    ) -> Result<Resolution<BTreeMap<String, Value>>> {
        self.bags
            .get(name)
            .map(|bag| bag.resolve(source))
            .ok_or_else(|| StratumError::NotFound {
                kind: "linkable component",
                id: name.to_string(),
            })
    }

    /// Resolves every bag independently.
    pub fn resolve_all(
        &self,
        source: &dyn OutputSource,
    ) -> BTreeMap<String, Resolution<BTreeMap<String, Value>>> {
        self.bags
            .iter()
            .map(|(name, bag)| (name.clone(), bag.resolve(source)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stratum_common::config::ProjectContext;
    use stratum_compose::backend::memory::MemoryBackend;
    use stratum_compose::components::{NetworkConfig, Postgres, PostgresArgs};
    use stratum_compose::deferred::OutputTable;
    use stratum_compose::stack::Stack;

    use super::*;

    #[test]
    fn unknown_component_is_not_found() {
        let registry = LinkRegistry::new();
        let err = registry.resolve("Nope", &OutputTable::new()).unwrap_err();
        assert!(matches!(err, StratumError::NotFound { .. }));
    }

    #[test]
    fn registered_bag_is_pending_before_apply() {
        let mut stack = Stack::new(ProjectContext::new("shop", "dev"), Arc::new(MemoryBackend::new()));
        let db = Postgres::new(
            &mut stack,
            "Db",
            PostgresArgs::new(NetworkConfig::from_ids(["subnet-1"])),
        )
        .expect("create");
        let mut registry = LinkRegistry::new();
        registry.register(&db);

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Db"]);
        assert_eq!(
            registry.resolve("Db", &OutputTable::new()).expect("known"),
            Resolution::Pending
        );
    }
}
