//! Provisioning backend abstraction.
//!
//! The backend receives fully described resource nodes once a component
//! has been composed, and answers lookups of existing cloud resources for
//! the adopt path. Materializing nodes is entirely its concern.

pub mod memory;

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_common::error::Result;
use stratum_common::types::{ComponentPath, ResourceKind, Urn};

use crate::args::{ResourceArgs, ResourceOptions};
use crate::deferred::Deferred;

/// A resource node as submitted to the backend.
#[derive(Debug, Clone)]
pub struct ResourceNode {
    /// Globally unique identifier.
    pub urn: Urn,
    /// Backend resource type.
    pub kind: ResourceKind,
    /// Logical name within the owning component.
    pub name: String,
    /// Constructor arguments, possibly deferred.
    pub args: ResourceArgs,
    /// Lifecycle options.
    pub options: ResourceOptions,
    /// Component owning this node.
    pub owner: ComponentPath,
    /// Every node this one must follow: producers of its deferred
    /// arguments plus explicit ordering edges.
    pub depends_on: BTreeSet<Urn>,
}

/// Handle to a node whose fields are exposed as deferred values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    urn: Urn,
    kind: ResourceKind,
}

impl ResourceHandle {
    /// Creates a handle for the node `urn`.
    #[must_use]
    pub const fn new(urn: Urn, kind: ResourceKind) -> Self {
        Self { urn, kind }
    }

    /// Returns the node URN.
    #[must_use]
    pub const fn urn(&self) -> &Urn {
        &self.urn
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    /// Returns the named output field of the node.
    pub fn output<T>(&self, field: &str) -> Deferred<T>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        Deferred::output(self.urn.clone(), field)
    }
}

/// Criteria for finding existing resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFilter {
    /// Cloud-side identifier that must match exactly.
    #[serde(default)]
    pub identifier: Option<String>,
    /// Tags that must all be present with these values.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl LookupFilter {
    /// Matches resources with identifier `id`.
    #[must_use]
    pub fn identifier(id: impl Into<String>) -> Self {
        Self {
            identifier: Some(id.into()),
            tags: BTreeMap::new(),
        }
    }

    /// Matches resources carrying tag `key` with `value`.
    #[must_use]
    pub fn tag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            identifier: None,
            tags: BTreeMap::from([(key.into(), value.into())]),
        }
    }

    /// Returns whether `resource` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, resource: &ExistingResource) -> bool {
        self.identifier
            .as_ref()
            .is_none_or(|id| resource.id == *id)
            && self
                .tags
                .iter()
                .all(|(k, v)| resource.tags.get(k) == Some(v))
    }
}

/// Live descriptor of a resource that already exists in the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExistingResource {
    /// Cloud-side identifier.
    pub id: String,
    /// Backend type token.
    pub kind: String,
    /// Current attribute values.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Resource tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ExistingResource {
    /// Returns attribute `name` converted to `T`, if present and well formed.
    #[must_use]
    pub fn attribute<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attributes
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// The provisioning engine that materializes resource nodes.
///
/// Implementors guarantee that every submitted node is eventually either
/// materialized or reported as failed.
pub trait ProvisioningBackend: Send + Sync {
    /// Accepts a node for materialization.
    ///
    /// Every node in `node.depends_on` has been submitted before.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the node.
    fn submit(&self, node: ResourceNode) -> Result<ResourceHandle>;

    /// Retracts a node accepted by [`submit`](Self::submit) whose
    /// component could not be completed.
    ///
    /// Called in reverse submission order, so dependents are retracted
    /// before the nodes they read.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or can no longer be
    /// retracted.
    fn withdraw(&self, urn: &Urn) -> Result<()>;

    /// Finds existing resources of `kind` matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    fn lookup_existing(
        &self,
        kind: &ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ExistingResource>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn instance(id: &str) -> ExistingResource {
        ExistingResource {
            id: id.into(),
            kind: "aws:rds/instance:Instance".into(),
            attributes: BTreeMap::from([("port".to_string(), json!(5432))]),
            tags: BTreeMap::from([("team".to_string(), "data".to_string())]),
        }
    }

    #[test]
    fn filter_matches_identifier_and_tags() {
        let db = instance("db-1");
        assert!(LookupFilter::identifier("db-1").matches(&db));
        assert!(!LookupFilter::identifier("db-2").matches(&db));
        assert!(LookupFilter::tag("team", "data").matches(&db));
        assert!(!LookupFilter::tag("team", "web").matches(&db));
        assert!(LookupFilter::default().matches(&db));
    }

    #[test]
    fn attribute_converts_type() {
        let db = instance("db-1");
        assert_eq!(db.attribute::<u16>("port"), Some(5432));
        assert_eq!(db.attribute::<String>("port"), None);
        assert_eq!(db.attribute::<u16>("missing"), None);
    }
}
