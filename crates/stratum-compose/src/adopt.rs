//! Create-or-adopt resolution of component inputs.
//!
//! A component input either describes new infrastructure or points at a
//! resource that already exists. The choice is made once, from the shape of
//! the input, and adopted components bind their accessors to the live
//! descriptor returned by the backend instead of creating nodes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use stratum_common::error::{Result, StratumError};
use stratum_common::types::ResourceKind;

use crate::backend::{ExistingResource, LookupFilter};
use crate::deferred::Deferred;
use crate::stack::ComponentScope;

/// How a component obtained its resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionMode {
    /// New nodes were submitted.
    Create,
    /// An existing resource was bound.
    Adopt,
}

/// Identifier of a pre-existing cloud resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceHandle {
    id: String,
}

impl ReferenceHandle {
    /// Creates a handle for the resource with external id `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// Returns the external id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Normalized component input: build new resources from `C`, or bind to
/// the existing resource described by `R`.
#[derive(Debug, Clone)]
pub enum Provision<C, R = ReferenceHandle> {
    /// Create new infrastructure.
    Create(C),
    /// Adopt existing infrastructure.
    Adopt(R),
}

impl<C, R> Provision<C, R> {
    /// Returns the mode this input selects.
    pub const fn mode(&self) -> ProvisionMode {
        match self {
            Self::Create(_) => ProvisionMode::Create,
            Self::Adopt(_) => ProvisionMode::Adopt,
        }
    }
}

/// An existing resource bound to a component.
#[derive(Debug, Clone)]
pub struct Adopted {
    component: String,
    resource: ExistingResource,
}

impl Adopted {
    /// Returns the external id of the bound resource.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.resource.id
    }

    /// Returns the live descriptor.
    #[must_use]
    pub const fn resource(&self) -> &ExistingResource {
        &self.resource
    }

    /// Returns attribute `name` as an already-resolved value.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the descriptor lacks the
    /// attribute or holds it in an unexpected shape.
    pub fn field<T>(&self, name: &str) -> Result<Deferred<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        self.resource.attribute(name).map(Deferred::of).ok_or_else(|| {
            StratumError::config(
                &self.component,
                name,
                format!(
                    "existing {} \"{}\" has no usable `{name}` attribute",
                    self.resource.kind, self.resource.id
                ),
                "adopt a resource that exposes this attribute or create a new one",
            )
        })
    }
}

/// Looks up the existing resource `filter` describes and binds it.
///
/// When several resources match, an exact identifier match wins; otherwise
/// the lexicographically smallest id is chosen and a warning is logged.
///
/// # Errors
///
/// Returns a configuration error naming `argument` and the identifier if
/// nothing matches, or any backend error.
pub fn resolve_existing(
    scope: &ComponentScope<'_>,
    kind: &ResourceKind,
    argument: &str,
    filter: &LookupFilter,
) -> Result<Adopted> {
    find_existing(scope, kind, filter)?.ok_or_else(|| {
        StratumError::config(
            scope.name(),
            argument,
            format!("no existing {kind} matches {}", describe(filter)),
            format!(
                "check that the resource exists in this account and region, or drop `{argument}` to create a new one"
            ),
        )
    })
}

/// Like [`resolve_existing`], but zero matches yield `None`.
///
/// # Errors
///
/// Returns any backend error.
pub fn find_existing(
    scope: &ComponentScope<'_>,
    kind: &ResourceKind,
    filter: &LookupFilter,
) -> Result<Option<Adopted>> {
    let candidates = scope.lookup(kind, filter)?;
    Ok(select(candidates, filter).map(|resource| {
        tracing::info!(component = scope.name(), kind = %kind, id = %resource.id, "adopting existing resource");
        Adopted {
            component: scope.name().to_string(),
            resource,
        }
    }))
}

fn select(mut candidates: Vec<ExistingResource>, filter: &LookupFilter) -> Option<ExistingResource> {
    if let Some(id) = &filter.identifier {
        if let Some(pos) = candidates.iter().position(|c| c.id == *id) {
            return Some(candidates.swap_remove(pos));
        }
    }
    candidates.sort_by(|a, b| a.id.cmp(&b.id));
    if candidates.len() > 1 {
        let ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
        tracing::warn!(?ids, chosen = ids[0], "several existing resources match; choosing the smallest id");
    }
    candidates.into_iter().next()
}

fn describe(filter: &LookupFilter) -> String {
    let mut parts = Vec::new();
    if let Some(id) = &filter.identifier {
        parts.push(format!("identifier \"{id}\""));
    }
    for (k, v) in &filter.tags {
        parts.push(format!("tag {k}={v}"));
    }
    if parts.is_empty() {
        "the lookup".to_string()
    } else {
        parts.join(" and ")
    }
}
