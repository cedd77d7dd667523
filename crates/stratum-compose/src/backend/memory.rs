//! In-memory backend that records submissions.
//!
//! Used by plans, tests, and the runtime's simulated engine. Existing
//! resources for the adopt path are seeded up front.

use std::sync::{Mutex, PoisonError};

use stratum_common::error::{Result, StratumError};
use stratum_common::types::{ResourceKind, Urn};

use super::{ExistingResource, LookupFilter, ProvisioningBackend, ResourceHandle, ResourceNode};

/// Backend that keeps submitted nodes in submission order.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    submitted: Mutex<Vec<ResourceNode>>,
    existing: Mutex<Vec<ExistingResource>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already knows `resources`.
    #[must_use]
    pub fn with_existing(resources: Vec<ExistingResource>) -> Self {
        Self {
            submitted: Mutex::default(),
            existing: Mutex::new(resources),
        }
    }

    /// Adds an existing resource visible to lookups.
    pub fn seed(&self, resource: ExistingResource) {
        self.existing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(resource);
    }

    /// Returns every submitted node in submission order.
    #[must_use]
    pub fn submitted(&self) -> Vec<ResourceNode> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the URNs of submitted nodes in submission order.
    #[must_use]
    pub fn submitted_urns(&self) -> Vec<Urn> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|n| n.urn.clone())
            .collect()
    }

    /// Returns submitted nodes of `kind` (compared by transform key).
    #[must_use]
    pub fn submitted_of(&self, kind: &ResourceKind) -> Vec<ResourceNode> {
        self.submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|n| n.kind.key() == kind.key())
            .cloned()
            .collect()
    }
}

impl ProvisioningBackend for MemoryBackend {
    fn submit(&self, node: ResourceNode) -> Result<ResourceHandle> {
        let mut submitted = self
            .submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if submitted.iter().any(|n| n.urn == node.urn) {
            return Err(StratumError::Backend {
                message: format!("node {} was already submitted", node.urn),
            });
        }
        if let Some(missing) = node
            .depends_on
            .iter()
            .find(|dep| !submitted.iter().any(|n| n.urn == **dep))
        {
            return Err(StratumError::Backend {
                message: format!("node {} depends on unknown node {missing}", node.urn),
            });
        }
        tracing::info!(urn = %node.urn, kind = %node.kind, "node submitted");
        let handle = ResourceHandle::new(node.urn.clone(), node.kind);
        submitted.push(node);
        Ok(handle)
    }

    fn withdraw(&self, urn: &Urn) -> Result<()> {
        let mut submitted = self
            .submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let pos = submitted
            .iter()
            .position(|n| n.urn == *urn)
            .ok_or_else(|| StratumError::NotFound {
                kind: "submitted node",
                id: urn.to_string(),
            })?;
        if let Some(dependent) = submitted.iter().find(|n| n.depends_on.contains(urn)) {
            return Err(StratumError::Backend {
                message: format!("node {urn} is still read by {}", dependent.urn),
            });
        }
        let _ = submitted.remove(pos);
        tracing::info!(urn = %urn, "node withdrawn");
        Ok(())
    }

    fn lookup_existing(
        &self,
        kind: &ResourceKind,
        filter: &LookupFilter,
    ) -> Result<Vec<ExistingResource>> {
        let existing = self.existing.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(existing
            .iter()
            .filter(|r| r.kind == kind.token() && filter.matches(r))
            .cloned()
            .collect())
    }
}
