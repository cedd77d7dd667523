//! Runtime engine that materializes submitted resource nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use stratum_common::types::Urn;
use stratum_compose::backend::ResourceNode;
use stratum_compose::deferred::{NodeOutcome, Resolution, ResolutionError};
use uuid::Uuid;

use crate::provider::Provider;
use crate::state::StateStore;

/// Summary of one apply run.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    /// Identifier of the run.
    pub run_id: Uuid,
    /// Nodes that were created, in creation order.
    pub created: Vec<Urn>,
    /// Nodes that failed, with the root cause.
    pub failed: Vec<(Urn, ResolutionError)>,
}

impl ApplyReport {
    /// Returns whether every node was created.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Materializes nodes in submission order through a [`Provider`].
///
/// A node whose inputs failed is not attempted; it is recorded as failed
/// with the failure it inherited, so that every downstream deferred value
/// reports the original cause.
pub struct Engine {
    provider: Arc<dyn Provider>,
    faults: BTreeSet<Urn>,
}

impl Engine {
    /// Creates an engine backed by `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            faults: BTreeSet::new(),
        }
    }

    /// Makes the node `urn` fail when it is created.
    #[must_use]
    pub fn with_fault(mut self, urn: Urn) -> Self {
        let _ = self.faults.insert(urn);
        self
    }

    /// Creates every node in `nodes`, recording outputs in `state`.
    ///
    /// `nodes` must be in submission order, which places every node after
    /// the nodes it depends on.
    pub fn apply(&self, nodes: &[ResourceNode], state: &mut StateStore) -> ApplyReport {
        let run_id = state.begin_run();
        tracing::info!(%run_id, provider = self.provider.name(), nodes = nodes.len(), "apply started");
        let mut report = ApplyReport {
            run_id,
            created: Vec::new(),
            failed: Vec::new(),
        };

        for node in nodes {
            match self.create(node, state) {
                Ok(fields) => {
                    tracing::info!(urn = %node.urn, kind = %node.kind, "node created");
                    state.record_ready(node.urn.clone(), fields);
                    report.created.push(node.urn.clone());
                }
                Err(err) => {
                    tracing::warn!(urn = %node.urn, kind = %node.kind, error = %err, "node failed");
                    state.record_failed(node.urn.clone(), err.clone());
                    report.failed.push((node.urn.clone(), err));
                }
            }
        }

        tracing::info!(
            %run_id,
            created = report.created.len(),
            failed = report.failed.len(),
            "apply finished"
        );
        report
    }

    fn create(
        &self,
        node: &ResourceNode,
        state: &StateStore,
    ) -> Result<crate::provider::Outputs, ResolutionError> {
        for dependency in &node.depends_on {
            match state.outputs().outcome(dependency) {
                Some(NodeOutcome::Failed(err)) => return Err(err.clone()),
                Some(NodeOutcome::Ready(_)) => {}
                None => {
                    return Err(ResolutionError::new(
                        node.urn.as_str(),
                        format!("dependency {dependency} was never created"),
                    ));
                }
            }
        }
        let args = match node.args.resolve(state) {
            Resolution::Ready(args) => args,
            Resolution::Failed(err) => return Err(err),
            Resolution::Pending => {
                return Err(ResolutionError::new(node.urn.as_str(), "inputs never resolved"));
            }
        };
        if self.faults.contains(&node.urn) {
            return Err(ResolutionError::new(node.urn.as_str(), "injected failure"));
        }
        self.provider
            .create(node, &args)
            .map_err(|err| ResolutionError::new(node.urn.as_str(), err.to_string()))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("provider", &self.provider.name())
            .field("faults", &self.faults)
            .finish()
    }
}
