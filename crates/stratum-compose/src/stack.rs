//! Component registration and atomic node submission.
//!
//! A [`Stack`] owns the component ownership tree of one app/stage and the
//! backend nodes are submitted to. Each component is built inside a
//! [`ComponentScope`]: nodes are staged there, ordered by their deferred
//! inputs, and only handed to the backend when the scope finishes. A scope
//! that is dropped, for instance because construction returned early with
//! an error, leaves no trace in the stack or the backend.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use stratum_common::config::ProjectContext;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::{ComponentPath, ResourceKind, Urn};

use crate::adopt::ProvisionMode;
use crate::args::ResourceArgs;
use crate::backend::{ExistingResource, LookupFilter, ProvisioningBackend, ResourceHandle, ResourceNode};
use crate::graph::ResourceGraph;
use crate::transform::{ResourceDraft, Transforms};

/// A component registered in the ownership tree.
#[derive(Debug, Clone)]
pub struct ComponentRecord {
    /// Position in the tree.
    pub path: ComponentPath,
    /// Component type token.
    pub type_token: &'static str,
    /// Whether the component created or adopted its resources.
    pub mode: ProvisionMode,
    /// Nodes submitted for this component, in submission order.
    pub resources: Vec<ResourceHandle>,
    /// False when the backend rejected a node and the nodes it had
    /// already accepted could not be withdrawn.
    pub complete: bool,
}

/// The composition state of one app/stage.
pub struct Stack {
    project: ProjectContext,
    backend: Arc<dyn ProvisioningBackend>,
    components: BTreeMap<ComponentPath, ComponentRecord>,
    resources: HashMap<Urn, ResourceKind>,
    order: Vec<Urn>,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("project", &self.project)
            .field("components", &self.components.len())
            .field("resources", &self.order.len())
            .finish_non_exhaustive()
    }
}

impl Stack {
    /// Creates an empty stack submitting to `backend`.
    #[must_use]
    pub fn new(project: ProjectContext, backend: Arc<dyn ProvisioningBackend>) -> Self {
        Self {
            project,
            backend,
            components: BTreeMap::new(),
            resources: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Returns the app/stage identity.
    #[must_use]
    pub const fn project(&self) -> &ProjectContext {
        &self.project
    }

    /// Returns the component registered at `path`.
    #[must_use]
    pub fn component(&self, path: &ComponentPath) -> Option<&ComponentRecord> {
        self.components.get(path)
    }

    /// Iterates over registered components in path order.
    pub fn components(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.components.values()
    }

    /// Returns the direct children of `parent`.
    #[must_use]
    pub fn children(&self, parent: &ComponentPath) -> Vec<&ComponentRecord> {
        self.components
            .values()
            .filter(|c| c.path.parent().as_ref() == Some(parent))
            .collect()
    }

    /// Returns every submitted node URN in submission order.
    #[must_use]
    pub fn resource_order(&self) -> &[Urn] {
        &self.order
    }

    /// Returns whether `urn` has been submitted.
    #[must_use]
    pub fn contains_resource(&self, urn: &Urn) -> bool {
        self.resources.contains_key(urn)
    }

    /// Opens a scope for a component named `name` under `parent`.
    ///
    /// `kinds` lists every resource kind the component may create;
    /// `transforms` must only target those kinds.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or taken among its siblings,
    /// if the parent is not registered, or if a transform is invalid.
    pub fn begin(
        &mut self,
        parent: &ComponentPath,
        type_token: &'static str,
        name: &str,
        kinds: &[ResourceKind],
        transforms: &Transforms,
    ) -> Result<ComponentScope<'_>> {
        if name.trim().is_empty() {
            return Err(StratumError::config(
                name,
                "name",
                "component name is empty",
                "give the component a non-empty name",
            ));
        }
        if !parent.is_root() && !self.components.contains_key(parent) {
            return Err(StratumError::NotFound {
                kind: "parent component",
                id: parent.to_string(),
            });
        }
        if self
            .children(parent)
            .iter()
            .any(|sibling| sibling.path.name() == Some(name))
        {
            return Err(StratumError::DuplicateName {
                scope: parent.to_string(),
                name: name.to_string(),
            });
        }
        transforms.validate(name, kinds)?;

        let path = parent.child(type_token, name);
        tracing::debug!(component = %path, type_token, "component scope opened");
        Ok(ComponentScope {
            stack: self,
            graph: ResourceGraph::new(name),
            path,
            type_token,
            kinds: kinds.to_vec(),
            transforms: transforms.clone(),
            staged: Vec::new(),
            mode: ProvisionMode::Create,
        })
    }
}

/// Staging area for the nodes of one component under construction.
#[derive(Debug)]
pub struct ComponentScope<'s> {
    stack: &'s mut Stack,
    path: ComponentPath,
    type_token: &'static str,
    kinds: Vec<ResourceKind>,
    transforms: Transforms,
    graph: ResourceGraph,
    staged: Vec<ResourceNode>,
    mode: ProvisionMode,
}

impl ComponentScope<'_> {
    /// Returns the component name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.name().unwrap_or_default()
    }

    /// Returns the component's position in the tree.
    #[must_use]
    pub const fn path(&self) -> &ComponentPath {
        &self.path
    }

    /// Returns the app/stage identity.
    #[must_use]
    pub const fn project(&self) -> &ProjectContext {
        &self.stack.project
    }

    /// Marks the component as bound to existing resources.
    pub fn set_mode(&mut self, mode: ProvisionMode) {
        self.mode = mode;
    }

    /// Finds existing resources through the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be queried.
    pub fn lookup(&self, kind: &ResourceKind, filter: &LookupFilter) -> Result<Vec<ExistingResource>> {
        self.stack.backend.lookup_existing(kind, filter)
    }

    /// Stages a node with default options and no explicit ordering edges.
    ///
    /// # Errors
    ///
    /// See [`resource_with`](Self::resource_with).
    pub fn resource(
        &mut self,
        kind: ResourceKind,
        name: impl Into<String>,
        args: ResourceArgs,
    ) -> Result<ResourceHandle> {
        self.resource_with(kind, name, args, &[])
    }

    /// Stages a node after running the caller's transform for its kind.
    ///
    /// Every node read by the final arguments must already be staged in
    /// this scope or submitted by an earlier component. `after` adds
    /// explicit ordering edges the arguments do not express.
    ///
    /// # Errors
    ///
    /// Returns an error if the kind is undeclared, the transform is
    /// invalid or introduces an unknown producer, or the name collides.
    pub fn resource_with(
        &mut self,
        kind: ResourceKind,
        name: impl Into<String>,
        args: ResourceArgs,
        after: &[&ResourceHandle],
    ) -> Result<ResourceHandle> {
        if !self.kinds.contains(&kind) {
            return Err(StratumError::config(
                self.name(),
                kind.key(),
                format!("resource kind {kind} is not declared by this component"),
                "add the kind to the component's resource list",
            ));
        }
        let declared = args.producers();
        let draft = self
            .transforms
            .apply(self.name(), &kind, ResourceDraft::new(name, args))?;

        let urn = self.stack.project.urn(&self.path, kind.token(), &draft.name);
        if self.stack.resources.contains_key(&urn) {
            return Err(StratumError::DuplicateName {
                scope: format!("component \"{}\"", self.path),
                name: draft.name,
            });
        }

        let mut depends_on = BTreeSet::new();
        for producer in draft.args.producers() {
            if !self.is_known(&producer) {
                return Err(if declared.contains(&producer) {
                    StratumError::config(
                        self.name(),
                        kind.key(),
                        format!("argument reads unregistered node {producer}"),
                        "construct the producing component before this one",
                    )
                } else {
                    StratumError::override_error(
                        self.name(),
                        kind.key(),
                        format!("transform reads unregistered node {producer}"),
                    )
                });
            }
            let _ = depends_on.insert(producer);
        }
        for handle in after {
            if !self.is_known(handle.urn()) {
                return Err(StratumError::config(
                    self.name(),
                    kind.key(),
                    format!("ordering edge targets unregistered node {}", handle.urn()),
                    "construct the node before referencing it",
                ));
            }
            let _ = depends_on.insert(handle.urn().clone());
        }

        let idx = self.graph.add_node(urn.clone())?;
        for producer in &depends_on {
            if let Some(dep) = self.graph.node(producer) {
                self.graph.add_dependency(idx, dep);
            }
        }
        tracing::debug!(component = %self.path, urn = %urn, deps = depends_on.len(), "node staged");
        self.staged.push(ResourceNode {
            urn: urn.clone(),
            kind,
            name: draft.name,
            args: draft.args,
            options: draft.options,
            owner: self.path.clone(),
            depends_on,
        });
        Ok(ResourceHandle::new(urn, kind))
    }

    fn is_known(&self, urn: &Urn) -> bool {
        self.graph.node(urn).is_some() || self.stack.resources.contains_key(urn)
    }

    /// Registers the component and submits its nodes in dependency order.
    ///
    /// Submission is all or nothing: when the backend rejects a node, the
    /// nodes it already accepted are withdrawn in reverse order and the
    /// component is not registered. If a withdrawal fails too, the
    /// component is registered as incomplete so the accepted nodes keep
    /// an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the staged nodes form a cycle or the backend
    /// rejects a node.
    pub fn finish(self) -> Result<ComponentRecord> {
        let Self {
            stack,
            path,
            type_token,
            graph,
            staged,
            mode,
            ..
        } = self;
        let order = graph.resolve_order()?;
        let mut staged: HashMap<Urn, ResourceNode> =
            staged.into_iter().map(|n| (n.urn.clone(), n)).collect();

        let mut accepted: Vec<ResourceHandle> = Vec::with_capacity(order.len());
        for urn in order {
            let Some(node) = staged.remove(&urn) else {
                continue;
            };
            match stack.backend.submit(node) {
                Ok(handle) => accepted.push(handle),
                Err(err) => {
                    tracing::warn!(component = %path, urn = %urn, error = %err, accepted = accepted.len(), "node rejected, withdrawing component");
                    while let Some(handle) = accepted.last() {
                        if let Err(withdraw_err) = stack.backend.withdraw(handle.urn()) {
                            tracing::error!(component = %path, urn = %handle.urn(), error = %withdraw_err, "withdrawal failed, keeping component incomplete");
                            let _ = stack.register(ComponentRecord {
                                path,
                                type_token,
                                mode,
                                resources: accepted,
                                complete: false,
                            });
                            return Err(err);
                        }
                        let _ = accepted.pop();
                    }
                    return Err(err);
                }
            }
        }

        Ok(stack.register(ComponentRecord {
            path,
            type_token,
            mode,
            resources: accepted,
            complete: true,
        }))
    }
}

impl Stack {
    fn register(&mut self, record: ComponentRecord) -> ComponentRecord {
        for handle in &record.resources {
            let _ = self.resources.insert(handle.urn().clone(), *handle.kind());
            self.order.push(handle.urn().clone());
        }
        tracing::info!(
            component = %record.path,
            type_token = record.type_token,
            mode = ?record.mode,
            nodes = record.resources.len(),
            complete = record.complete,
            "component registered"
        );
        let _ = self.components.insert(record.path.clone(), record.clone());
        record
    }
}
