//! Values that are not known until the provisioning backend resolves them.
//!
//! A [`Deferred`] is built during composition and evaluated afterwards
//! against an [`OutputSource`], which reports what the backend has produced
//! so far. Composition code only ever describes values; it never waits on
//! them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_common::types::Urn;
use thiserror::Error;

/// Reference to one output field of one resource node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputRef {
    /// Node producing the field.
    pub urn: Urn,
    /// Field name.
    pub field: String,
}

impl OutputRef {
    /// Creates a reference to `field` of `urn`.
    #[must_use]
    pub fn new(urn: Urn, field: impl Into<String>) -> Self {
        Self {
            urn,
            field: field.into(),
        }
    }
}

impl fmt::Display for OutputRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.urn.name(), self.field)
    }
}

/// Failure carried by a deferred value whose inputs could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{origin}: {message}")]
pub struct ResolutionError {
    origin: String,
    message: String,
}

impl ResolutionError {
    /// Creates a failure attributed to `origin`.
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Where the failure started (usually a node URN).
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Human-readable cause.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Observed state of a single output field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldState {
    /// The producing node has not been materialized yet.
    Pending,
    /// The field holds a value.
    Ready(Value),
    /// The producing node failed.
    Failed(ResolutionError),
}

/// Something that can report the fields the backend has produced.
pub trait OutputSource {
    /// Returns the current state of `output`.
    fn field(&self, output: &OutputRef) -> FieldState;
}

/// Outcome recorded for one materialized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node was created and produced these fields.
    Ready(BTreeMap<String, Value>),
    /// The node could not be created.
    Failed(ResolutionError),
}

/// In-memory [`OutputSource`] keyed by node URN.
///
/// A node absent from the table is pending. A field missing from a ready
/// node is a failure, since the node will never produce it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    nodes: BTreeMap<Urn, NodeOutcome>,
}

impl OutputTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `urn` produced `fields`.
    pub fn record_ready(&mut self, urn: Urn, fields: BTreeMap<String, Value>) {
        let _ = self.nodes.insert(urn, NodeOutcome::Ready(fields));
    }

    /// Records that `urn` failed.
    pub fn record_failed(&mut self, urn: Urn, error: ResolutionError) {
        let _ = self.nodes.insert(urn, NodeOutcome::Failed(error));
    }

    /// Returns the outcome recorded for `urn`.
    #[must_use]
    pub fn outcome(&self, urn: &Urn) -> Option<&NodeOutcome> {
        self.nodes.get(urn)
    }

    /// Iterates over every recorded outcome.
    pub fn outcomes(&self) -> impl Iterator<Item = (&Urn, &NodeOutcome)> {
        self.nodes.iter()
    }

    /// Number of materialized nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether no node has been materialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl OutputSource for OutputTable {
    fn field(&self, output: &OutputRef) -> FieldState {
        match self.nodes.get(&output.urn) {
            None => FieldState::Pending,
            Some(NodeOutcome::Failed(err)) => FieldState::Failed(err.clone()),
            Some(NodeOutcome::Ready(fields)) => fields.get(&output.field).map_or_else(
                || {
                    FieldState::Failed(ResolutionError::new(
                        output.urn.as_str(),
                        format!("node did not produce field `{}`", output.field),
                    ))
                },
                |value| FieldState::Ready(value.clone()),
            ),
        }
    }
}

/// Result of evaluating a deferred value against an [`OutputSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// At least one input is not known yet.
    Pending,
    /// Every input resolved.
    Ready(T),
    /// An input failed; the failure is permanent.
    Failed(ResolutionError),
}

impl<T> Resolution<T> {
    /// Returns the resolved value, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// Returns whether the value resolved.
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Returns whether an input failed.
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Transforms a ready value, keeping pending and failed states.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        match self {
            Self::Pending => Resolution::Pending,
            Self::Ready(value) => Resolution::Ready(f(value)),
            Self::Failed(err) => Resolution::Failed(err),
        }
    }
}

impl<T> From<Result<T, ResolutionError>> for Resolution<T> {
    fn from(result: Result<T, ResolutionError>) -> Self {
        match result {
            Ok(value) => Self::Ready(value),
            Err(err) => Self::Failed(err),
        }
    }
}

type Evaluator<T> = dyn Fn(&dyn OutputSource) -> Resolution<T> + Send + Sync;

enum Cell<T> {
    Known(T),
    Derived {
        dependencies: BTreeSet<OutputRef>,
        eval: Box<Evaluator<T>>,
        settled: OnceLock<Result<T, ResolutionError>>,
    },
}

/// A value that may only become known once the backend materializes the
/// nodes it depends on.
///
/// The set of outputs a deferred value reads and the function it applies
/// are fixed at construction. Its resolution moves from pending to ready
/// or failed at most once and never changes afterwards. Cloning is cheap
/// and shares that resolution.
pub struct Deferred<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.as_ref() {
            Cell::Known(_) => f.debug_struct("Deferred").field("known", &true).finish(),
            Cell::Derived {
                dependencies,
                settled,
                ..
            } => f
                .debug_struct("Deferred")
                .field("dependencies", dependencies)
                .field("settled", &settled.get().is_some())
                .finish(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Deferred<T> {
    /// Creates an already-resolved value.
    pub fn of(value: T) -> Self {
        Self {
            cell: Arc::new(Cell::Known(value)),
        }
    }

    fn derived(
        dependencies: BTreeSet<OutputRef>,
        eval: impl Fn(&dyn OutputSource) -> Resolution<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cell: Arc::new(Cell::Derived {
                dependencies,
                eval: Box::new(eval),
                settled: OnceLock::new(),
            }),
        }
    }

    /// Evaluates the value against `source`.
    ///
    /// A ready or failed outcome is cached permanently; a pending outcome
    /// is not, so a later call with a more complete source may resolve it.
    pub fn poll(&self, source: &dyn OutputSource) -> Resolution<T> {
        match self.cell.as_ref() {
            Cell::Known(value) => Resolution::Ready(value.clone()),
            Cell::Derived { eval, settled, .. } => {
                if let Some(done) = settled.get() {
                    return done.clone().into();
                }
                let outcome = match eval(source) {
                    Resolution::Pending => return Resolution::Pending,
                    Resolution::Ready(value) => Ok(value),
                    Resolution::Failed(err) => Err(err),
                };
                settled.get_or_init(|| outcome).clone().into()
            }
        }
    }

    /// Returns the value if it is already settled, without evaluating.
    pub fn peek(&self) -> Option<Result<T, ResolutionError>> {
        match self.cell.as_ref() {
            Cell::Known(value) => Some(Ok(value.clone())),
            Cell::Derived { settled, .. } => settled.get().cloned(),
        }
    }

    /// Returns whether the value was known at composition time.
    pub fn is_known(&self) -> bool {
        matches!(self.cell.as_ref(), Cell::Known(_))
    }

    /// Output fields this value reads.
    pub fn dependencies(&self) -> BTreeSet<OutputRef> {
        match self.cell.as_ref() {
            Cell::Known(_) => BTreeSet::new(),
            Cell::Derived { dependencies, .. } => dependencies.clone(),
        }
    }

    /// Nodes this value reads from.
    pub fn producers(&self) -> BTreeSet<Urn> {
        self.dependencies().into_iter().map(|d| d.urn).collect()
    }

    /// Returns a value resolving to `f` applied to this one.
    ///
    /// `f` runs after composition, once this value resolves. It must not
    /// create resources.
    pub fn map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let source = self.clone();
        Deferred::derived(self.dependencies(), move |outputs| {
            source.poll(outputs).map(&f)
        })
    }

    /// Like [`map`](Self::map), but `f` may reject the value; the
    /// rejection becomes a resolution failure.
    pub fn try_map<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> Result<U, String> + Send + Sync + 'static,
    {
        let source = self.clone();
        Deferred::derived(self.dependencies(), move |outputs| {
            match source.poll(outputs) {
                Resolution::Pending => Resolution::Pending,
                Resolution::Failed(err) => Resolution::Failed(err),
                Resolution::Ready(value) => match f(value) {
                    Ok(mapped) => Resolution::Ready(mapped),
                    Err(message) => Resolution::Failed(ResolutionError::new("transform", message)),
                },
            }
        })
    }

    /// Pairs this value with `other`.
    pub fn zip<U>(&self, other: &Deferred<U>) -> Deferred<(T, U)>
    where
        U: Clone + Send + Sync + 'static,
    {
        let (left, right) = (self.clone(), other.clone());
        let mut dependencies = self.dependencies();
        dependencies.extend(other.dependencies());
        Deferred::derived(dependencies, move |outputs| {
            match (left.poll(outputs), right.poll(outputs)) {
                (Resolution::Failed(err), _) | (_, Resolution::Failed(err)) => {
                    Resolution::Failed(err)
                }
                (Resolution::Ready(a), Resolution::Ready(b)) => Resolution::Ready((a, b)),
                _ => Resolution::Pending,
            }
        })
    }

    /// Combines `items` into one value resolving to their values in order.
    ///
    /// Resolves only once every item resolves; fails as soon as any item
    /// fails.
    pub fn combine(items: impl IntoIterator<Item = Self>) -> Deferred<Vec<T>> {
        let items: Vec<Self> = items.into_iter().collect();
        let dependencies = items.iter().flat_map(Self::dependencies).collect();
        Deferred::derived(dependencies, move |outputs| {
            let mut values = Vec::with_capacity(items.len());
            let mut pending = false;
            for item in &items {
                match item.poll(outputs) {
                    Resolution::Failed(err) => return Resolution::Failed(err),
                    Resolution::Pending => pending = true,
                    Resolution::Ready(value) => values.push(value),
                }
            }
            if pending {
                Resolution::Pending
            } else {
                Resolution::Ready(values)
            }
        })
    }
}

impl<T: DeserializeOwned + Clone + Send + Sync + 'static> Deferred<T> {
    /// Creates a value reading `field` of the node `urn`.
    pub fn output(urn: Urn, field: impl Into<String>) -> Self {
        let output = OutputRef::new(urn, field);
        let dependencies = BTreeSet::from([output.clone()]);
        Self::derived(dependencies, move |outputs| match outputs.field(&output) {
            FieldState::Pending => Resolution::Pending,
            FieldState::Failed(err) => Resolution::Failed(err),
            FieldState::Ready(value) => match serde_json::from_value(value) {
                Ok(typed) => Resolution::Ready(typed),
                Err(err) => Resolution::Failed(ResolutionError::new(
                    output.urn.as_str(),
                    format!("field `{}` has an unexpected shape: {err}", output.field),
                )),
            },
        })
    }
}

impl<T: Serialize + Clone + Send + Sync + 'static> Deferred<T> {
    /// Converts to a JSON-valued deferred with the same dependencies.
    pub fn erase(&self) -> Deferred<Value> {
        if let Cell::Known(value) = self.cell.as_ref() {
            if let Ok(json) = serde_json::to_value(value) {
                return Deferred::of(json);
            }
        }
        self.try_map(|value| serde_json::to_value(value).map_err(|e| e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn urn(name: &str) -> Urn {
        Urn::new("app", "test", "test:Node", name)
    }

    fn ready(table: &mut OutputTable, name: &str, fields: &[(&str, Value)]) {
        table.record_ready(
            urn(name),
            fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
        );
    }

    #[test]
    fn known_value_resolves_immediately() {
        let value = Deferred::of(5_u16);
        assert!(value.is_known());
        assert_eq!(value.poll(&OutputTable::new()), Resolution::Ready(5));
        assert!(value.dependencies().is_empty());
    }

    #[test]
    fn output_is_pending_until_node_materializes() {
        let endpoint: Deferred<String> = Deferred::output(urn("Instance"), "endpoint");
        let mut table = OutputTable::new();
        assert_eq!(endpoint.poll(&table), Resolution::Pending);
        assert!(endpoint.peek().is_none());

        ready(&mut table, "Instance", &[("endpoint", json!("db.local:5432"))]);
        assert_eq!(endpoint.poll(&table), Resolution::Ready("db.local:5432".to_string()));
    }

    #[test]
    fn resolution_happens_once() {
        let id: Deferred<String> = Deferred::output(urn("Vpc"), "id");
        let mut table = OutputTable::new();
        ready(&mut table, "Vpc", &[("id", json!("vpc-1"))]);
        assert!(id.poll(&table).is_ready());

        let mut other = OutputTable::new();
        ready(&mut other, "Vpc", &[("id", json!("vpc-2"))]);
        assert_eq!(id.poll(&other), Resolution::Ready("vpc-1".to_string()));
        assert_eq!(id.peek(), Some(Ok("vpc-1".to_string())));
    }

    #[test]
    fn chained_maps_compose() {
        let f = |x: i64| x + 3;
        let g = |x: i64| x * 10;
        let source: Deferred<i64> = Deferred::output(urn("Counter"), "value");
        let chained = source.map(f).map(g);
        let mut table = OutputTable::new();
        ready(&mut table, "Counter", &[("value", json!(4))]);
        assert_eq!(chained.poll(&table), Resolution::Ready(g(f(4))));
        assert_eq!(chained.dependencies(), source.dependencies());
    }

    #[test]
    fn combine_waits_for_all_and_preserves_order() {
        let a: Deferred<String> = Deferred::output(urn("A"), "id");
        let b: Deferred<String> = Deferred::output(urn("B"), "id");
        let both = Deferred::combine([b.clone(), a.clone()]);
        let mut table = OutputTable::new();
        ready(&mut table, "A", &[("id", json!("a"))]);
        assert_eq!(both.poll(&table), Resolution::Pending);

        ready(&mut table, "B", &[("id", json!("b"))]);
        assert_eq!(
            both.poll(&table),
            Resolution::Ready(vec!["b".to_string(), "a".to_string()])
        );
        assert_eq!(both.producers(), BTreeSet::from([urn("A"), urn("B")]));
    }

    #[test]
    fn failure_poisons_every_consumer() {
        let a: Deferred<String> = Deferred::output(urn("A"), "id");
        let b: Deferred<String> = Deferred::output(urn("B"), "id");
        let zipped = a.zip(&b).map(|(x, y)| format!("{x}-{y}"));
        let combined = Deferred::combine([a, b]);

        let mut table = OutputTable::new();
        table.record_failed(urn("A"), ResolutionError::new("A", "quota exceeded"));
        match zipped.poll(&table) {
            Resolution::Failed(err) => assert_eq!(err.message(), "quota exceeded"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(combined.poll(&table).is_failed());
    }

    #[test]
    fn missing_field_on_ready_node_fails() {
        let port: Deferred<u16> = Deferred::output(urn("Instance"), "port");
        let mut table = OutputTable::new();
        ready(&mut table, "Instance", &[("endpoint", json!("x:1"))]);
        assert!(port.poll(&table).is_failed());
    }

    #[test]
    fn wrong_shape_fails() {
        let port: Deferred<u16> = Deferred::output(urn("Instance"), "port");
        let mut table = OutputTable::new();
        ready(&mut table, "Instance", &[("port", json!("not-a-number"))]);
        assert!(port.poll(&table).is_failed());
    }

    #[test]
    fn try_map_rejection_becomes_failure() {
        let raw: Deferred<String> = Deferred::output(urn("Instance"), "port");
        let port = raw.try_map(|s| s.parse::<u16>().map_err(|e| e.to_string()));
        let mut table = OutputTable::new();
        ready(&mut table, "Instance", &[("port", json!("abc"))]);
        assert!(port.poll(&table).is_failed());
    }

    #[test]
    fn erase_keeps_dependencies() {
        let subnets: Deferred<Vec<String>> = Deferred::output(urn("Subnet"), "ids");
        let erased = subnets.erase();
        assert_eq!(erased.dependencies(), subnets.dependencies());
        assert!(Deferred::of(3_u32).erase().is_known());
    }
}
