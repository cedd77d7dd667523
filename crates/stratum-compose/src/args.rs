//! Arguments and options handed to resource node constructors.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use stratum_common::types::Urn;

use crate::deferred::{Deferred, OutputRef, OutputSource, Resolution};

/// A single argument value: either known now or deferred.
#[derive(Debug, Clone)]
pub enum Input {
    /// A value known at composition time.
    Literal(Value),
    /// A value produced by another node.
    Deferred(Deferred<Value>),
}

impl Input {
    /// Output fields this input reads.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<OutputRef> {
        match self {
            Self::Literal(_) => BTreeSet::new(),
            Self::Deferred(value) => value.dependencies(),
        }
    }

    /// Evaluates the input against `source`.
    pub fn resolve(&self, source: &dyn OutputSource) -> Resolution<Value> {
        match self {
            Self::Literal(value) => Resolution::Ready(value.clone()),
            Self::Deferred(value) => value.poll(source),
        }
    }

    /// Returns the literal value, if known at composition time.
    #[must_use]
    pub const fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    /// Renders the input for plans: literals verbatim, deferred inputs as
    /// a placeholder naming the fields they read.
    #[must_use]
    pub fn describe(&self) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Deferred(value) => match value.peek() {
                Some(Ok(settled)) => settled,
                _ => {
                    let refs: Vec<String> =
                        value.dependencies().iter().map(ToString::to_string).collect();
                    Value::String(format!("<deferred: {}>", refs.join(", ")))
                }
            },
        }
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Self::Literal(value)
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<bool> for Input {
    fn from(value: bool) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<u32> for Input {
    fn from(value: u32) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl From<i64> for Input {
    fn from(value: i64) -> Self {
        Self::Literal(Value::from(value))
    }
}

impl<T: Serialize + Clone + Send + Sync + 'static> From<Deferred<T>> for Input {
    fn from(value: Deferred<T>) -> Self {
        Self::Deferred(value.erase())
    }
}

/// Named arguments of one resource node.
#[derive(Debug, Clone, Default)]
pub struct ResourceArgs {
    entries: BTreeMap<String, Input>,
}

impl ResourceArgs {
    /// Creates an empty argument set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` and returns `self`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Input>) -> Self {
        let _ = self.entries.insert(key.into(), value.into());
        self
    }

    /// Sets `key`, returning the previous input.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Input>) -> Option<Input> {
        self.entries.insert(key.into(), value.into())
    }

    /// Returns the input for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Input> {
        self.entries.get(key)
    }

    /// Removes `key`.
    pub fn remove(&mut self, key: &str) -> Option<Input> {
        self.entries.remove(key)
    }

    /// Iterates over argument names in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterates over arguments in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Input)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no argument is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overlays `patch`; keys present in both take the patch's input.
    pub fn merge(&mut self, patch: &Self) {
        for (key, value) in &patch.entries {
            let _ = self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Inserts `entry` into the literal array under `key`, replacing the
    /// element whose `id_field` matches.
    ///
    /// Returns `false` without changes when `key` holds something other
    /// than a literal array or `entry` lacks `id_field`.
    #[must_use]
    pub fn upsert_entry(&mut self, key: &str, id_field: &str, entry: Value) -> bool {
        let Some(id) = entry.get(id_field).cloned() else {
            return false;
        };
        let Some(Input::Literal(Value::Array(items))) = self.entries.get_mut(key) else {
            return false;
        };
        match items.iter_mut().find(|item| item.get(id_field) == Some(&id)) {
            Some(existing) => *existing = entry,
            None => items.push(entry),
        }
        true
    }

    /// Output fields read by any argument.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<OutputRef> {
        self.entries.values().flat_map(Input::dependencies).collect()
    }

    /// Nodes read by any argument.
    #[must_use]
    pub fn producers(&self) -> BTreeSet<Urn> {
        self.dependencies().into_iter().map(|d| d.urn).collect()
    }

    /// Resolves every argument; fails on the first failed input.
    pub fn resolve(&self, source: &dyn OutputSource) -> Resolution<BTreeMap<String, Value>> {
        resolve_inputs(&self.entries, source)
    }

    /// Renders every argument with [`Input::describe`].
    #[must_use]
    pub fn describe(&self) -> BTreeMap<String, Value> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.describe()))
            .collect()
    }
}

impl From<BTreeMap<String, Value>> for ResourceArgs {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self {
            entries: values
                .into_iter()
                .map(|(k, v)| (k, Input::Literal(v)))
                .collect(),
        }
    }
}

/// Resolves a map of inputs; fails on the first failed input and stays
/// pending while any input is pending.
pub(crate) fn resolve_inputs(
    entries: &BTreeMap<String, Input>,
    source: &dyn OutputSource,
) -> Resolution<BTreeMap<String, Value>> {
    let mut resolved = BTreeMap::new();
    let mut pending = false;
    for (key, input) in entries {
        match input.resolve(source) {
            Resolution::Failed(err) => return Resolution::Failed(err),
            Resolution::Pending => pending = true,
            Resolution::Ready(value) => {
                let _ = resolved.insert(key.clone(), value);
            }
        }
    }
    if pending {
        Resolution::Pending
    } else {
        Resolution::Ready(resolved)
    }
}

/// Lifecycle options of a resource node.
///
/// Explicit ordering edges are not part of the options; they are set
/// only by component code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOptions {
    /// Refuse to delete the resource.
    #[serde(default)]
    pub protect: bool,
    /// Leave the cloud resource in place when it leaves the graph.
    #[serde(default)]
    pub retain_on_delete: bool,
    /// Arguments whose drift is ignored on update.
    #[serde(default)]
    pub ignore_changes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::deferred::OutputTable;

    fn urn(name: &str) -> Urn {
        Urn::new("app", "test", "test:Node", name)
    }

    #[test]
    fn merge_lets_patch_win() {
        let mut args = ResourceArgs::new().with("family", "postgres16").with("name", "db");
        let patch = ResourceArgs::new().with("name", "custom");
        args.merge(&patch);
        assert_eq!(args.get("name").and_then(Input::as_literal), Some(&json!("custom")));
        assert_eq!(args.get("family").and_then(Input::as_literal), Some(&json!("postgres16")));
    }

    #[test]
    fn upsert_replaces_matching_entry() {
        let mut args = ResourceArgs::new().with(
            "parameters",
            json!([{"name": "rds.force_ssl", "value": "0"}, {"name": "other", "value": "x"}]),
        );
        assert!(args.upsert_entry(
            "parameters",
            "name",
            json!({"name": "rds.force_ssl", "value": "1"})
        ));
        assert!(args.upsert_entry("parameters", "name", json!({"name": "new", "value": "y"})));
        let params = args.get("parameters").and_then(Input::as_literal).expect("literal");
        assert_eq!(params[0]["value"], json!("1"));
        assert_eq!(params.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn upsert_refuses_non_array() {
        let mut args = ResourceArgs::new().with("parameters", "flat");
        assert!(!args.upsert_entry("parameters", "name", json!({"name": "a"})));
        assert!(!args.upsert_entry("missing", "name", json!({"name": "a"})));
    }

    #[test]
    fn resolve_reports_pending_then_ready() {
        let id: Deferred<String> = Deferred::output(urn("Group"), "name");
        let args = ResourceArgs::new().with("group", id).with("size", 20_u32);
        assert_eq!(args.producers(), BTreeSet::from([urn("Group")]));

        let mut table = OutputTable::new();
        assert_eq!(args.resolve(&table), Resolution::Pending);
        table.record_ready(urn("Group"), BTreeMap::from([("name".to_string(), json!("g1"))]));
        let resolved = args.resolve(&table).ready().expect("ready");
        assert_eq!(resolved["group"], json!("g1"));
        assert_eq!(resolved["size"], json!(20));
    }

    #[test]
    fn describe_marks_deferred_inputs() {
        let id: Deferred<String> = Deferred::output(urn("Group"), "name");
        let args = ResourceArgs::new().with("group", id);
        let described = args.describe();
        let text = described["group"].as_str().expect("string");
        assert!(text.contains("Group.name"), "got: {text}");
    }
}
