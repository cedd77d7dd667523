//! Formatted output helpers for CLI commands.
//!
//! Renders planned nodes and resolved link bags as text or JSON.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::{Value, json};
use stratum_compose::args::ResourceOptions;
use stratum_compose::backend::ResourceNode;
use stratum_compose::deferred::Resolution;

/// One node of a plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    /// Node URN.
    pub urn: String,
    /// Logical name.
    pub name: String,
    /// Backend resource type.
    pub kind: &'static str,
    /// Owning component path.
    pub component: String,
    /// Names of the nodes this one waits for.
    pub depends_on: Vec<String>,
    /// Arguments, with deferred inputs shown as placeholders.
    pub args: BTreeMap<String, Value>,
    /// Lifecycle options.
    pub options: ResourceOptions,
}

impl PlanEntry {
    /// Describes a submitted node.
    #[must_use]
    pub fn from_node(node: &ResourceNode) -> Self {
        Self {
            urn: node.urn.to_string(),
            name: node.name.clone(),
            kind: node.kind.token(),
            component: node.owner.to_string(),
            depends_on: node.depends_on.iter().map(|u| u.name().to_string()).collect(),
            args: node.args.describe(),
            options: node.options.clone(),
        }
    }
}

/// Renders a value for humans: strings bare, everything else as JSON.
#[must_use]
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Renders plan entries as an indented listing.
#[must_use]
pub fn render_plan(entries: &[PlanEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "  + {} ({})", entry.name, entry.kind);
        let _ = writeln!(out, "      component: {}", entry.component);
        if !entry.depends_on.is_empty() {
            let _ = writeln!(out, "      after: {}", entry.depends_on.join(", "));
        }
        for (key, value) in &entry.args {
            let _ = writeln!(out, "      {key}: {}", render_value(value));
        }
    }
    out
}

/// Renders one resolved link bag.
#[must_use]
pub fn render_link(name: &str, bag: &Resolution<BTreeMap<String, Value>>) -> String {
    let mut out = String::new();
    match bag {
        Resolution::Ready(properties) => {
            let _ = writeln!(out, "{name}:");
            for (key, value) in properties {
                let _ = writeln!(out, "  {key} = {}", render_value(value));
            }
        }
        Resolution::Pending => {
            let _ = writeln!(out, "{name}: pending (not applied yet)");
        }
        Resolution::Failed(err) => {
            let _ = writeln!(out, "{name}: failed ({err})");
        }
    }
    out
}

/// Converts a resolved link bag to JSON.
#[must_use]
pub fn link_json(bag: &Resolution<BTreeMap<String, Value>>) -> Value {
    match bag {
        Resolution::Ready(properties) => json!({ "status": "ready", "properties": properties }),
        Resolution::Pending => json!({ "status": "pending" }),
        Resolution::Failed(err) => json!({ "status": "failed", "error": err }),
    }
}
