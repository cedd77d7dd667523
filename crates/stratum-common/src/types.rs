//! Domain primitive types used across the Stratum workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{PATH_SEPARATOR, TYPE_SEPARATOR, URN_PREFIX};

/// Globally unique identifier of a resource node.
///
/// Encodes the stage, the app, the chain of component types that own the
/// node, and the node's logical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Urn(String);

impl Urn {
    /// Creates a URN from its parts.
    #[must_use]
    pub fn new(app: &str, stage: &str, type_chain: &str, name: &str) -> Self {
        Self(format!("{URN_PREFIX}:{stage}::{app}::{type_chain}::{name}"))
    }

    /// Creates the URN of a node owned by the component at path `owner`.
    ///
    /// The owner's component names are part of the URN, so equally named
    /// components under different parents never share a node URN.
    #[must_use]
    pub fn owned(app: &str, stage: &str, type_chain: &str, owner: &str, name: &str) -> Self {
        Self(format!("{URN_PREFIX}:{stage}::{app}::{type_chain}::{owner}::{name}"))
    }

    /// Wraps an already formatted URN string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the logical name segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Urn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a component in the ownership tree.
///
/// Each segment pairs the component type token with its name. The root
/// path is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentPath {
    segments: Vec<(String, String)>,
}

impl ComponentPath {
    /// Returns the root path.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Returns the path of a child component.
    #[must_use]
    pub fn child(&self, type_token: impl Into<String>, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push((type_token.into(), name.into()));
        Self { segments }
    }

    /// Returns the parent path, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Returns the component name, or `None` at the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|(_, name)| name.as_str())
    }

    /// Returns the component type token, or `None` at the root.
    #[must_use]
    pub fn type_token(&self) -> Option<&str> {
        self.segments.last().map(|(token, _)| token.as_str())
    }

    /// Returns whether this is the root path.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Joins the component names of every segment, outermost first.
    ///
    /// Empty at the root.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.segments
            .iter()
            .map(|(_, name)| name.as_str())
            .collect::<Vec<_>>()
            .join(PATH_SEPARATOR)
    }

    /// Joins the type tokens of every segment, then `leaf`.
    #[must_use]
    pub fn type_chain(&self, leaf: &str) -> String {
        self.segments
            .iter()
            .map(|(token, _)| token.as_str())
            .chain(std::iter::once(leaf))
            .collect::<Vec<_>>()
            .join(TYPE_SEPARATOR)
    }
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        let names: Vec<&str> = self.segments.iter().map(|(_, n)| n.as_str()).collect();
        write!(f, "{}", names.join(PATH_SEPARATOR))
    }
}

/// A backend resource type together with its transformable argument schema.
///
/// `key` is the stable name callers use to address the kind in transform
/// blocks; `token` is the type identifier handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind {
    key: &'static str,
    token: &'static str,
    args: &'static [&'static str],
}

impl ResourceKind {
    /// Declares a resource kind.
    #[must_use]
    pub const fn new(key: &'static str, token: &'static str, args: &'static [&'static str]) -> Self {
        Self { key, token, args }
    }

    /// Returns the transform key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Returns the backend type token.
    #[must_use]
    pub const fn token(&self) -> &'static str {
        self.token
    }

    /// Returns the argument names this kind accepts.
    #[must_use]
    pub const fn args(&self) -> &'static [&'static str] {
        self.args
    }

    /// Returns whether `arg` belongs to this kind's schema.
    #[must_use]
    pub fn accepts(&self, arg: &str) -> bool {
        self.args.contains(&arg)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUCKET: ResourceKind = ResourceKind::new("bucket", "aws:s3/bucket:Bucket", &["acl"]);

    #[test]
    fn urn_encodes_stage_app_and_name() {
        let urn = Urn::new("shop", "dev", "stratum:aws:Postgres$aws:rds/instance:Instance", "DbInstance");
        assert_eq!(
            urn.as_str(),
            "urn:stratum:dev::shop::stratum:aws:Postgres$aws:rds/instance:Instance::DbInstance"
        );
        assert_eq!(urn.name(), "DbInstance");
    }

    #[test]
    fn owned_urn_keeps_owner_names() {
        let chain = "stratum:aws:Vpc$stratum:aws:Postgres$aws:rds/subnetGroup:SubnetGroup";
        let a = Urn::owned("shop", "dev", chain, "A/Db", "DbSubnetGroup");
        let b = Urn::owned("shop", "dev", chain, "B/Db", "DbSubnetGroup");
        assert_ne!(a, b);
        assert_eq!(a.name(), "DbSubnetGroup");
        assert!(a.as_str().contains("::A/Db::"), "got: {a}");
    }

    #[test]
    fn component_path_tracks_parent_and_type_chain() {
        let root = ComponentPath::root();
        let app = root.child("stratum:App", "Web");
        let db = app.child("stratum:aws:Postgres", "Db");
        assert_eq!(db.to_string(), "Web/Db");
        assert_eq!(db.parent(), Some(app.clone()));
        assert_eq!(
            db.type_chain("aws:rds/instance:Instance"),
            "stratum:App$stratum:aws:Postgres$aws:rds/instance:Instance"
        );
        assert_eq!(db.qualified_name(), "Web/Db");
        assert_eq!(root.to_string(), "<root>");
        assert_eq!(root.qualified_name(), "");
        assert!(root.parent().is_none());
    }

    #[test]
    fn resource_kind_checks_schema() {
        assert!(BUCKET.accepts("acl"));
        assert!(!BUCKET.accepts("policy"));
        assert_eq!(BUCKET.to_string(), "aws:s3/bucket:Bucket");
    }
}
