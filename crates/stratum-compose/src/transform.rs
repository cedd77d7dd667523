//! Per-resource-kind overrides applied before a node is staged.
//!
//! A component computes its default `(name, args, options)` for every node
//! and passes them through the caller's [`Transforms`]. The override for
//! the node's kind, if any, runs once and its result is what the node is
//! built from. Nodes of other kinds pass through untouched.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::ResourceKind;

use crate::args::{ResourceArgs, ResourceOptions};

/// The mutable description of a node while transforms run.
#[derive(Debug, Clone)]
pub struct ResourceDraft {
    /// Logical node name, unique within the component.
    pub name: String,
    /// Constructor arguments.
    pub args: ResourceArgs,
    /// Lifecycle options.
    pub options: ResourceOptions,
}

impl ResourceDraft {
    /// Creates a draft with default options.
    #[must_use]
    pub fn new(name: impl Into<String>, args: ResourceArgs) -> Self {
        Self {
            name: name.into(),
            args,
            options: ResourceOptions::default(),
        }
    }
}

type TransformFn = dyn Fn(&mut ResourceDraft) + Send + Sync;

/// A caller-supplied override for one resource kind.
#[derive(Clone)]
pub enum Transform {
    /// Arguments merged over the defaults; patch keys win.
    Patch(ResourceArgs),
    /// A function reshaping the draft in place.
    Apply(Arc<TransformFn>),
}

impl Transform {
    /// Creates a patch override.
    #[must_use]
    pub const fn patch(args: ResourceArgs) -> Self {
        Self::Patch(args)
    }

    /// Creates a function override.
    pub fn apply(f: impl Fn(&mut ResourceDraft) + Send + Sync + 'static) -> Self {
        Self::Apply(Arc::new(f))
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch(args) => f.debug_tuple("Patch").field(args).finish(),
            Self::Apply(_) => f.write_str("Apply(<fn>)"),
        }
    }
}

/// Overrides keyed by resource kind transform key.
#[derive(Debug, Clone, Default)]
pub struct Transforms {
    by_kind: BTreeMap<String, Transform>,
}

impl Transforms {
    /// Creates an empty set; every node keeps its defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `transform` for the kind addressed by `key`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, transform: Transform) -> Self {
        let _ = self.by_kind.insert(key.into(), transform);
        self
    }

    /// Builds patch overrides from plain configuration values.
    #[must_use]
    pub fn from_patches(patches: BTreeMap<String, BTreeMap<String, Value>>) -> Self {
        Self {
            by_kind: patches
                .into_iter()
                .map(|(key, values)| (key, Transform::Patch(ResourceArgs::from(values))))
                .collect(),
        }
    }

    /// Returns the override registered for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Transform> {
        self.by_kind.get(key)
    }

    /// Returns whether no override is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }

    /// Checks that every override targets one of `kinds` and that patches
    /// only name arguments of their kind.
    ///
    /// # Errors
    ///
    /// Returns an override error naming the first invalid key.
    pub fn validate(&self, component: &str, kinds: &[ResourceKind]) -> Result<()> {
        for (key, transform) in &self.by_kind {
            let Some(kind) = kinds.iter().find(|k| k.key() == key) else {
                let known: Vec<&str> = kinds.iter().map(ResourceKind::key).collect();
                return Err(StratumError::override_error(
                    component,
                    key,
                    format!("component has no resource of this kind (expected one of: {})", known.join(", ")),
                ));
            };
            if let Transform::Patch(patch) = transform {
                check_schema(component, kind, patch, "patch")?;
            }
        }
        Ok(())
    }

    /// Produces the final draft for a node of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an override error if the override names arguments outside
    /// the kind's schema or leaves the node without a name.
    pub fn apply(
        &self,
        component: &str,
        kind: &ResourceKind,
        mut draft: ResourceDraft,
    ) -> Result<ResourceDraft> {
        let Some(transform) = self.by_kind.get(kind.key()) else {
            return Ok(draft);
        };
        tracing::debug!(component, kind = kind.key(), name = %draft.name, "applying transform");
        match transform {
            Transform::Patch(patch) => {
                check_schema(component, kind, patch, "patch")?;
                draft.args.merge(patch);
            }
            Transform::Apply(f) => {
                f(&mut draft);
                check_schema(component, kind, &draft.args, "transform function")?;
            }
        }
        if draft.name.trim().is_empty() {
            return Err(StratumError::override_error(
                component,
                kind.key(),
                "transform left the resource without a name",
            ));
        }
        Ok(draft)
    }
}

fn check_schema(component: &str, kind: &ResourceKind, args: &ResourceArgs, what: &str) -> Result<()> {
    if let Some(unknown) = args.keys().find(|key| !kind.accepts(key)) {
        return Err(StratumError::override_error(
            component,
            kind.key(),
            format!("{what} sets unknown argument `{unknown}` for {kind}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::args::Input;

    const GROUP: ResourceKind =
        ResourceKind::new("parameter_group", "aws:rds/parameterGroup:ParameterGroup", &["family", "parameters", "name"]);
    const PASSWORD: ResourceKind =
        ResourceKind::new("password", "random:index/randomPassword:RandomPassword", &["length", "special"]);

    fn group_draft() -> ResourceDraft {
        ResourceDraft::new(
            "DbParameterGroup",
            ResourceArgs::new()
                .with("family", "postgres16")
                .with("parameters", json!([{"name": "rds.force_ssl", "value": "0"}])),
        )
    }

    #[test]
    fn no_override_passes_defaults_through() {
        let draft = Transforms::new().apply("Db", &GROUP, group_draft()).expect("apply");
        assert_eq!(draft.name, "DbParameterGroup");
        assert_eq!(draft.args.len(), 2);
    }

    #[test]
    fn patch_overrides_conflicting_keys() {
        let transforms = Transforms::new().with(
            "parameter_group",
            Transform::patch(ResourceArgs::new().with("family", "postgres15")),
        );
        let draft = transforms.apply("Db", &GROUP, group_draft()).expect("apply");
        assert_eq!(draft.args.get("family").and_then(Input::as_literal), Some(&json!("postgres15")));
    }

    #[test]
    fn function_can_rename_and_reshape() {
        let transforms = Transforms::new().with(
            "parameter_group",
            Transform::apply(|draft| {
                draft.name = "Renamed".into();
                let _ = draft.args.upsert_entry(
                    "parameters",
                    "name",
                    json!({"name": "rds.force_ssl", "value": "1"}),
                );
            }),
        );
        let draft = transforms.apply("Db", &GROUP, group_draft()).expect("apply");
        assert_eq!(draft.name, "Renamed");
        let params = draft.args.get("parameters").and_then(Input::as_literal).expect("literal");
        assert_eq!(params[0]["value"], json!("1"));
    }

    #[test]
    fn override_only_touches_its_kind() {
        let transforms = Transforms::new().with(
            "parameter_group",
            Transform::apply(|draft| draft.name = "Renamed".into()),
        );
        let password = ResourceDraft::new("DbPassword", ResourceArgs::new().with("length", 32_u32));
        let out = transforms.apply("Db", &PASSWORD, password).expect("apply");
        assert_eq!(out.name, "DbPassword");
    }

    #[test]
    fn unknown_patch_argument_is_rejected() {
        let transforms = Transforms::new().with(
            "password",
            Transform::patch(ResourceArgs::new().with("colour", "blue")),
        );
        let err = transforms.validate("Db", &[GROUP, PASSWORD]).unwrap_err();
        assert!(err.to_string().contains("colour"), "got: {err}");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let transforms = Transforms::new().with("bucket", Transform::patch(ResourceArgs::new()));
        let err = transforms.validate("Db", &[GROUP]).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bucket") && msg.contains("parameter_group"), "got: {msg}");
    }

    #[test]
    fn emptied_name_is_rejected() {
        let transforms = Transforms::new().with(
            "parameter_group",
            Transform::apply(|draft| draft.name.clear()),
        );
        assert!(transforms.apply("Db", &GROUP, group_draft()).is_err());
    }

    #[test]
    fn patches_from_configuration() {
        let patches = BTreeMap::from([(
            "password".to_string(),
            BTreeMap::from([("length".to_string(), json!(48))]),
        )]);
        let transforms = Transforms::from_patches(patches);
        transforms.validate("Db", &[PASSWORD]).expect("valid");
        let out = transforms
            .apply("Db", &PASSWORD, ResourceDraft::new("DbPassword", ResourceArgs::new().with("length", 32_u32)))
            .expect("apply");
        assert_eq!(out.args.get("length").and_then(Input::as_literal), Some(&json!(48)));
    }
}
