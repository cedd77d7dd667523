//! Project context and global configuration model.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{DEFAULT_STAGE, DEFAULT_STATE_FILE, PHYSICAL_NAME_HASH_LEN};
use crate::types::{ComponentPath, Urn};

/// Identity of the app and stage being composed.
///
/// Threaded explicitly into every component construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectContext {
    /// Application name.
    pub app: String,
    /// Deployment stage (e.g. `dev`, `production`).
    #[serde(default = "default_stage")]
    pub stage: String,
}

fn default_stage() -> String {
    DEFAULT_STAGE.to_string()
}

impl ProjectContext {
    /// Creates a context for `app` deployed to `stage`.
    #[must_use]
    pub fn new(app: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            stage: stage.into(),
        }
    }

    /// Returns the URN of a node named `name` of backend type `token`
    /// owned by the component at `owner`.
    #[must_use]
    pub fn urn(&self, owner: &ComponentPath, token: &str, name: &str) -> Urn {
        Urn::owned(
            &self.app,
            &self.stage,
            &owner.type_chain(token),
            &owner.qualified_name(),
            name,
        )
    }

    /// Derives the cloud-side name of `name` scoped to the component at
    /// `owner`.
    ///
    /// The names of `owner`'s ancestors prefix `name`, so equally named
    /// components under different parents get distinct physical names. A
    /// root-level component yields the same result as
    /// [`physical_name`](Self::physical_name).
    #[must_use]
    pub fn scoped_physical_name(&self, owner: &ComponentPath, name: &str, max_len: usize) -> String {
        match owner.parent().filter(|parent| !parent.is_root()) {
            Some(parent) => self.physical_name(&format!("{}-{name}", parent.qualified_name()), max_len),
            None => self.physical_name(name, max_len),
        }
    }

    /// Derives a deterministic cloud-side name for `name`.
    ///
    /// The result is `{app}-{stage}-{name}`, lowercased with every
    /// character outside `[a-z0-9-]` mapped to `-`. Names longer than
    /// `max_len` are truncated and suffixed with a short sha256 digest of
    /// the full name so distinct inputs stay distinct.
    #[must_use]
    pub fn physical_name(&self, name: &str, max_len: usize) -> String {
        let full: String = format!("{}-{}-{}", self.app, self.stage, name)
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' }
            })
            .collect();
        if full.len() <= max_len {
            return full;
        }
        let digest = Sha256::digest(full.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        let keep = max_len.saturating_sub(PHYSICAL_NAME_HASH_LEN + 1);
        format!("{}-{}", &full[..keep], &hex[..PHYSICAL_NAME_HASH_LEN])
    }
}

/// Root configuration for a Stratum deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratumConfig {
    /// App and stage identity.
    #[serde(flatten)]
    pub project: ProjectContext,
    /// Path to the state file written after an apply.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

fn default_state_file() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

impl StratumConfig {
    /// Creates a configuration with the default state file.
    #[must_use]
    pub fn new(project: ProjectContext) -> Self {
        Self {
            project,
            state_file: default_state_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_name_is_sanitized() {
        let ctx = ProjectContext::new("My_App", "dev");
        assert_eq!(ctx.physical_name("MyDatabase", 63), "my-app-dev-mydatabase");
    }

    #[test]
    fn physical_name_truncates_with_digest() {
        let ctx = ProjectContext::new("app", "stage");
        let long = "x".repeat(100);
        let name = ctx.physical_name(&long, 30);
        assert_eq!(name.len(), 30);
        let other = ctx.physical_name(&format!("{long}y"), 30);
        assert_ne!(name, other);
    }

    #[test]
    fn scoped_physical_name_includes_ancestors() {
        let ctx = ProjectContext::new("shop", "dev");
        let root = ComponentPath::root();
        let top = root.child("stratum:aws:Postgres", "Db");
        assert_eq!(ctx.scoped_physical_name(&top, "Db", 63), "shop-dev-db");

        let under_a = root.child("stratum:aws:Vpc", "A").child("stratum:aws:Postgres", "Db");
        let under_b = root.child("stratum:aws:Vpc", "B").child("stratum:aws:Postgres", "Db");
        assert_eq!(ctx.scoped_physical_name(&under_a, "Db", 63), "shop-dev-a-db");
        assert_ne!(
            ctx.scoped_physical_name(&under_a, "DbReplica0", 63),
            ctx.scoped_physical_name(&under_b, "DbReplica0", 63)
        );
    }

    #[test]
    fn node_urns_differ_by_owner() {
        let ctx = ProjectContext::new("shop", "dev");
        let root = ComponentPath::root();
        let a = root.child("stratum:aws:Vpc", "A").child("stratum:aws:Postgres", "Db");
        let b = root.child("stratum:aws:Vpc", "B").child("stratum:aws:Postgres", "Db");
        let token = "aws:rds/subnetGroup:SubnetGroup";
        assert_ne!(ctx.urn(&a, token, "DbSubnetGroup"), ctx.urn(&b, token, "DbSubnetGroup"));
    }

    #[test]
    fn config_defaults_stage_and_state_file() {
        let cfg: StratumConfig = serde_json::from_str(r#"{"app":"shop"}"#).expect("parse");
        assert_eq!(cfg.project.stage, "dev");
        assert_eq!(cfg.state_file, PathBuf::from(DEFAULT_STATE_FILE));
    }
}
