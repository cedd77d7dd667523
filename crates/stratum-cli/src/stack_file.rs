//! YAML stack files and their composition into components.
//!
//! A stack file names the app and stage, lists components in construction
//! order, and may describe existing cloud resources that adopt-mode
//! components bind to.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use serde_json::Value;
use stratum_common::config::StratumConfig;
use stratum_compose::backend::ExistingResource;
use stratum_compose::backend::memory::MemoryBackend;
use stratum_compose::components::{
    ExistingPostgres, NetworkConfig, NetworkInput, Postgres, PostgresArgs, PostgresInput, Vpc,
    VpcArgs, VpcV1,
};
use stratum_compose::deferred::Deferred;
use stratum_compose::stack::Stack;
use stratum_compose::transform::Transforms;
use stratum_runtime::links::LinkRegistry;

const DEFAULT_REGION: &str = "us-east-1";
const ZONE_LETTERS: &str = "abcdefghijklmnopqrstuvwxyz";

/// Parsed stack file.
#[derive(Debug, Deserialize)]
pub struct StackFile {
    /// App, stage, and state file.
    #[serde(flatten)]
    pub config: StratumConfig,
    /// Components in construction order.
    #[serde(default)]
    pub components: Vec<ComponentSpec>,
    /// Cloud resources visible to adopt lookups.
    #[serde(default)]
    pub existing: Vec<ExistingResource>,
}

/// One component entry.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentSpec {
    /// A network.
    Vpc(VpcSpec),
    /// A PostgreSQL database.
    Postgres(PostgresSpec),
}

/// Network entry.
#[derive(Debug, Deserialize)]
pub struct VpcSpec {
    /// Component name.
    pub name: String,
    /// Number of zones in the default region.
    pub az_count: Option<usize>,
    /// Explicit zones; wins over `az_count`.
    pub availability_zones: Option<Vec<String>>,
    /// Build the obsolete first-generation network.
    #[serde(default)]
    pub legacy: bool,
    /// Argument patches keyed by resource kind.
    #[serde(default)]
    pub transform: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Database entry.
#[derive(Debug, Deserialize)]
pub struct PostgresSpec {
    /// Component name.
    pub name: String,
    /// Network placement for a new database.
    pub vpc: Option<NetworkSpec>,
    /// Existing instance to adopt instead.
    pub existing: Option<ExistingSpec>,
    /// Engine version.
    pub version: Option<String>,
    /// Instance size.
    pub instance: Option<String>,
    /// Master username.
    pub username: Option<String>,
    /// Master password.
    pub password: Option<String>,
    /// Initial database name.
    pub database: Option<String>,
    /// Maximum storage, `"<n> GB"`.
    pub storage: Option<String>,
    /// Run a standby.
    #[serde(default)]
    pub multi_az: bool,
    /// Number of read replicas.
    pub replicas: Option<u32>,
    /// Argument patches keyed by resource kind.
    #[serde(default)]
    pub transform: BTreeMap<String, BTreeMap<String, Value>>,
}

/// Network reference of a database entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum NetworkSpec {
    /// A vpc component declared earlier in the file.
    Component {
        /// Name of the vpc component.
        component: String,
    },
    /// Explicit subnet ids.
    Subnets {
        /// Subnet ids.
        subnets: Vec<String>,
        /// Security group ids.
        security_groups: Option<Vec<String>>,
    },
}

/// Reference to an existing database.
#[derive(Debug, Deserialize)]
pub struct ExistingSpec {
    /// Instance identifier.
    pub id: String,
    /// Master password, if not stored in a tagged secret.
    pub password: Option<String>,
}

/// Result of composing a stack file.
pub struct Composed {
    /// The component tree.
    pub stack: Stack,
    /// Backend holding the submitted nodes.
    pub backend: Arc<MemoryBackend>,
    /// Link bags of every linkable component.
    pub links: LinkRegistry,
}

impl StackFile {
    /// Reads and parses the stack file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid stack file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read stack file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid stack file {}", path.display()))
    }

    /// Parses stack file YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not a valid stack file.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Where state for this stack lives.
    ///
    /// `override_path` wins; otherwise a relative `state_file` is taken
    /// relative to the directory of the stack file.
    #[must_use]
    pub fn state_path(&self, stack_path: &Path, override_path: Option<&Path>) -> PathBuf {
        if let Some(path) = override_path {
            return path.to_path_buf();
        }
        if self.config.state_file.is_absolute() {
            return self.config.state_file.clone();
        }
        stack_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(&self.config.state_file)
    }

    /// Constructs every component in file order.
    ///
    /// # Errors
    ///
    /// Returns the first construction error, or an error if a database
    /// names a network that is not declared before it.
    pub fn compose(&self) -> anyhow::Result<Composed> {
        let backend = Arc::new(MemoryBackend::with_existing(self.existing.clone()));
        let mut stack = Stack::new(self.config.project.clone(), backend.clone());
        let mut networks: HashMap<&str, NetworkInput> = HashMap::new();
        let mut links = LinkRegistry::new();

        for entry in &self.components {
            match entry {
                ComponentSpec::Vpc(vpc) if vpc.legacy => {
                    let legacy = VpcV1::new(&mut stack, &vpc.name)?;
                    let _ = networks.insert(&vpc.name, legacy.into());
                }
                ComponentSpec::Vpc(vpc) => {
                    let built = Vpc::new(&mut stack, &vpc.name, vpc.args())?;
                    links.register(&built);
                    let _ = networks.insert(&vpc.name, built.into());
                }
                ComponentSpec::Postgres(pg) => {
                    let db = Postgres::new(&mut stack, &pg.name, pg.input(&networks)?)?;
                    links.register(&db);
                }
            }
        }
        tracing::info!(
            app = %self.config.project.app,
            stage = %self.config.project.stage,
            nodes = stack.resource_order().len(),
            "stack composed"
        );
        Ok(Composed {
            stack,
            backend,
            links,
        })
    }
}

impl VpcSpec {
    fn args(&self) -> VpcArgs {
        let availability_zones = self.availability_zones.clone().or_else(|| {
            self.az_count.map(|count| {
                ZONE_LETTERS
                    .chars()
                    .take(count)
                    .map(|letter| format!("{DEFAULT_REGION}{letter}"))
                    .collect()
            })
        });
        VpcArgs {
            availability_zones,
            transform: Transforms::from_patches(self.transform.clone()),
        }
    }
}

impl PostgresSpec {
    fn input(&self, networks: &HashMap<&str, NetworkInput>) -> anyhow::Result<PostgresInput> {
        if let Some(existing) = &self.existing {
            let mut reference = ExistingPostgres::new(&existing.id);
            reference.password.clone_from(&existing.password);
            return Ok(reference.into());
        }
        let network = match &self.vpc {
            None => bail!("postgres `{}` needs either `vpc` or `existing`", self.name),
            Some(NetworkSpec::Component { component }) => {
                networks.get(component.as_str()).cloned().ok_or_else(|| {
                    anyhow!(
                        "postgres `{}` refers to unknown vpc `{component}`; declare it earlier in the file",
                        self.name
                    )
                })?
            }
            Some(NetworkSpec::Subnets {
                subnets,
                security_groups,
            }) => {
                let config = NetworkConfig::from_ids(subnets.iter().cloned());
                let config = match security_groups {
                    Some(groups) => config.with_security_groups(Deferred::of(groups.clone())),
                    None => config,
                };
                NetworkInput::from(config)
            }
        };
        Ok(PostgresArgs {
            version: self.version.clone(),
            instance: self.instance.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            storage: self.storage.clone(),
            multi_az: self.multi_az,
            replicas: self.replicas,
            transform: Transforms::from_patches(self.transform.clone()),
            ..PostgresArgs::new(network)
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use stratum_compose::components::postgres::{INSTANCE, PARAMETER_GROUP};

    use super::*;

    const SHOP: &str = r#"
app: shop
stage: staging
components:
  - type: vpc
    name: Net
    az_count: 3
  - type: postgres
    name: MyDatabase
    vpc: { component: Net }
    replicas: 1
    transform:
      parameter_group:
        parameters:
          - { name: rds.force_ssl, value: "1" }
"#;

    #[test]
    fn parses_and_composes_in_order() {
        let file = StackFile::parse(SHOP).expect("parse");
        assert_eq!(file.config.project.stage, "staging");
        let composed = file.compose().expect("compose");

        let names: Vec<String> = composed.backend.submitted().into_iter().map(|n| n.name).collect();
        assert_eq!(names.first().map(String::as_str), Some("NetVpc"));
        assert_eq!(names.iter().filter(|n| n.starts_with("NetPrivateSubnet")).count(), 3);
        assert_eq!(names.last().map(String::as_str), Some("MyDatabaseReplica0"));
        assert_eq!(composed.links.names().collect::<Vec<_>>(), vec!["MyDatabase", "Net"]);

        let group = composed.backend.submitted_of(&PARAMETER_GROUP).remove(0);
        let params = group.args.get("parameters").and_then(|p| p.as_literal()).expect("literal");
        assert_eq!(params[0]["value"], "1");
    }

    #[test]
    fn legacy_vpc_is_rejected_by_postgres() {
        let yaml = r"
app: shop
components:
  - { type: vpc, name: Old, legacy: true }
  - { type: postgres, name: Db, vpc: { component: Old } }
";
        let err = StackFile::parse(yaml).expect("parse").compose().err().expect("error");
        assert!(err.to_string().contains("migrate"), "got: {err}");
    }

    #[test]
    fn unknown_network_reference_fails() {
        let yaml = r"
app: shop
components:
  - { type: postgres, name: Db, vpc: { component: Missing } }
";
        let err = StackFile::parse(yaml).expect("parse").compose().err().expect("error");
        assert!(err.to_string().contains("`Missing`"), "got: {err}");
    }

    #[test]
    fn existing_entries_feed_adopt() {
        let yaml = r#"
app: shop
components:
  - type: postgres
    name: Orders
    existing: { id: prod-db, password: from-the-vault }
existing:
  - id: prod-db
    kind: "aws:rds/instance:Instance"
    attributes: { endpoint: "prod-db.rds:5432", port: 5432, username: admin, db_name: orders }
"#;
        let composed = StackFile::parse(yaml).expect("parse").compose().expect("compose");
        assert!(composed.backend.submitted_of(&INSTANCE).is_empty());
        assert_eq!(composed.links.names().collect::<Vec<_>>(), vec!["Orders"]);
    }

    #[test]
    fn state_path_is_relative_to_stack_file() {
        let file = StackFile::parse("app: shop").expect("parse");
        let path = file.state_path(Path::new("/work/infra/stratum.yaml"), None);
        assert_eq!(path, PathBuf::from("/work/infra/.stratum/state.json"));
        let forced = file.state_path(Path::new("stratum.yaml"), Some(Path::new("/tmp/s.json")));
        assert_eq!(forced, PathBuf::from("/tmp/s.json"));
    }
}
