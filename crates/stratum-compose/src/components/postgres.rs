//! Managed PostgreSQL database.
//!
//! A created database is four nodes, in dependency order: a subnet group
//! placing it in the network, a parameter group, a generated password and
//! the instance itself. Read replicas are added only when requested. An
//! adopted database creates nothing and binds its accessors to the live
//! instance instead.

use serde_json::json;
use stratum_common::constants::INSTANCE_REF_TAG;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::{ComponentPath, ResourceKind};

use super::network::{self, NetworkConfig, NetworkInput};
use crate::adopt::{self, Provision, ProvisionMode, ReferenceHandle};
use crate::args::{Input, ResourceArgs};
use crate::backend::LookupFilter;
use crate::component::Component;
use crate::deferred::Deferred;
use crate::link::{LinkProperties, Linkable};
use crate::stack::{ComponentScope, Stack};
use crate::transform::Transforms;

/// Component type token of [`Postgres`].
pub const TYPE: &str = "stratum:aws:Postgres";

/// Subnet group placing the instance in the network.
pub const SUBNET_GROUP: ResourceKind = ResourceKind::new(
    "subnet_group",
    "aws:rds/subnetGroup:SubnetGroup",
    &["name", "subnet_ids", "description", "tags"],
);

/// Engine parameters.
pub const PARAMETER_GROUP: ResourceKind = ResourceKind::new(
    "parameter_group",
    "aws:rds/parameterGroup:ParameterGroup",
    &["name", "family", "parameters", "description", "tags"],
);

/// Generated master password.
pub const PASSWORD: ResourceKind = ResourceKind::new(
    "password",
    "random:index/randomPassword:RandomPassword",
    &["length", "special", "keepers"],
);

/// The primary instance.
pub const INSTANCE: ResourceKind = ResourceKind::new(
    "instance",
    "aws:rds/instance:Instance",
    &[
        "identifier",
        "db_name",
        "engine",
        "engine_version",
        "instance_class",
        "username",
        "password",
        "db_subnet_group_name",
        "parameter_group_name",
        "vpc_security_group_ids",
        "allocated_storage",
        "max_allocated_storage",
        "storage_type",
        "storage_encrypted",
        "multi_az",
        "backup_retention_period",
        "performance_insights_enabled",
        "skip_final_snapshot",
        "tags",
    ],
);

/// A read replica of the primary instance.
pub const REPLICA: ResourceKind = ResourceKind::new(
    "replica",
    "aws:rds/instance:Instance",
    &[
        "identifier",
        "replicate_source_db",
        "instance_class",
        "parameter_group_name",
        "vpc_security_group_ids",
        "storage_encrypted",
        "performance_insights_enabled",
        "skip_final_snapshot",
        "tags",
    ],
);

/// Credential secret of an existing instance; only ever looked up.
pub const SECRET: ResourceKind = ResourceKind::new(
    "secret",
    "aws:secretsmanager/secret:Secret",
    &[],
);

const KINDS: [ResourceKind; 5] = [SUBNET_GROUP, PARAMETER_GROUP, PASSWORD, INSTANCE, REPLICA];

const DEFAULT_VERSION: &str = "16.4";
const DEFAULT_INSTANCE: &str = "t4g.micro";
const DEFAULT_USERNAME: &str = "postgres";
const DEFAULT_STORAGE: &str = "20 GB";
const MIN_STORAGE_GB: u32 = 20;
const MAX_STORAGE_GB: u32 = 65536;
const MIN_PASSWORD_LEN: usize = 8;
const GENERATED_PASSWORD_LEN: u32 = 32;
const BACKUP_RETENTION_DAYS: u32 = 7;
const IDENTIFIER_MAX_LEN: usize = 63;

/// Arguments for creating a new database.
#[derive(Debug, Clone)]
pub struct PostgresArgs {
    /// Network to place the database in.
    pub vpc: NetworkInput,
    /// Engine version, `major.minor`.
    pub version: Option<String>,
    /// Instance size without the `db.` prefix, e.g. `t4g.micro`.
    pub instance: Option<String>,
    /// Master username.
    pub username: Option<String>,
    /// Master password; generated when absent.
    pub password: Option<String>,
    /// Name of the initial database.
    pub database: Option<String>,
    /// Maximum storage, `"<n> GB"`.
    pub storage: Option<String>,
    /// Run a standby in a second zone.
    pub multi_az: bool,
    /// Number of read replicas.
    pub replicas: Option<u32>,
    /// Per-kind overrides.
    pub transform: Transforms,
}

impl PostgresArgs {
    /// Creates arguments with every setting at its default.
    #[must_use]
    pub fn new(vpc: impl Into<NetworkInput>) -> Self {
        Self {
            vpc: vpc.into(),
            version: None,
            instance: None,
            username: None,
            password: None,
            database: None,
            storage: None,
            multi_az: false,
            replicas: None,
            transform: Transforms::new(),
        }
    }

    /// Sets the engine version.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the instance size.
    #[must_use]
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    /// Sets the master username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the master password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the initial database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Sets the maximum storage.
    #[must_use]
    pub fn storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = Some(storage.into());
        self
    }

    /// Enables or disables the standby.
    #[must_use]
    pub const fn multi_az(mut self, enabled: bool) -> Self {
        self.multi_az = enabled;
        self
    }

    /// Requests `count` read replicas.
    #[must_use]
    pub const fn replicas(mut self, count: u32) -> Self {
        self.replicas = Some(count);
        self
    }

    /// Sets the per-kind overrides.
    #[must_use]
    pub fn transform(mut self, transform: Transforms) -> Self {
        self.transform = transform;
        self
    }
}

/// Reference to a database that already exists.
#[derive(Debug, Clone)]
pub struct ExistingPostgres {
    /// Identifier of the instance.
    pub handle: ReferenceHandle,
    /// Master password; read from the tagged secret when absent.
    pub password: Option<String>,
}

impl ExistingPostgres {
    /// Refers to the instance with identifier `id`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            handle: ReferenceHandle::new(id),
            password: None,
        }
    }

    /// Supplies the master password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

/// Input of [`Postgres::new`].
pub type PostgresInput = Provision<PostgresArgs, ExistingPostgres>;

impl From<PostgresArgs> for PostgresInput {
    fn from(args: PostgresArgs) -> Self {
        Self::Create(args)
    }
}

impl From<ExistingPostgres> for PostgresInput {
    fn from(existing: ExistingPostgres) -> Self {
        Self::Adopt(existing)
    }
}

/// A managed PostgreSQL database.
#[derive(Debug, Clone)]
pub struct Postgres {
    path: ComponentPath,
    mode: ProvisionMode,
    id: Deferred<String>,
    host: Deferred<String>,
    port: Deferred<u16>,
    username: Deferred<String>,
    password: Deferred<String>,
    database: Deferred<String>,
    replica_hosts: Vec<Deferred<String>>,
}

impl Postgres {
    /// Creates or adopts a root-level database.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid or obsolete arguments or
    /// an unmatched reference, an override error for an invalid transform,
    /// or an error if the name is taken. Nothing is submitted on error.
    pub fn new(stack: &mut Stack, name: &str, input: impl Into<PostgresInput>) -> Result<Self> {
        Self::new_in(stack, &ComponentPath::root(), name, input)
    }

    /// Creates or adopts a database owned by `parent`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn new_in(
        stack: &mut Stack,
        parent: &ComponentPath,
        name: &str,
        input: impl Into<PostgresInput>,
    ) -> Result<Self> {
        match input.into() {
            Provision::Create(args) => Self::create(stack, parent, name, &args),
            Provision::Adopt(existing) => Self::adopt(stack, parent, name, existing),
        }
    }

    /// Adopts the existing instance `id` under the name `name`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no such instance exists or its
    /// password cannot be found.
    pub fn get(stack: &mut Stack, name: &str, id: impl Into<String>) -> Result<Self> {
        Self::new(stack, name, ExistingPostgres::new(id))
    }

    fn create(
        stack: &mut Stack,
        parent: &ComponentPath,
        name: &str,
        args: &PostgresArgs,
    ) -> Result<Self> {
        let network = network::normalize(name, &args.vpc)?;
        let settings = Settings::from_args(name, &stack.project().app, args)?;
        let mut scope = stack.begin(parent, TYPE, name, &KINDS, &args.transform)?;
        let postgres = build(&mut scope, name, &settings, &network, args.password.as_deref())?;
        let _ = scope.finish()?;
        Ok(postgres)
    }

    fn adopt(
        stack: &mut Stack,
        parent: &ComponentPath,
        name: &str,
        existing: ExistingPostgres,
    ) -> Result<Self> {
        let mut scope = stack.begin(parent, TYPE, name, &KINDS, &Transforms::new())?;
        scope.set_mode(ProvisionMode::Adopt);
        let instance = adopt::resolve_existing(
            &scope,
            &INSTANCE,
            "id",
            &LookupFilter::identifier(existing.handle.id()),
        )?;
        let password = match existing.password {
            Some(password) => Deferred::of(password),
            None => adopt::find_existing(&scope, &SECRET, &LookupFilter::tag(INSTANCE_REF_TAG, instance.id()))?
                .ok_or_else(|| {
                    StratumError::config(
                        name,
                        "password",
                        format!("no credential secret is tagged for instance \"{}\"", instance.id()),
                        format!("pass the password explicitly or tag its secret with `{INSTANCE_REF_TAG}`"),
                    )
                })?
                .field("password")?,
        };
        let endpoint: Deferred<String> = instance.field("endpoint")?;
        let port = instance.field("port")?;
        let username = instance.field("username")?;
        let database = instance.field("db_name")?;
        let id = Deferred::of(instance.id().to_string());
        let record = scope.finish()?;

        Ok(Self {
            path: record.path,
            mode: ProvisionMode::Adopt,
            id,
            host: host_of(&endpoint),
            port,
            username,
            password,
            database,
            replica_hosts: Vec::new(),
        })
    }

    /// Whether the database was created or adopted.
    #[must_use]
    pub const fn mode(&self) -> ProvisionMode {
        self.mode
    }

    /// The instance identifier.
    #[must_use]
    pub const fn id(&self) -> &Deferred<String> {
        &self.id
    }

    /// Host name of the primary, without the port.
    #[must_use]
    pub const fn host(&self) -> &Deferred<String> {
        &self.host
    }

    /// Port the primary listens on.
    #[must_use]
    pub const fn port(&self) -> &Deferred<u16> {
        &self.port
    }

    /// Master username.
    #[must_use]
    pub const fn username(&self) -> &Deferred<String> {
        &self.username
    }

    /// Master password.
    #[must_use]
    pub const fn password(&self) -> &Deferred<String> {
        &self.password
    }

    /// Name of the initial database.
    #[must_use]
    pub const fn database(&self) -> &Deferred<String> {
        &self.database
    }

    /// Host names of the read replicas, in index order.
    #[must_use]
    pub fn replica_hosts(&self) -> &[Deferred<String>] {
        &self.replica_hosts
    }
}

impl Component for Postgres {
    fn type_token(&self) -> &'static str {
        TYPE
    }

    fn path(&self) -> &ComponentPath {
        &self.path
    }

    fn outputs(&self) -> Vec<(&'static str, Input)> {
        vec![
            ("id", self.id.clone().into()),
            ("host", self.host.clone().into()),
            ("port", self.port.clone().into()),
            ("username", self.username.clone().into()),
            ("password", self.password.clone().into()),
            ("database", self.database.clone().into()),
            ("replica_hosts", Deferred::combine(self.replica_hosts.iter().cloned()).into()),
        ]
    }
}

impl Linkable for Postgres {
    fn link(&self) -> LinkProperties {
        LinkProperties::new()
            .with("database", self.database.clone())
            .with("username", self.username.clone())
            .with("password", self.password.clone())
            .with("port", self.port.clone())
            .with("host", self.host.clone())
    }
}

/// Validated creation settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    engine_version: String,
    family: String,
    instance_class: String,
    username: String,
    database: String,
    storage_gb: u32,
    multi_az: bool,
    replicas: u32,
}

impl Settings {
    fn from_args(component: &str, app: &str, args: &PostgresArgs) -> Result<Self> {
        let version = args.version.as_deref().unwrap_or(DEFAULT_VERSION);
        let major = version
            .split('.')
            .next()
            .and_then(|major| major.parse::<u32>().ok())
            .ok_or_else(|| {
                StratumError::config(
                    component,
                    "version",
                    format!("`{version}` is not a PostgreSQL version"),
                    format!("use a version such as \"{DEFAULT_VERSION}\""),
                )
            })?;

        let instance = args.instance.as_deref().unwrap_or(DEFAULT_INSTANCE).trim();
        if instance.is_empty() {
            return Err(StratumError::config(
                component,
                "instance",
                "instance size is empty",
                format!("use a size such as \"{DEFAULT_INSTANCE}\""),
            ));
        }
        let instance_class = if instance.starts_with("db.") {
            instance.to_string()
        } else {
            format!("db.{instance}")
        };

        let username = args.username.as_deref().unwrap_or(DEFAULT_USERNAME);
        if username.trim().is_empty() {
            return Err(StratumError::config(
                component,
                "username",
                "username is empty",
                format!("omit it to use \"{DEFAULT_USERNAME}\""),
            ));
        }
        if let Some(password) = &args.password {
            if password.len() < MIN_PASSWORD_LEN {
                return Err(StratumError::config(
                    component,
                    "password",
                    format!("password must be at least {MIN_PASSWORD_LEN} characters"),
                    "use a longer password or omit it to generate one",
                ));
            }
        }

        Ok(Self {
            engine_version: version.to_string(),
            family: format!("postgres{major}"),
            instance_class,
            username: username.to_string(),
            database: args
                .database
                .clone()
                .unwrap_or_else(|| app.replace('-', "_")),
            storage_gb: parse_storage(component, args.storage.as_deref().unwrap_or(DEFAULT_STORAGE))?,
            multi_az: args.multi_az,
            replicas: args.replicas.unwrap_or(0),
        })
    }
}

fn parse_storage(component: &str, storage: &str) -> Result<u32> {
    let invalid = || {
        StratumError::config(
            component,
            "storage",
            format!("`{storage}` is not a storage size"),
            format!("use \"<n> GB\" with {MIN_STORAGE_GB} <= n <= {MAX_STORAGE_GB}"),
        )
    };
    let size = storage
        .trim()
        .strip_suffix("GB")
        .and_then(|n| n.trim().parse::<u32>().ok())
        .ok_or_else(invalid)?;
    if (MIN_STORAGE_GB..=MAX_STORAGE_GB).contains(&size) {
        Ok(size)
    } else {
        Err(invalid())
    }
}

fn build(
    scope: &mut ComponentScope<'_>,
    name: &str,
    settings: &Settings,
    network: &NetworkConfig,
    password: Option<&str>,
) -> Result<Postgres> {
    let identifier = scope
        .project()
        .scoped_physical_name(scope.path(), name, IDENTIFIER_MAX_LEN);

    let subnet_group = scope.resource(
        SUBNET_GROUP,
        format!("{name}SubnetGroup"),
        ResourceArgs::new()
            .with("name", identifier.as_str())
            .with("subnet_ids", network.subnets.clone()),
    )?;
    let parameter_group = scope.resource(
        PARAMETER_GROUP,
        format!("{name}ParameterGroup"),
        ResourceArgs::new()
            .with("name", identifier.as_str())
            .with("family", settings.family.as_str())
            .with(
                "parameters",
                json!([
                    { "name": "rds.force_ssl", "value": "0" },
                    { "name": "rds.logical_replication", "value": "1", "apply_method": "pending-reboot" },
                ]),
            ),
    )?;
    let password: Deferred<String> = match password {
        Some(password) => Deferred::of(password.to_string()),
        None => scope
            .resource(
                PASSWORD,
                format!("{name}Password"),
                ResourceArgs::new()
                    .with("length", GENERATED_PASSWORD_LEN)
                    .with("special", false),
            )?
            .output("result"),
    };

    let subnet_group_name: Deferred<String> = subnet_group.output("name");
    let parameter_group_name: Deferred<String> = parameter_group.output("name");
    let mut instance_args = ResourceArgs::new()
        .with("identifier", identifier.as_str())
        .with("db_name", settings.database.as_str())
        .with("engine", "postgres")
        .with("engine_version", settings.engine_version.as_str())
        .with("instance_class", settings.instance_class.as_str())
        .with("username", settings.username.as_str())
        .with("password", password.clone())
        .with("db_subnet_group_name", subnet_group_name)
        .with("parameter_group_name", parameter_group_name.clone())
        .with("allocated_storage", MIN_STORAGE_GB)
        .with("max_allocated_storage", settings.storage_gb)
        .with("storage_type", "gp3")
        .with("storage_encrypted", true)
        .with("multi_az", settings.multi_az)
        .with("backup_retention_period", BACKUP_RETENTION_DAYS)
        .with("performance_insights_enabled", true)
        .with("skip_final_snapshot", true);
    if let Some(groups) = &network.security_groups {
        let _ = instance_args.set("vpc_security_group_ids", groups.clone());
    }
    let instance = scope.resource(INSTANCE, format!("{name}Instance"), instance_args)?;

    let source: Deferred<String> = instance.output("identifier");
    let mut replica_hosts = Vec::new();
    for i in 0..settings.replicas {
        let replica_name = format!("{name}Replica{i}");
        let mut replica_args = ResourceArgs::new()
            .with(
                "identifier",
                scope
                    .project()
                    .scoped_physical_name(scope.path(), &replica_name, IDENTIFIER_MAX_LEN),
            )
            .with("replicate_source_db", source.clone())
            .with("instance_class", settings.instance_class.as_str())
            .with("parameter_group_name", parameter_group_name.clone())
            .with("storage_encrypted", true)
            .with("performance_insights_enabled", true)
            .with("skip_final_snapshot", true);
        if let Some(groups) = &network.security_groups {
            let _ = replica_args.set("vpc_security_group_ids", groups.clone());
        }
        let replica = scope.resource(REPLICA, replica_name, replica_args)?;
        replica_hosts.push(host_of(&replica.output("endpoint")));
    }

    Ok(Postgres {
        path: scope.path().clone(),
        mode: ProvisionMode::Create,
        id: source,
        host: host_of(&instance.output("endpoint")),
        port: instance.output("port"),
        username: instance.output("username"),
        password,
        database: instance.output("db_name"),
        replica_hosts,
    })
}

/// Strips the port from an `host:port` endpoint.
fn host_of(endpoint: &Deferred<String>) -> Deferred<String> {
    endpoint.map(|endpoint| endpoint.split(':').next().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> PostgresArgs {
        PostgresArgs::new(NetworkConfig::from_ids(["subnet-a", "subnet-b"]))
    }

    #[test]
    fn defaults_are_applied() {
        let settings = Settings::from_args("Db", "my-shop", &args()).expect("settings");
        assert_eq!(settings.engine_version, "16.4");
        assert_eq!(settings.family, "postgres16");
        assert_eq!(settings.instance_class, "db.t4g.micro");
        assert_eq!(settings.username, "postgres");
        assert_eq!(settings.database, "my_shop");
        assert_eq!(settings.storage_gb, 20);
        assert_eq!(settings.replicas, 0);
    }

    #[test]
    fn explicit_settings_win() {
        let settings = Settings::from_args(
            "Db",
            "shop",
            &args()
                .version("15.7")
                .instance("db.r6g.large")
                .database("orders")
                .storage("100 GB")
                .replicas(2),
        )
        .expect("settings");
        assert_eq!(settings.family, "postgres15");
        assert_eq!(settings.instance_class, "db.r6g.large");
        assert_eq!(settings.database, "orders");
        assert_eq!(settings.storage_gb, 100);
        assert_eq!(settings.replicas, 2);
    }

    #[test]
    fn storage_must_be_in_range() {
        assert_eq!(parse_storage("Db", "65536 GB").expect("max"), 65536);
        assert_eq!(parse_storage("Db", "30GB").expect("compact"), 30);
        for bad in ["19 GB", "65537 GB", "20", "twenty GB", "20 TB"] {
            let err = parse_storage("Db", bad).unwrap_err();
            assert!(err.to_string().contains("storage"), "{bad}: {err}");
        }
    }

    #[test]
    fn version_must_start_with_a_major() {
        let err = Settings::from_args("Db", "shop", &args().version("latest")).unwrap_err();
        assert!(err.to_string().contains("`latest`"), "got: {err}");
    }

    #[test]
    fn short_password_is_rejected() {
        let err = Settings::from_args("Db", "shop", &args().password("short")).unwrap_err();
        assert!(err.to_string().contains("password"), "got: {err}");
    }

    #[test]
    fn host_drops_the_port() {
        let endpoint = Deferred::of("db.example.internal:5432".to_string());
        let resolved = host_of(&endpoint).poll(&crate::deferred::OutputTable::new());
        assert_eq!(resolved.ready().as_deref(), Some("db.example.internal"));
    }
}
