//! Virtual network components.
//!
//! [`Vpc`] is the current network component. [`VpcV1`] is the obsolete
//! version; it still builds a network, but components that take a network
//! input refuse it and ask for a migration.

use serde_json::json;
use stratum_common::error::{Result, StratumError};
use stratum_common::types::{ComponentPath, ResourceKind};

use crate::args::{Input, ResourceArgs};
use crate::backend::ResourceHandle;
use crate::component::Component;
use crate::deferred::Deferred;
use crate::link::{LinkProperties, Linkable};
use crate::stack::{ComponentScope, Stack};
use crate::transform::Transforms;

/// Component type token of [`Vpc`].
pub const TYPE: &str = "stratum:aws:Vpc";

/// Component type token of [`VpcV1`].
pub const LEGACY_TYPE: &str = "stratum:aws:VpcV1";

/// The network itself.
pub const VPC: ResourceKind = ResourceKind::new(
    "vpc",
    "aws:ec2/vpc:Vpc",
    &["cidr_block", "enable_dns_hostnames", "enable_dns_support", "tags"],
);

/// One private subnet per availability zone.
pub const PRIVATE_SUBNET: ResourceKind = ResourceKind::new(
    "private_subnet",
    "aws:ec2/subnet:Subnet",
    &["vpc_id", "cidr_block", "availability_zone", "map_public_ip_on_launch", "tags"],
);

/// Security group admitting traffic from inside the network.
pub const SECURITY_GROUP: ResourceKind = ResourceKind::new(
    "security_group",
    "aws:ec2/securityGroup:SecurityGroup",
    &["vpc_id", "description", "ingress", "egress", "tags"],
);

/// Zones used when none are given.
pub const DEFAULT_AVAILABILITY_ZONES: [&str; 2] = ["us-east-1a", "us-east-1b"];

const MAX_AVAILABILITY_ZONES: usize = 6;
const CIDR_BLOCK: &str = "10.0.0.0/16";

/// Arguments of [`Vpc`].
#[derive(Debug, Clone, Default)]
pub struct VpcArgs {
    /// Zones to place private subnets in.
    pub availability_zones: Option<Vec<String>>,
    /// Per-kind overrides.
    pub transform: Transforms,
}

/// A network with private subnets and a shared security group.
#[derive(Debug, Clone)]
pub struct Vpc {
    path: ComponentPath,
    id: Deferred<String>,
    private_subnets: Deferred<Vec<String>>,
    security_groups: Deferred<Vec<String>>,
}

impl Vpc {
    /// Creates a root-level network.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the name is taken.
    pub fn new(stack: &mut Stack, name: &str, args: VpcArgs) -> Result<Self> {
        Self::new_in(stack, &ComponentPath::root(), name, args)
    }

    /// Creates a network owned by `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are invalid or the name is taken.
    pub fn new_in(
        stack: &mut Stack,
        parent: &ComponentPath,
        name: &str,
        args: VpcArgs,
    ) -> Result<Self> {
        let zones = normalize_zones(name, args.availability_zones.as_deref())?;
        let mut scope = stack.begin(
            parent,
            TYPE,
            name,
            &[VPC, PRIVATE_SUBNET, SECURITY_GROUP],
            &args.transform,
        )?;
        let (vpc, subnets) = build_network(&mut scope, name, &zones)?;
        let security_group = scope.resource(
            SECURITY_GROUP,
            format!("{name}SecurityGroup"),
            ResourceArgs::new()
                .with("vpc_id", vpc.output::<String>("id"))
                .with("description", format!("Managed by {}", scope.project().app))
                .with(
                    "ingress",
                    json!([{ "protocol": "-1", "from_port": 0, "to_port": 0, "cidr_blocks": [CIDR_BLOCK] }]),
                )
                .with(
                    "egress",
                    json!([{ "protocol": "-1", "from_port": 0, "to_port": 0, "cidr_blocks": ["0.0.0.0/0"] }]),
                ),
        )?;
        let record = scope.finish()?;

        Ok(Self {
            path: record.path,
            id: vpc.output("id"),
            private_subnets: subnet_ids(&subnets),
            security_groups: security_group.output::<String>("id").map(|id| vec![id]),
        })
    }

    /// The network id.
    #[must_use]
    pub const fn id(&self) -> &Deferred<String> {
        &self.id
    }

    /// Ids of the private subnets, in zone order.
    #[must_use]
    pub const fn private_subnets(&self) -> &Deferred<Vec<String>> {
        &self.private_subnets
    }

    /// Ids of the security groups resources in this network should join.
    #[must_use]
    pub const fn security_groups(&self) -> &Deferred<Vec<String>> {
        &self.security_groups
    }
}

impl Component for Vpc {
    fn type_token(&self) -> &'static str {
        TYPE
    }

    fn path(&self) -> &ComponentPath {
        &self.path
    }

    fn outputs(&self) -> Vec<(&'static str, Input)> {
        vec![
            ("id", self.id.clone().into()),
            ("private_subnets", self.private_subnets.clone().into()),
            ("security_groups", self.security_groups.clone().into()),
        ]
    }
}

impl Linkable for Vpc {
    fn link(&self) -> LinkProperties {
        LinkProperties::new()
            .with("id", self.id.clone())
            .with("private_subnets", self.private_subnets.clone())
    }
}

/// The first-generation network component, kept only so that its handles
/// can be recognized and rejected with a migration hint.
#[derive(Debug, Clone)]
pub struct VpcV1 {
    path: ComponentPath,
    id: Deferred<String>,
    private_subnets: Deferred<Vec<String>>,
}

impl VpcV1 {
    /// Creates a root-level first-generation network.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken.
    pub fn new(stack: &mut Stack, name: &str) -> Result<Self> {
        let zones: Vec<String> = DEFAULT_AVAILABILITY_ZONES.iter().map(ToString::to_string).collect();
        let mut scope = stack.begin(
            &ComponentPath::root(),
            LEGACY_TYPE,
            name,
            &[VPC, PRIVATE_SUBNET],
            &Transforms::new(),
        )?;
        let (vpc, subnets) = build_network(&mut scope, name, &zones)?;
        let record = scope.finish()?;
        Ok(Self {
            path: record.path,
            id: vpc.output("id"),
            private_subnets: subnet_ids(&subnets),
        })
    }
}

impl Component for VpcV1 {
    fn type_token(&self) -> &'static str {
        LEGACY_TYPE
    }

    fn path(&self) -> &ComponentPath {
        &self.path
    }

    fn outputs(&self) -> Vec<(&'static str, Input)> {
        vec![
            ("id", self.id.clone().into()),
            ("private_subnets", self.private_subnets.clone().into()),
        ]
    }
}

fn normalize_zones(component: &str, zones: Option<&[String]>) -> Result<Vec<String>> {
    let zones: Vec<String> = match zones {
        None => DEFAULT_AVAILABILITY_ZONES.iter().map(ToString::to_string).collect(),
        Some(zones) => zones.to_vec(),
    };
    if zones.is_empty() || zones.len() > MAX_AVAILABILITY_ZONES {
        return Err(StratumError::config(
            component,
            "availability_zones",
            format!("expected 1 to {MAX_AVAILABILITY_ZONES} zones, got {}", zones.len()),
            "list the availability zones to place subnets in, e.g. [\"us-east-1a\"]",
        ));
    }
    if let Some(blank) = zones.iter().position(|z| z.trim().is_empty()) {
        return Err(StratumError::config(
            component,
            "availability_zones",
            format!("zone #{blank} is empty"),
            "remove the empty entry",
        ));
    }
    Ok(zones)
}

fn build_network(
    scope: &mut ComponentScope<'_>,
    name: &str,
    zones: &[String],
) -> Result<(ResourceHandle, Vec<ResourceHandle>)> {
    let vpc = scope.resource(
        VPC,
        format!("{name}Vpc"),
        ResourceArgs::new()
            .with("cidr_block", CIDR_BLOCK)
            .with("enable_dns_hostnames", true)
            .with("enable_dns_support", true),
    )?;
    let vpc_id: Deferred<String> = vpc.output("id");
    let mut subnets = Vec::with_capacity(zones.len());
    for (i, zone) in zones.iter().enumerate() {
        subnets.push(scope.resource(
            PRIVATE_SUBNET,
            format!("{name}PrivateSubnet{}", i + 1),
            ResourceArgs::new()
                .with("vpc_id", vpc_id.clone())
                .with("cidr_block", format!("10.0.{}.0/24", i + 1))
                .with("availability_zone", zone.as_str())
                .with("map_public_ip_on_launch", false),
        )?);
    }
    Ok((vpc, subnets))
}

fn subnet_ids(subnets: &[ResourceHandle]) -> Deferred<Vec<String>> {
    Deferred::combine(subnets.iter().map(|s| s.output::<String>("id")))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stratum_common::config::ProjectContext;

    use super::*;
    use crate::backend::memory::MemoryBackend;

    fn stack() -> (Arc<MemoryBackend>, Stack) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), Stack::new(ProjectContext::new("shop", "dev"), backend))
    }

    #[test]
    fn builds_vpc_subnets_and_security_group() {
        let (backend, mut stack) = stack();
        let vpc = Vpc::new(&mut stack, "Net", VpcArgs::default()).expect("vpc");
        let names: Vec<String> = backend.submitted().into_iter().map(|n| n.name).collect();
        assert_eq!(
            names,
            vec!["NetVpc", "NetPrivateSubnet1", "NetPrivateSubnet2", "NetSecurityGroup"]
        );
        assert_eq!(vpc.private_subnets().producers().len(), 2);
        assert_eq!(vpc.name(), "Net");
        assert_eq!(vpc.link().keys().collect::<Vec<_>>(), vec!["id", "private_subnets"]);
    }

    #[test]
    fn rejects_empty_zone_list() {
        let (backend, mut stack) = stack();
        let args = VpcArgs {
            availability_zones: Some(Vec::new()),
            ..VpcArgs::default()
        };
        let err = Vpc::new(&mut stack, "Net", args).unwrap_err();
        assert!(err.to_string().contains("availability_zones"), "got: {err}");
        assert!(backend.submitted().is_empty());
    }

    #[test]
    fn legacy_vpc_still_builds() {
        let (backend, mut stack) = stack();
        let legacy = VpcV1::new(&mut stack, "Old").expect("legacy");
        assert_eq!(legacy.type_token(), LEGACY_TYPE);
        assert_eq!(backend.submitted().len(), 3);
    }
}
