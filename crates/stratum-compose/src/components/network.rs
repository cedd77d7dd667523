//! Network inputs accepted by components that live inside a VPC.

use stratum_common::error::{Result, StratumError};

use super::vpc::{Vpc, VpcV1};
use crate::deferred::Deferred;

/// Where a component should place its resources.
#[derive(Debug, Clone)]
pub enum NetworkInput {
    /// A network built by this app.
    Vpc(Vpc),
    /// Explicit subnet and security group ids.
    Config(NetworkConfig),
    /// A first-generation network; always rejected.
    Obsolete(VpcV1),
}

impl From<Vpc> for NetworkInput {
    fn from(vpc: Vpc) -> Self {
        Self::Vpc(vpc)
    }
}

impl From<&Vpc> for NetworkInput {
    fn from(vpc: &Vpc) -> Self {
        Self::Vpc(vpc.clone())
    }
}

impl From<NetworkConfig> for NetworkInput {
    fn from(config: NetworkConfig) -> Self {
        Self::Config(config)
    }
}

impl From<VpcV1> for NetworkInput {
    fn from(vpc: VpcV1) -> Self {
        Self::Obsolete(vpc)
    }
}

/// Normalized network placement.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Subnets to place resources in.
    pub subnets: Deferred<Vec<String>>,
    /// Security groups to attach, if any.
    pub security_groups: Option<Deferred<Vec<String>>>,
}

impl NetworkConfig {
    /// Places resources in `subnets` without extra security groups.
    #[must_use]
    pub const fn new(subnets: Deferred<Vec<String>>) -> Self {
        Self {
            subnets,
            security_groups: None,
        }
    }

    /// Places resources in the subnets with the given ids.
    #[must_use]
    pub fn from_ids<I, S>(subnets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Deferred::of(subnets.into_iter().map(Into::into).collect()))
    }

    /// Attaches `groups`.
    #[must_use]
    pub fn with_security_groups(mut self, groups: Deferred<Vec<String>>) -> Self {
        self.security_groups = Some(groups);
        self
    }
}

/// Reduces any accepted network input to a [`NetworkConfig`].
///
/// # Errors
///
/// Returns a configuration error for a first-generation network, or for
/// a subnet list that is known to be empty or to hold a blank id.
pub fn normalize(component: &str, input: &NetworkInput) -> Result<NetworkConfig> {
    let config = match input {
        NetworkInput::Vpc(vpc) => NetworkConfig::new(vpc.private_subnets().clone())
            .with_security_groups(vpc.security_groups().clone()),
        NetworkInput::Config(config) => config.clone(),
        NetworkInput::Obsolete(_) => {
            return Err(StratumError::config(
                component,
                "vpc",
                "this network was created by an obsolete version of the Vpc component",
                "migrate to the latest Vpc component",
            ));
        }
    };
    if let Some(Ok(subnets)) = config.subnets.peek() {
        if subnets.is_empty() {
            return Err(StratumError::config(
                component,
                "vpc",
                "no subnets were given",
                "pass a Vpc component or at least one subnet id",
            ));
        }
        if subnets.iter().any(|s| s.trim().is_empty()) {
            return Err(StratumError::config(
                component,
                "vpc",
                "a subnet id is empty",
                "remove the empty subnet id",
            ));
        }
    }
    Ok(config)
}
