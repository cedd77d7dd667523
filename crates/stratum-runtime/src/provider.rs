//! Providers that turn resolved node arguments into live outputs.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};
use stratum_common::error::{Result, StratumError};
use stratum_compose::backend::ResourceNode;

/// Output fields of a materialized node.
pub type Outputs = BTreeMap<String, Value>;

/// Creates cloud resources.
///
/// Implementors receive every argument already resolved; deferred inputs
/// never reach a provider.
pub trait Provider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Creates the resource for `node` and returns its outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the resource cannot be created.
    fn create(&self, node: &ResourceNode, args: &Outputs) -> Result<Outputs>;
}

const RDS_INSTANCE: &str = "aws:rds/instance:Instance";
const RANDOM_PASSWORD: &str = "random:index/randomPassword:RandomPassword";
const POSTGRES_PORT: u16 = 5432;
const DEFAULT_PASSWORD_LEN: usize = 16;

/// Deterministic provider that fabricates plausible outputs.
///
/// Ids and generated secrets are derived from the node URN, so the same
/// graph always materializes to the same state. Every argument is echoed
/// back as an output.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    region: String,
    account: String,
}

impl SimulatedProvider {
    /// Creates a provider for `us-east-1`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            region: "us-east-1".into(),
            account: "000000000000".into(),
        }
    }

    /// Sets the region embedded in endpoints and ARNs.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn create(&self, node: &ResourceNode, args: &Outputs) -> Result<Outputs> {
        let token = node.kind.token();
        let digest = hex_digest(node.urn.as_str());
        let short = &digest[..8];
        let mut outputs = args.clone();

        let id = match token {
            "aws:ec2/vpc:Vpc" => format!("vpc-{short}"),
            "aws:ec2/subnet:Subnet" => format!("subnet-{short}"),
            "aws:ec2/securityGroup:SecurityGroup" => format!("sg-{short}"),
            _ => args
                .get("identifier")
                .or_else(|| args.get("name"))
                .and_then(Value::as_str)
                .map_or_else(|| format!("{}-{short}", node.name.to_lowercase()), ToString::to_string),
        };

        match token {
            RDS_INSTANCE => {
                if !args.contains_key("identifier") {
                    return Err(StratumError::Backend {
                        message: format!("{}: instance identifier is required", node.urn),
                    });
                }
                let address = format!("{id}.{short}.{}.rds.amazonaws.com", self.region);
                let _ = outputs.insert("endpoint".into(), Value::from(format!("{address}:{POSTGRES_PORT}")));
                let _ = outputs.insert("address".into(), Value::from(address));
                let _ = outputs.insert("port".into(), Value::from(POSTGRES_PORT));
            }
            RANDOM_PASSWORD => {
                let length = args
                    .get("length")
                    .and_then(Value::as_u64)
                    .and_then(|n| usize::try_from(n).ok())
                    .unwrap_or(DEFAULT_PASSWORD_LEN)
                    .min(digest.len());
                let _ = outputs.insert("result".into(), Value::from(&digest[digest.len() - length..]));
            }
            _ => {}
        }

        if let Some(service) = token.strip_prefix("aws:").and_then(|t| t.split('/').next()) {
            let _ = outputs.insert(
                "arn".into(),
                Value::from(format!("arn:aws:{service}:{}:{}:{id}", self.region, self.account)),
            );
        }
        let _ = outputs.insert("id".into(), Value::from(id));
        tracing::debug!(provider = self.name(), urn = %node.urn, "resource created");
        Ok(outputs)
    }
}

fn hex_digest(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
