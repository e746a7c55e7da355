use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::binance::NodeConfig;
use crate::error::DomainError;
use crate::server::ServerId;

// ── DeploymentId ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(pub String);

impl DeploymentId {
    pub fn new(s: impl Into<String>) -> Self {
        DeploymentId(s.into())
    }

    pub fn generate() -> Self {
        DeploymentId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── DeploymentState ───────────────────────────────────────────────────────────

/// Lifecycle state of a deployment.
///
/// Transitions: Requested → Ok (deployment provisioner), any → Deleted when
/// the owning server is destroyed. Ok and Deleted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentState {
    Requested,
    Ok,
    Deleted,
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeploymentState::Requested => "requested",
            DeploymentState::Ok => "ok",
            DeploymentState::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DeploymentState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(DeploymentState::Requested),
            "ok" => Ok(DeploymentState::Ok),
            "deleted" => Ok(DeploymentState::Deleted),
            other => Err(DomainError::UnknownDeploymentState(other.to_string())),
        }
    }
}

// ── DeploymentType ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentType {
    BinanceNode,
}

impl std::fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentType::BinanceNode => write!(f, "binance_node"),
        }
    }
}

impl FromStr for DeploymentType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binance_node" => Ok(DeploymentType::BinanceNode),
            other => Err(DomainError::UnknownDeploymentType(other.to_string())),
        }
    }
}

// ── DeploymentConfig ──────────────────────────────────────────────────────────

/// Typed per-deployment-type configuration.
///
/// Serialised as a flat string map in storage and on the wire to the
/// configuration driver; the set of cases is closed, so dispatch is a plain
/// match rather than a runtime registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentConfig {
    BinanceNode(NodeConfig),
}

impl DeploymentConfig {
    pub fn deployment_type(&self) -> DeploymentType {
        match self {
            DeploymentConfig::BinanceNode(_) => DeploymentType::BinanceNode,
        }
    }

    /// Flatten into the string map handed to the configuration driver and
    /// stored in the configuration column.
    pub fn marshal_map(&self) -> BTreeMap<String, String> {
        match self {
            DeploymentConfig::BinanceNode(config) => config.marshal_map(),
        }
    }

    /// Parse a flat map back into the typed configuration for the given
    /// deployment type.
    pub fn parse(
        ty: DeploymentType,
        raw: &BTreeMap<String, String>,
    ) -> Result<Self, DomainError> {
        match ty {
            DeploymentType::BinanceNode => Ok(DeploymentConfig::BinanceNode(NodeConfig::parse(raw)?)),
        }
    }

    /// Probe to determine whether the deployed software answers on its
    /// provisioned server.
    pub fn health_check(&self, ip: IpAddr) -> HealthCheck {
        match self {
            DeploymentConfig::BinanceNode(config) => config.health_check(ip),
        }
    }
}

// ── HealthCheck ───────────────────────────────────────────────────────────────

/// An HTTP probe describing how to verify a deployment is serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    pub method: String,
    pub url: String,
    pub expected_status: u16,
}

// ── Deployment ────────────────────────────────────────────────────────────────

/// A piece of software to be configured on a particular server.
///
/// Its lifecycle is bound to the server: destroying the server deletes all of
/// its deployments in the same transaction.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub id: DeploymentId,
    /// Set when the deployment is attached to a server; a deployment never
    /// reaches storage without one.
    pub server_id: Option<ServerId>,
    pub config: DeploymentConfig,
    pub state: DeploymentState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deployment {
    pub fn new(config: DeploymentConfig) -> Self {
        let now = Utc::now();

        Deployment {
            id: DeploymentId::generate(),
            server_id: None,
            config,
            state: DeploymentState::Requested,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn deployment_type(&self) -> DeploymentType {
        self.config.deployment_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::{Network, NodeType};
    use semver::Version;

    fn node_config() -> DeploymentConfig {
        DeploymentConfig::BinanceNode(NodeConfig {
            network: Network::Testnet,
            node_type: NodeType::FullNode,
            version: Version::new(0, 6, 1),
        })
    }

    #[test]
    fn config_map_round_trip() {
        let config = node_config();
        let map = config.marshal_map();
        let parsed = DeploymentConfig::parse(DeploymentType::BinanceNode, &map).unwrap();

        assert_eq!(parsed, config);
    }

    #[test]
    fn new_deployment_starts_requested_and_detached() {
        let deployment = Deployment::new(node_config());
        assert_eq!(deployment.state, DeploymentState::Requested);
        assert!(deployment.server_id.is_none());
        assert_eq!(deployment.deployment_type(), DeploymentType::BinanceNode);
    }
}
