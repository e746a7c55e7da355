use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::deployment::{Deployment, DeploymentConfig, HealthCheck};
use crate::error::DomainError;

// Keys of the flat configuration map for a binance_node deployment.
const CONFIG_NETWORK: &str = "binance_node_network";
const CONFIG_NODE_TYPE: &str = "binance_node_type";
const CONFIG_VERSION: &str = "binance_node_version";

// ── Network ───────────────────────────────────────────────────────────────────

/// Chain network a Binance node can join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Testnet,
    Prod,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Testnet => write!(f, "testnet"),
            Network::Prod => write!(f, "prod"),
        }
    }
}

impl FromStr for Network {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "testnet" => Ok(Network::Testnet),
            "prod" => Ok(Network::Prod),
            other => Err(DomainError::InvalidNetwork(other.to_string())),
        }
    }
}

// ── NodeType ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    LightNode,
    FullNode,
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeType::LightNode => write!(f, "lightnode"),
            NodeType::FullNode => write!(f, "fullnode"),
        }
    }
}

impl FromStr for NodeType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightnode" => Ok(NodeType::LightNode),
            "fullnode" => Ok(NodeType::FullNode),
            other => Err(DomainError::InvalidNodeType(other.to_string())),
        }
    }
}

// ── NodeConfig ────────────────────────────────────────────────────────────────

/// Configuration for a single Binance Chain node deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub network: Network,
    pub node_type: NodeType,
    pub version: Version,
}

impl NodeConfig {
    pub fn marshal_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CONFIG_NETWORK.to_string(), self.network.to_string()),
            (CONFIG_NODE_TYPE.to_string(), self.node_type.to_string()),
            (CONFIG_VERSION.to_string(), self.version.to_string()),
        ])
    }

    pub fn parse(raw: &BTreeMap<String, String>) -> Result<Self, DomainError> {
        let network = raw
            .get(CONFIG_NETWORK)
            .ok_or_else(|| DomainError::InvalidNetwork(String::new()))?
            .parse()?;

        let node_type = raw
            .get(CONFIG_NODE_TYPE)
            .ok_or_else(|| DomainError::InvalidNodeType(String::new()))?
            .parse()?;

        let raw_version = raw
            .get(CONFIG_VERSION)
            .ok_or_else(|| DomainError::InvalidVersion(String::new()))?;
        let version = Version::parse(raw_version)
            .map_err(|_| DomainError::InvalidVersion(raw_version.clone()))?;

        Ok(NodeConfig { network, node_type, version })
    }
}

impl NodeConfig {
    /// Probe for a running node; the RPC port answers `/status` once the
    /// node is up.
    pub fn health_check(&self, ip: IpAddr) -> HealthCheck {
        HealthCheck {
            method: "GET".to_string(),
            url: format!("http://{ip}:27147/status"),
            expected_status: 200,
        }
    }
}

/// Convenience constructor for a Binance node deployment request.
pub fn node_deployment(network: Network, node_type: NodeType, version: Version) -> Deployment {
    Deployment::new(DeploymentConfig::BinanceNode(NodeConfig {
        network,
        node_type,
        version,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_map_uses_the_wire_keys() {
        let config = NodeConfig {
            network: Network::Prod,
            node_type: NodeType::FullNode,
            version: Version::new(0, 6, 1),
        };

        let map = config.marshal_map();
        assert_eq!(map.get("binance_node_network").map(String::as_str), Some("prod"));
        assert_eq!(map.get("binance_node_type").map(String::as_str), Some("fullnode"));
        assert_eq!(map.get("binance_node_version").map(String::as_str), Some("0.6.1"));
    }

    #[test]
    fn parse_rejects_unknown_values() {
        let mut map = NodeConfig {
            network: Network::Testnet,
            node_type: NodeType::LightNode,
            version: Version::new(0, 6, 1),
        }
        .marshal_map();

        map.insert("binance_node_network".into(), "mainnet".into());
        assert!(matches!(
            NodeConfig::parse(&map),
            Err(DomainError::InvalidNetwork(_))
        ));

        map.insert("binance_node_network".into(), "testnet".into());
        map.insert("binance_node_type".into(), "supernode".into());
        assert!(matches!(
            NodeConfig::parse(&map),
            Err(DomainError::InvalidNodeType(_))
        ));

        map.insert("binance_node_type".into(), "lightnode".into());
        map.insert("binance_node_version".into(), "not-semver".into());
        assert!(matches!(
            NodeConfig::parse(&map),
            Err(DomainError::InvalidVersion(_))
        ));
    }

    #[test]
    fn parse_rejects_missing_keys() {
        assert!(NodeConfig::parse(&BTreeMap::new()).is_err());
    }

    #[test]
    fn health_check_targets_the_node_rpc_port() {
        let config = NodeConfig {
            network: Network::Testnet,
            node_type: NodeType::LightNode,
            version: Version::new(0, 6, 1),
        };

        let check = config.health_check("203.0.113.10".parse().unwrap());
        assert_eq!(check.method, "GET");
        assert_eq!(check.url, "http://203.0.113.10:27147/status");
        assert_eq!(check.expected_status, 200);
    }
}
