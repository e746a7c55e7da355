use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::AccountId;
use crate::deployment::Deployment;
use crate::error::DomainError;
use crate::provider::ProviderType;
use crate::ssh_key::SshKey;

// ── ServerId ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(s: impl Into<String>) -> Self {
        ServerId(s.into())
    }

    pub fn generate() -> Self {
        ServerId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── ServerState ───────────────────────────────────────────────────────────────

/// Lifecycle state of a server.
///
/// Transitions:
///   Requested → Ok (server provisioner)
///   Ok → Deleted (server destroyer)
///   Requested → Failed
///
/// Ok, Deleted and Failed never transition backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Requested,
    Ok,
    Deleted,
    Failed,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerState::Requested => "requested",
            ServerState::Ok => "ok",
            ServerState::Deleted => "deleted",
            ServerState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl FromStr for ServerState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(ServerState::Requested),
            "ok" => Ok(ServerState::Ok),
            "deleted" => Ok(ServerState::Deleted),
            "failed" => Ok(ServerState::Failed),
            other => Err(DomainError::UnknownServerState(other.to_string())),
        }
    }
}

// ── ServerSize ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerSize {
    Test,
    #[serde(rename = "production")]
    Prod,
}

impl std::fmt::Display for ServerSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerSize::Test => write!(f, "test"),
            ServerSize::Prod => write!(f, "production"),
        }
    }
}

impl FromStr for ServerSize {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "test" => Ok(ServerSize::Test),
            "production" => Ok(ServerSize::Prod),
            other => Err(DomainError::UnknownServerSize(other.to_string())),
        }
    }
}

// ── WorkspaceSnapshot ─────────────────────────────────────────────────────────

/// The on-disk artefacts of an infrastructure-tool workspace, captured so the
/// server can later be destroyed from a fresh process.
///
/// A snapshot either exists with all three blobs or not at all; a partial
/// snapshot cannot re-execute a destroy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    /// The rendered declarative definitions file.
    pub definitions: String,
    /// Opaque plan artefact produced by the tool.
    pub plan: String,
    /// Opaque state file maintained by the tool.
    pub state: String,
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A cloud server requested by a tenant, together with everything needed to
/// reach it (SSH key, IP) and to tear it down again (workspace snapshot).
#[derive(Debug, Clone)]
pub struct Server {
    pub id: ServerId,
    pub account_id: AccountId,
    pub state: ServerState,
    pub name: String,
    pub provider: ProviderType,
    pub size: ServerSize,
    pub ssh_key: SshKey,
    /// Filled in by the server provisioner after a successful apply.
    pub ip_address: Option<IpAddr>,
    pub deployments: Vec<Deployment>,
    pub workspace_snapshot: Option<WorkspaceSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Server {
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        provider: ProviderType,
        size: ServerSize,
        ssh_key: SshKey,
    ) -> Self {
        let now = Utc::now();

        Server {
            id: ServerId::generate(),
            account_id,
            state: ServerState::Requested,
            name: name.into(),
            provider,
            size,
            ssh_key,
            ip_address: None,
            deployments: Vec::new(),
            workspace_snapshot: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Associate a deployment with this server.
    pub fn add_deployment(&mut self, mut deployment: Deployment) {
        deployment.server_id = Some(self.id.clone());
        self.deployments.push(deployment);
    }
}

// ── ServerBuilder ─────────────────────────────────────────────────────────────

/// Fluent construction of a server request.
pub struct ServerBuilder {
    account_id: AccountId,
    name: Option<String>,
    provider: Option<ProviderType>,
    size: Option<ServerSize>,
    ssh_key: Option<SshKey>,
}

impl ServerBuilder {
    pub fn new(account_id: AccountId) -> Self {
        ServerBuilder {
            account_id,
            name: None,
            provider: None,
            size: None,
            ssh_key: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: ProviderType) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn size(mut self, size: ServerSize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn ssh_key(mut self, ssh_key: SshKey) -> Self {
        self.ssh_key = Some(ssh_key);
        self
    }

    /// Assemble the server, filling in defaults: a generated name, Test size
    /// and a fresh SSH key when none were supplied.
    pub fn build(self) -> Result<Server, DomainError> {
        let provider = self.provider.ok_or(DomainError::MissingField("cloud provider"))?;

        let name = match self.name {
            Some(name) => name,
            None => names::Generator::default().next().unwrap_or_else(|| "server".to_string()),
        };
        let size = self.size.unwrap_or(ServerSize::Test);
        let ssh_key = match self.ssh_key {
            Some(key) => key,
            None => SshKey::generate(format!("chainforge - {name}"))?,
        };

        Ok(Server::new(self.account_id, name, provider, size, ssh_key))
    }
}
