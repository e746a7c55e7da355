//! Row representations and the marshal/unmarshal hooks applied at the
//! persistence boundary: credential and private-key encryption, typed
//! deployment configuration flattening, and workspace snapshot columns.
//!
//! Entities never reach a backend directly; both stores persist these
//! records (serialized with serde_json) and convert on every read.

use std::collections::BTreeMap;

use chainforge_domain::{
    job_state_from_name, Account, AccountId, Deployment, DeploymentConfig, DeploymentId,
    DeploymentState, DeploymentType, Job, JobId, ProviderSettings, ProviderSettingsId,
    ProviderType, Server, ServerId, ServerSize, ServerState, SshKey, WorkspaceSnapshot,
};
use chainforge_machine::StatefulResource;
use chainforge_vault::Vault;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

// ── Account ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AccountRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn marshal_account(account: &Account) -> AccountRecord {
    AccountRecord {
        id: account.id.to_string(),
        email: account.email.clone(),
        password_hash: account.password_hash.clone(),
        created_at: account.created_at,
        updated_at: account.updated_at,
    }
}

pub(crate) fn unmarshal_account(record: &AccountRecord) -> Account {
    Account {
        id: AccountId::new(&record.id),
        email: record.email.clone(),
        password_hash: record.password_hash.clone(),
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

// ── ProviderSettings ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ProviderSettingsRecord {
    pub id: String,
    pub account_id: String,
    pub label: String,
    pub provider_type: String,
    /// Vault envelope; never plaintext.
    pub credentials: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn marshal_provider_settings(
    settings: &ProviderSettings,
    vault: &Vault,
) -> Result<ProviderSettingsRecord, StoreError> {
    Ok(ProviderSettingsRecord {
        id: settings.id.to_string(),
        account_id: settings.account_id.to_string(),
        label: settings.label.clone(),
        provider_type: settings.provider_type.to_string(),
        credentials: vault.encrypt(settings.credentials.as_bytes())?,
        created_at: settings.created_at,
        updated_at: settings.updated_at,
    })
}

pub(crate) fn unmarshal_provider_settings(
    record: &ProviderSettingsRecord,
    vault: &Vault,
) -> Result<ProviderSettings, StoreError> {
    let credentials = vault.decrypt(&record.credentials)?;
    let credentials = String::from_utf8(credentials)
        .map_err(|_| StoreError::Internal("credentials are not valid UTF-8".into()))?;
    let provider_type: ProviderType = record.provider_type.parse()?;

    Ok(ProviderSettings {
        id: ProviderSettingsId::new(&record.id),
        account_id: AccountId::new(&record.account_id),
        label: record.label.clone(),
        provider_type,
        credentials,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ServerRecord {
    pub id: String,
    pub account_id: String,
    pub state: String,
    pub name: String,
    pub provider: String,
    pub size: String,
    pub ssh_key_name: String,
    /// Vault envelope over the PKCS#1 DER private key.
    pub ssh_key: String,
    pub ip_address: Option<String>,
    // The three snapshot columns are all present or all absent.
    pub workspace_definitions: Option<String>,
    pub workspace_plan: Option<String>,
    pub workspace_state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn marshal_server(server: &Server, vault: &Vault) -> Result<ServerRecord, StoreError> {
    let der = server.ssh_key.to_pkcs1_der()?;
    let (definitions, plan, state) = match &server.workspace_snapshot {
        Some(snapshot) => (
            Some(snapshot.definitions.clone()),
            Some(snapshot.plan.clone()),
            Some(snapshot.state.clone()),
        ),
        None => (None, None, None),
    };

    Ok(ServerRecord {
        id: server.id.to_string(),
        account_id: server.account_id.to_string(),
        state: server.state.to_string(),
        name: server.name.clone(),
        provider: server.provider.to_string(),
        size: server.size.to_string(),
        ssh_key_name: server.ssh_key.name.clone(),
        ssh_key: vault.encrypt(&der)?,
        ip_address: server.ip_address.map(|ip| ip.to_string()),
        workspace_definitions: definitions,
        workspace_plan: plan,
        workspace_state: state,
        created_at: server.created_at,
        updated_at: server.updated_at,
    })
}

pub(crate) fn unmarshal_server(record: &ServerRecord, vault: &Vault) -> Result<Server, StoreError> {
    let der = vault.decrypt(&record.ssh_key)?;
    let ssh_key = SshKey::from_pkcs1_der(&record.ssh_key_name, &der)?;

    let state: ServerState = record.state.parse()?;
    let provider: ProviderType = record.provider.parse()?;
    let size: ServerSize = record.size.parse()?;

    let ip_address = match &record.ip_address {
        Some(raw) => Some(raw.parse().map_err(|_| {
            StoreError::Internal(format!("stored server IP does not parse: {raw}"))
        })?),
        None => None,
    };

    let workspace_snapshot = match (
        &record.workspace_definitions,
        &record.workspace_plan,
        &record.workspace_state,
    ) {
        (Some(definitions), Some(plan), Some(state)) => Some(WorkspaceSnapshot {
            definitions: definitions.clone(),
            plan: plan.clone(),
            state: state.clone(),
        }),
        (None, None, None) => None,
        _ => {
            return Err(StoreError::Internal(format!(
                "server {} carries a partial workspace snapshot",
                record.id
            )))
        }
    };

    Ok(Server {
        id: ServerId::new(&record.id),
        account_id: AccountId::new(&record.account_id),
        state,
        name: record.name.clone(),
        provider,
        size,
        ssh_key,
        ip_address,
        deployments: Vec::new(),
        workspace_snapshot,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

// ── Deployment ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DeploymentRecord {
    pub id: String,
    pub server_id: String,
    pub deployment_type: String,
    /// Flat string map, serialized as JSON in a single text column.
    pub configuration: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) fn marshal_deployment(deployment: &Deployment) -> Result<DeploymentRecord, StoreError> {
    let server_id = deployment
        .server_id
        .as_ref()
        .ok_or_else(|| StoreError::Internal("deployment is not attached to a server".into()))?;

    Ok(DeploymentRecord {
        id: deployment.id.to_string(),
        server_id: server_id.to_string(),
        deployment_type: deployment.deployment_type().to_string(),
        configuration: serde_json::to_string(&deployment.config.marshal_map())?,
        state: deployment.state.to_string(),
        created_at: deployment.created_at,
        updated_at: deployment.updated_at,
    })
}

pub(crate) fn unmarshal_deployment(record: &DeploymentRecord) -> Result<Deployment, StoreError> {
    let ty: DeploymentType = record.deployment_type.parse()?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&record.configuration)?;
    let config = DeploymentConfig::parse(ty, &raw)?;
    let state: DeploymentState = record.state.parse()?;

    Ok(Deployment {
        id: DeploymentId::new(&record.id),
        server_id: Some(ServerId::new(&record.server_id)),
        config,
        state,
        created_at: record.created_at,
        updated_at: record.updated_at,
    })
}

// ── Job ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JobRecord {
    pub id: String,
    pub account_id: String,
    pub state: String,
    pub provider_settings_id: String,
    pub server_id: String,
    pub deployment_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

pub(crate) fn marshal_job(job: &Job) -> JobRecord {
    JobRecord {
        id: job.id.to_string(),
        account_id: job.account_id.to_string(),
        state: job.state().name().to_string(),
        provider_settings_id: job.provider_settings_id.to_string(),
        server_id: job.server_id.to_string(),
        deployment_id: job.deployment_id.to_string(),
        created_at: job.created_at,
        updated_at: job.updated_at,
        finished_at: job.finished_at,
    }
}

pub(crate) fn unmarshal_job(record: &JobRecord) -> Result<Job, StoreError> {
    let state = job_state_from_name(&record.state)?;

    Ok(Job::restore(
        JobId::new(&record.id),
        AccountId::new(&record.account_id),
        state,
        ProviderSettingsId::new(&record.provider_settings_id),
        ServerId::new(&record.server_id),
        DeploymentId::new(&record.deployment_id),
        record.created_at,
        record.updated_at,
        record.finished_at,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainforge_domain::binance::{self, Network, NodeType};
    use chainforge_domain::{ProviderType, ServerBuilder};
    use semver::Version;

    fn vault() -> Vault {
        Vault::new("record-test-secret")
    }

    fn test_server() -> Server {
        ServerBuilder::new(AccountId::generate())
            .name("recorder")
            .provider(ProviderType::DigitalOcean)
            .ssh_key(SshKey::generate_with_bits("test-key", 1024).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn provider_settings_are_encrypted_at_rest() {
        let vault = vault();
        let settings = ProviderSettings::new(
            AccountId::generate(),
            "personal",
            ProviderType::DigitalOcean,
            "do-secret-token",
        );

        let record = marshal_provider_settings(&settings, &vault).unwrap();
        assert!(!record.credentials.contains("do-secret-token"));
        // The stored value is a valid vault envelope.
        assert_eq!(vault.decrypt(&record.credentials).unwrap(), b"do-secret-token");

        let restored = unmarshal_provider_settings(&record, &vault).unwrap();
        assert_eq!(restored.credentials, settings.credentials);
        assert_eq!(restored.provider_type, settings.provider_type);
    }

    #[test]
    fn server_round_trip_with_snapshot() {
        let vault = vault();
        let mut server = test_server();
        server.state = ServerState::Ok;
        server.ip_address = Some("203.0.113.10".parse().unwrap());
        server.workspace_snapshot = Some(WorkspaceSnapshot {
            definitions: "resource {}".into(),
            plan: "plan-bytes".into(),
            state: "state-bytes".into(),
        });

        let record = marshal_server(&server, &vault).unwrap();
        assert!(!record.ssh_key.is_empty());

        let restored = unmarshal_server(&record, &vault).unwrap();
        assert_eq!(restored.id, server.id);
        assert_eq!(restored.state, ServerState::Ok);
        assert_eq!(restored.ip_address, server.ip_address);
        assert_eq!(restored.workspace_snapshot, server.workspace_snapshot);
        assert_eq!(
            restored.ssh_key.public_key_openssh(),
            server.ssh_key.public_key_openssh()
        );
    }

    #[test]
    fn partial_snapshot_is_rejected() {
        let vault = vault();
        let mut record = marshal_server(&test_server(), &vault).unwrap();
        record.workspace_definitions = Some("resource {}".into());

        assert!(matches!(
            unmarshal_server(&record, &vault),
            Err(StoreError::Internal(_))
        ));
    }

    #[test]
    fn deployment_round_trip() {
        let mut deployment =
            binance::node_deployment(Network::Prod, NodeType::FullNode, Version::new(0, 6, 1));
        deployment.server_id = Some(ServerId::generate());

        let record = marshal_deployment(&deployment).unwrap();
        let restored = unmarshal_deployment(&record).unwrap();

        assert_eq!(restored.config, deployment.config);
        assert_eq!(restored.state, deployment.state);
        assert_eq!(restored.server_id, deployment.server_id);
    }

    #[test]
    fn unattached_deployment_cannot_be_marshalled() {
        let deployment =
            binance::node_deployment(Network::Testnet, NodeType::LightNode, Version::new(0, 6, 1));
        assert!(marshal_deployment(&deployment).is_err());
    }
}
