use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chainforge_domain::{
    Account, AccountId, Deployment, DeploymentId, Job, JobId, ProviderSettings,
    ProviderSettingsId, Server, ServerId,
};
use chainforge_vault::Vault;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::record::{
    marshal_account, marshal_deployment, marshal_job, marshal_provider_settings, marshal_server,
    unmarshal_account, unmarshal_deployment, unmarshal_job, unmarshal_provider_settings,
    unmarshal_server, AccountRecord, DeploymentRecord, JobRecord, ProviderSettingsRecord,
    ServerRecord,
};
use crate::store::ProvisionStore;
use crate::tx::{StoreTx, WriteOp};
use crate::CREDENTIALS_TOMBSTONE;

#[derive(Debug, Clone, Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    provider_settings: HashMap<String, ProviderSettingsRecord>,
    servers: HashMap<String, ServerRecord>,
    deployments: HashMap<String, DeploymentRecord>,
    jobs: HashMap<String, JobRecord>,
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// In-memory implementation of [`ProvisionStore`].
///
/// Rows are held in their persisted (encrypted) record form, so the same
/// marshal hooks run as against a durable backend. Commits stage the batch
/// against a copy of the maps and swap it in only when every operation
/// succeeded, which gives real rollback semantics. Data is lost on process
/// exit; suitable for tests and local runs.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    vault: Vault,
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new(vault: Vault) -> Self {
        MemoryStore {
            vault,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

fn apply(inner: &mut Inner, op: &WriteOp, vault: &Vault) -> Result<(), StoreError> {
    match op {
        WriteOp::CreateAccount(account) => {
            if inner.accounts.contains_key(account.id.as_str()) {
                return Err(StoreError::AccountAlreadyExists(account.id.clone()));
            }
            if inner.accounts.values().any(|r| r.email == account.email) {
                return Err(StoreError::EmailAlreadyExists(account.email.clone()));
            }
            inner.accounts.insert(account.id.to_string(), marshal_account(account));
        }
        WriteOp::UpdateAccount(account) => {
            if !inner.accounts.contains_key(account.id.as_str()) {
                return Err(StoreError::AccountNotFound(account.id.clone()));
            }
            inner.accounts.insert(account.id.to_string(), marshal_account(account));
        }

        WriteOp::CreateProviderSettings(settings) => {
            if inner.provider_settings.contains_key(settings.id.as_str()) {
                return Err(StoreError::ProviderSettingsAlreadyExists(settings.id.clone()));
            }
            inner
                .provider_settings
                .insert(settings.id.to_string(), marshal_provider_settings(settings, vault)?);
        }
        WriteOp::UpdateProviderSettings(settings) => {
            if !inner.provider_settings.contains_key(settings.id.as_str()) {
                return Err(StoreError::ProviderSettingsNotFound(settings.id.clone()));
            }
            inner
                .provider_settings
                .insert(settings.id.to_string(), marshal_provider_settings(settings, vault)?);
        }
        WriteOp::DeleteProviderSettings(id) => {
            let mut record = inner
                .provider_settings
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| StoreError::ProviderSettingsNotFound(id.clone()))?;

            // Overwrite the credentials column before the row goes away.
            record.credentials = CREDENTIALS_TOMBSTONE.to_string();
            inner.provider_settings.insert(id.to_string(), record);
            inner.provider_settings.remove(id.as_str());
        }

        WriteOp::CreateServer(server) => {
            if inner.servers.contains_key(server.id.as_str()) {
                return Err(StoreError::ServerAlreadyExists(server.id.clone()));
            }
            inner.servers.insert(server.id.to_string(), marshal_server(server, vault)?);
        }
        WriteOp::UpdateServer(server) => {
            if !inner.servers.contains_key(server.id.as_str()) {
                return Err(StoreError::ServerNotFound(server.id.clone()));
            }
            inner.servers.insert(server.id.to_string(), marshal_server(server, vault)?);
        }
        WriteOp::DeleteServer(id) => {
            inner
                .servers
                .remove(id.as_str())
                .ok_or_else(|| StoreError::ServerNotFound(id.clone()))?;
        }

        WriteOp::CreateDeployment(deployment) => {
            if inner.deployments.contains_key(deployment.id.as_str()) {
                return Err(StoreError::DeploymentAlreadyExists(deployment.id.clone()));
            }
            inner
                .deployments
                .insert(deployment.id.to_string(), marshal_deployment(deployment)?);
        }
        WriteOp::UpdateDeployment(deployment) => {
            if !inner.deployments.contains_key(deployment.id.as_str()) {
                return Err(StoreError::DeploymentNotFound(deployment.id.clone()));
            }
            inner
                .deployments
                .insert(deployment.id.to_string(), marshal_deployment(deployment)?);
        }
        WriteOp::DeleteDeploymentsForServer(server_id) => {
            inner.deployments.retain(|_, r| r.server_id != server_id.as_str());
        }

        WriteOp::CreateJob(job) => {
            if inner.jobs.contains_key(job.id.as_str()) {
                return Err(StoreError::JobAlreadyExists(job.id.clone()));
            }
            inner.jobs.insert(job.id.to_string(), marshal_job(job));
        }
        WriteOp::UpdateJob(job) => {
            if !inner.jobs.contains_key(job.id.as_str()) {
                return Err(StoreError::JobNotFound(job.id.clone()));
            }
            inner.jobs.insert(job.id.to_string(), marshal_job(job));
        }
    }

    Ok(())
}

#[async_trait]
impl ProvisionStore for MemoryStore {
    async fn commit(&self, tx: StoreTx) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;

        let mut staged = guard.clone();
        for op in &tx.ops {
            apply(&mut staged, op, &self.vault)?;
        }

        *guard = staged;
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .accounts
            .get(id.as_str())
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;

        Ok(unmarshal_account(record))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .accounts
            .values()
            .find(|r| r.email == email)
            .ok_or_else(|| StoreError::AccountNotFound(AccountId::new(email)))?;

        Ok(unmarshal_account(record))
    }

    async fn get_provider_settings(
        &self,
        id: &ProviderSettingsId,
    ) -> Result<ProviderSettings, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .provider_settings
            .get(id.as_str())
            .ok_or_else(|| StoreError::ProviderSettingsNotFound(id.clone()))?;

        unmarshal_provider_settings(record, &self.vault)
    }

    async fn list_provider_settings(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<ProviderSettings>, StoreError> {
        let guard = self.inner.read().await;
        guard
            .provider_settings
            .values()
            .filter(|r| r.account_id == owner.as_str())
            .map(|r| unmarshal_provider_settings(r, &self.vault))
            .collect()
    }

    async fn get_server(&self, id: &ServerId) -> Result<Server, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .servers
            .get(id.as_str())
            .ok_or_else(|| StoreError::ServerNotFound(id.clone()))?;

        unmarshal_server(record, &self.vault)
    }

    async fn list_servers(&self, owner: &AccountId) -> Result<Vec<Server>, StoreError> {
        let guard = self.inner.read().await;
        guard
            .servers
            .values()
            .filter(|r| r.account_id == owner.as_str())
            .map(|r| unmarshal_server(r, &self.vault))
            .collect()
    }

    async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .deployments
            .get(id.as_str())
            .ok_or_else(|| StoreError::DeploymentNotFound(id.clone()))?;

        unmarshal_deployment(record)
    }

    async fn find_deployments_by_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<Deployment>, StoreError> {
        let guard = self.inner.read().await;
        guard
            .deployments
            .values()
            .filter(|r| r.server_id == server_id.as_str())
            .map(unmarshal_deployment)
            .collect()
    }

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError> {
        let guard = self.inner.read().await;
        let record = guard
            .jobs
            .get(id.as_str())
            .ok_or_else(|| StoreError::JobNotFound(id.clone()))?;

        unmarshal_job(record)
    }

    async fn list_jobs(&self, owner: &AccountId) -> Result<Vec<Job>, StoreError> {
        let guard = self.inner.read().await;
        guard
            .jobs
            .values()
            .filter(|r| r.account_id == owner.as_str())
            .map(unmarshal_job)
            .collect()
    }

    async fn find_incomplete_jobs(&self, excluding: &[JobId]) -> Result<Vec<Job>, StoreError> {
        let guard = self.inner.read().await;
        guard
            .jobs
            .values()
            .filter(|r| r.finished_at.is_none())
            .filter(|r| !excluding.iter().any(|id| id.as_str() == r.id))
            .map(unmarshal_job)
            .collect()
    }
}
