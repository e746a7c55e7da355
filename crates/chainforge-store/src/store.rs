use async_trait::async_trait;
use chainforge_domain::{
    Account, AccountId, Deployment, DeploymentId, Job, JobId, ProviderSettings,
    ProviderSettingsId, Server, ServerId,
};

use crate::error::StoreError;
use crate::tx::StoreTx;

/// Persistent storage for the five aggregates of the provisioning engine.
///
/// Reads decrypt credentials and private keys and re-parse typed deployment
/// configuration on the way out. All writes are expressed as a [`StoreTx`]
/// batch applied atomically by [`commit`](ProvisionStore::commit); the
/// single-write methods are conveniences over one-op batches.
#[async_trait]
pub trait ProvisionStore: Send + Sync + 'static {
    /// Apply a batch of writes as one atomic unit: either every operation
    /// takes effect or none does.
    async fn commit(&self, tx: StoreTx) -> Result<(), StoreError>;

    // ── Accounts ──────────────────────────────────────────────────────────

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Account, StoreError>;

    // ── Provider settings ─────────────────────────────────────────────────

    async fn get_provider_settings(
        &self,
        id: &ProviderSettingsId,
    ) -> Result<ProviderSettings, StoreError>;

    async fn list_provider_settings(
        &self,
        owner: &AccountId,
    ) -> Result<Vec<ProviderSettings>, StoreError>;

    // ── Servers ───────────────────────────────────────────────────────────

    async fn get_server(&self, id: &ServerId) -> Result<Server, StoreError>;

    async fn list_servers(&self, owner: &AccountId) -> Result<Vec<Server>, StoreError>;

    // ── Deployments ───────────────────────────────────────────────────────

    async fn get_deployment(&self, id: &DeploymentId) -> Result<Deployment, StoreError>;

    async fn find_deployments_by_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<Deployment>, StoreError>;

    // ── Jobs ──────────────────────────────────────────────────────────────

    async fn get_job(&self, id: &JobId) -> Result<Job, StoreError>;

    async fn list_jobs(&self, owner: &AccountId) -> Result<Vec<Job>, StoreError>;

    /// Jobs that have not reached a terminal state (null `finished_at`),
    /// minus the given set. Fed by the worker pool with its in-flight ids.
    async fn find_incomplete_jobs(&self, excluding: &[JobId]) -> Result<Vec<Job>, StoreError>;

    // ── Single-write conveniences ─────────────────────────────────────────

    async fn create_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.create_account(account);
        self.commit(tx).await
    }

    async fn update_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.update_account(account);
        self.commit(tx).await
    }

    async fn create_provider_settings(
        &self,
        settings: &ProviderSettings,
    ) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.create_provider_settings(settings);
        self.commit(tx).await
    }

    async fn update_provider_settings(
        &self,
        settings: &ProviderSettings,
    ) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.update_provider_settings(settings);
        self.commit(tx).await
    }

    async fn delete_provider_settings(&self, id: &ProviderSettingsId) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.delete_provider_settings(id);
        self.commit(tx).await
    }

    async fn create_server(&self, server: &Server) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.create_server(server);
        self.commit(tx).await
    }

    async fn update_server(&self, server: &Server) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.update_server(server);
        self.commit(tx).await
    }

    async fn delete_server(&self, id: &ServerId) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.delete_server(id);
        self.commit(tx).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.create_deployment(deployment);
        self.commit(tx).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.update_deployment(deployment);
        self.commit(tx).await
    }

    async fn create_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.create_job(job);
        self.commit(tx).await
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut tx = StoreTx::new();
        tx.update_job(job);
        self.commit(tx).await
    }
}
