use chainforge_domain::{
    Account, Deployment, Job, ProviderSettings, ProviderSettingsId, Server, ServerId,
};

/// A single write against the store.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    CreateAccount(Account),
    UpdateAccount(Account),

    CreateProviderSettings(ProviderSettings),
    UpdateProviderSettings(ProviderSettings),
    DeleteProviderSettings(ProviderSettingsId),

    CreateServer(Server),
    UpdateServer(Server),
    DeleteServer(ServerId),

    CreateDeployment(Deployment),
    UpdateDeployment(Deployment),
    DeleteDeploymentsForServer(ServerId),

    CreateJob(Job),
    UpdateJob(Job),
}

// ── StoreTx ───────────────────────────────────────────────────────────────────

/// An atomic unit of writes.
///
/// Callers record writes against the batch and hand it to
/// [`ProvisionStore::commit`](crate::ProvisionStore::commit), which applies
/// all of them or none. A batch that is never committed is a rollback.
///
/// Reads always go to the store itself; nothing in the engine reads its own
/// uncommitted writes.
#[derive(Debug, Default)]
pub struct StoreTx {
    pub(crate) ops: Vec<WriteOp>,
}

impl StoreTx {
    pub fn new() -> Self {
        StoreTx::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn create_account(&mut self, account: &Account) {
        self.ops.push(WriteOp::CreateAccount(account.clone()));
    }

    pub fn update_account(&mut self, account: &Account) {
        self.ops.push(WriteOp::UpdateAccount(account.clone()));
    }

    pub fn create_provider_settings(&mut self, settings: &ProviderSettings) {
        self.ops.push(WriteOp::CreateProviderSettings(settings.clone()));
    }

    pub fn update_provider_settings(&mut self, settings: &ProviderSettings) {
        self.ops.push(WriteOp::UpdateProviderSettings(settings.clone()));
    }

    /// Remove provider settings, overwriting the credentials column with the
    /// tombstone marker first.
    pub fn delete_provider_settings(&mut self, id: &ProviderSettingsId) {
        self.ops.push(WriteOp::DeleteProviderSettings(id.clone()));
    }

    pub fn create_server(&mut self, server: &Server) {
        self.ops.push(WriteOp::CreateServer(server.clone()));
    }

    pub fn update_server(&mut self, server: &Server) {
        self.ops.push(WriteOp::UpdateServer(server.clone()));
    }

    pub fn delete_server(&mut self, id: &ServerId) {
        self.ops.push(WriteOp::DeleteServer(id.clone()));
    }

    pub fn create_deployment(&mut self, deployment: &Deployment) {
        self.ops.push(WriteOp::CreateDeployment(deployment.clone()));
    }

    pub fn update_deployment(&mut self, deployment: &Deployment) {
        self.ops.push(WriteOp::UpdateDeployment(deployment.clone()));
    }

    /// Cascade removal of every deployment on a server.
    pub fn delete_deployments_for_server(&mut self, server_id: &ServerId) {
        self.ops.push(WriteOp::DeleteDeploymentsForServer(server_id.clone()));
    }

    pub fn create_job(&mut self, job: &Job) {
        self.ops.push(WriteOp::CreateJob(job.clone()));
    }

    pub fn update_job(&mut self, job: &Job) {
        self.ops.push(WriteOp::UpdateJob(job.clone()));
    }
}
