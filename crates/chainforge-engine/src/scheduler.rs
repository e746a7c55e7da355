use std::sync::Arc;

use chainforge_domain::{Job, JobId};
use chainforge_store::{ProvisionStore, StoreTx};
use tracing::info;

use crate::error::EngineError;

// ── JobScheduler ──────────────────────────────────────────────────────────────

/// Persists new jobs and hydrates them back out of storage.
///
/// A job is stored together with its server and deployment in one
/// transaction, in that order; the deployment carries the server's id and
/// the job references all three aggregates. The worker pool later picks the
/// job up by polling the store.
pub struct JobScheduler {
    store: Arc<dyn ProvisionStore>,
}

impl JobScheduler {
    pub fn new(store: Arc<dyn ProvisionStore>) -> Self {
        JobScheduler { store }
    }

    pub async fn schedule(&self, job: &Job) -> Result<(), EngineError> {
        let server = job
            .server
            .as_ref()
            .ok_or_else(|| EngineError::Internal("job has no server aggregate".into()))?;
        let deployment = job
            .deployment
            .as_ref()
            .ok_or_else(|| EngineError::Internal("job has no deployment aggregate".into()))?;

        let mut tx = StoreTx::new();
        tx.create_server(server);
        tx.create_deployment(deployment);
        tx.create_job(job);

        self.store.commit(tx).await?;

        info!(job_id = %job.id, "job scheduled");
        Ok(())
    }

    /// Fetch a job and hydrate it with the aggregates it references. Jobs
    /// are transient across process restarts; hydration brings them back.
    pub async fn find_scheduled(&self, job_id: &JobId) -> Result<Job, EngineError> {
        let mut job = self.store.get_job(job_id).await?;

        job.provider_settings = Some(
            self.store
                .get_provider_settings(&job.provider_settings_id)
                .await?,
        );
        job.server = Some(self.store.get_server(&job.server_id).await?);
        job.deployment = Some(self.store.get_deployment(&job.deployment_id).await?);

        Ok(job)
    }
}
