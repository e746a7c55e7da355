use std::sync::Arc;

use chainforge_domain::{Job, JobId};
use chainforge_store::ProvisionStore;
use tokio_util::sync::CancellationToken;

use crate::context::StepContext;
use crate::error::EngineError;
use crate::job_machine::JobStateMachine;
use crate::scheduler::JobScheduler;
use crate::server_destroyer::ServerDestroyer;

// ── Provisioner ───────────────────────────────────────────────────────────────

/// Runs the provisioning process for one job from start to finish.
pub struct Provisioner {
    machine: JobStateMachine,
    scheduler: JobScheduler,
    destroyer: ServerDestroyer,
    store: Arc<dyn ProvisionStore>,
}

impl Provisioner {
    pub fn new(
        machine: JobStateMachine,
        scheduler: JobScheduler,
        destroyer: ServerDestroyer,
        store: Arc<dyn ProvisionStore>,
    ) -> Self {
        Provisioner {
            machine,
            scheduler,
            destroyer,
            store,
        }
    }

    /// Hydrate the job and drive it to a terminal state. The state machine
    /// guarantees the job is persisted terminal before this returns, even on
    /// step failure.
    pub async fn provision(
        &self,
        cancel: &CancellationToken,
        job_id: &JobId,
    ) -> Result<(), EngineError> {
        let mut job = self.scheduler.find_scheduled(job_id).await?;
        let mut ctx = StepContext::new(self.store.clone());

        self.machine
            .step_to_completion(cancel, &mut ctx, &mut job)
            .await?;

        Ok(())
    }

    /// Undo the infrastructure provisioned for a job by destroying its
    /// server.
    pub async fn undo(&self, job: &mut Job) -> Result<(), EngineError> {
        let server = job
            .server
            .as_mut()
            .ok_or_else(|| EngineError::Internal("job has no server aggregate".into()))?;

        self.destroyer.destroy(server).await
    }
}
