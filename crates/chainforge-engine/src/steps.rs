use std::sync::Arc;

use async_trait::async_trait;
use chainforge_domain::{Job, JOB_STATE_COMPLETED, JOB_STATE_SERVER_CREATED};
use chainforge_machine::{StatefulResource, Step, StepError};
use chrono::Utc;

use crate::context::StepContext;
use crate::deployment_provisioner::DeploymentProvisioner;
use crate::error::EngineError;
use crate::server_provisioner::ServerProvisioner;

fn not_hydrated(what: &str) -> StepError {
    EngineError::Internal(format!("job is not hydrated with its {what}")).into()
}

// ── StepProvisionServer ───────────────────────────────────────────────────────

/// Creates the job's server through the infrastructure tool and advances the
/// job once the machine exists.
pub struct StepProvisionServer {
    provisioner: Arc<ServerProvisioner>,
}

impl StepProvisionServer {
    pub fn new(provisioner: Arc<ServerProvisioner>) -> Self {
        StepProvisionServer { provisioner }
    }
}

#[async_trait]
impl Step<StepContext, Job> for StepProvisionServer {
    async fn run(&self, ctx: &mut StepContext, job: &mut Job) -> Result<(), StepError> {
        let settings = job
            .provider_settings
            .clone()
            .ok_or_else(|| not_hydrated("provider settings"))?;

        {
            let server = job.server.as_mut().ok_or_else(|| not_hydrated("server"))?;
            self.provisioner.provision(ctx, &settings, server).await?;
        }

        job.set_state(JOB_STATE_SERVER_CREATED);
        ctx.tx().update_job(job);

        Ok(())
    }
}

// ── StepProvisionDeployment ───────────────────────────────────────────────────

/// Configures the job's deployment on the freshly created server and
/// finishes the job.
pub struct StepProvisionDeployment {
    provisioner: Arc<DeploymentProvisioner>,
}

impl StepProvisionDeployment {
    pub fn new(provisioner: Arc<DeploymentProvisioner>) -> Self {
        StepProvisionDeployment { provisioner }
    }
}

#[async_trait]
impl Step<StepContext, Job> for StepProvisionDeployment {
    async fn run(&self, ctx: &mut StepContext, job: &mut Job) -> Result<(), StepError> {
        let server = job.server.clone().ok_or_else(|| not_hydrated("server"))?;

        {
            let deployment = job
                .deployment
                .as_mut()
                .ok_or_else(|| not_hydrated("deployment"))?;
            self.provisioner.provision(ctx, &server, deployment).await?;
        }

        job.set_state(JOB_STATE_COMPLETED);
        job.finished_at = Some(Utc::now());
        ctx.tx().update_job(job);

        Ok(())
    }
}
