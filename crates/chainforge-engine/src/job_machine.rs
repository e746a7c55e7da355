use std::sync::Arc;

use chainforge_domain::{Job, JOB_STATE_CREATED, JOB_STATE_SERVER_CREATED, VALID_JOB_STATES};
use chainforge_machine::{Builder, StateMachine};
use chainforge_store::ProvisionStore;

use crate::context::StepContext;
use crate::deployment_provisioner::DeploymentProvisioner;
use crate::middleware::{FailureCapture, Transactional};
use crate::server_provisioner::ServerProvisioner;
use crate::steps::{StepProvisionDeployment, StepProvisionServer};

pub type JobStateMachine = StateMachine<StepContext, Job>;

/// Assemble the state machine for provisioning jobs.
///
/// FailureCapture is declared first so it wraps outside Transactional; the
/// failure record must not be rolled back along with the failed step's
/// transaction.
pub fn configure_job_state_machine(
    server_provisioner: Arc<ServerProvisioner>,
    deployment_provisioner: Arc<DeploymentProvisioner>,
    store: Arc<dyn ProvisionStore>,
) -> JobStateMachine {
    Builder::<StepContext, Job>::new(&VALID_JOB_STATES)
        .middleware(Arc::new(FailureCapture::new(store.clone())))
        .middleware(Arc::new(Transactional::new(store)))
        .step(
            JOB_STATE_CREATED,
            Arc::new(StepProvisionServer::new(server_provisioner)),
        )
        .step(
            JOB_STATE_SERVER_CREATED,
            Arc::new(StepProvisionDeployment::new(deployment_provisioner)),
        )
        .build()
}
