use std::time::Duration;

use chainforge_domain::{Deployment, DeploymentState, Server, ServerState};
use chainforge_driver::Ansible;
use tracing::{debug, warn};

use crate::context::StepContext;
use crate::error::EngineError;

/// Attempts before the last error is surfaced to the caller.
const PROVISION_ATTEMPTS: u32 = 5;

/// Wait before every attempt; fresh machines need a moment before they
/// accept SSH connections.
const RETRY_DELAY: Duration = Duration::from_secs(5);

// ── DeploymentProvisioner ─────────────────────────────────────────────────────

/// Configures a requested deployment on a provisioned server through the
/// configuration tool, retrying while the host is still coming up.
pub struct DeploymentProvisioner {
    ansible: Ansible,
    retry_delay: Duration,
}

impl DeploymentProvisioner {
    pub fn new(ansible: Ansible) -> Self {
        DeploymentProvisioner {
            ansible,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the wait between attempts.
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub async fn provision(
        &self,
        ctx: &mut StepContext,
        server: &Server,
        deployment: &mut Deployment,
    ) -> Result<(), EngineError> {
        if server.state != ServerState::Ok {
            return Err(EngineError::ServerNotReadyForDeployments);
        }
        if deployment.state != DeploymentState::Requested {
            return Err(EngineError::DeploymentNotInRequestedState);
        }

        let version = self.ansible.version().await?;
        debug!(%version, "using ansible");

        let mut last_error = None;
        for attempt in 1..=PROVISION_ATTEMPTS {
            debug!(attempt, delay = ?self.retry_delay, "waiting for server to become available");
            tokio::time::sleep(self.retry_delay).await;

            match self.ansible.run_playbook(server, deployment).await {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "failed running playbook on server");
                    last_error = Some(e);
                }
            }
        }

        if let Some(err) = last_error {
            return Err(err.into());
        }

        deployment.state = DeploymentState::Ok;
        ctx.tx().update_deployment(deployment);

        Ok(())
    }
}
