use std::sync::Arc;

use chainforge_domain::{DeploymentState, Server, ServerState};
use chainforge_driver::{Terraform, Workspace};
use chainforge_store::{ProvisionStore, StoreTx};
use tracing::{debug, warn};

use crate::error::EngineError;

// ── ServerDestroyer ───────────────────────────────────────────────────────────

/// Tears down the infrastructure behind a server.
///
/// The workspace is rebuilt from the server's snapshot; without one there is
/// nothing to destroy against and the call fails up front with no side
/// effects. After the tool has destroyed the resources, the server row and
/// every deployment on it are removed in a single transaction.
pub struct ServerDestroyer {
    terraform: Terraform,
    store: Arc<dyn ProvisionStore>,
}

impl ServerDestroyer {
    pub fn new(terraform: Terraform, store: Arc<dyn ProvisionStore>) -> Self {
        ServerDestroyer { terraform, store }
    }

    pub async fn destroy(&self, server: &mut Server) -> Result<(), EngineError> {
        let snapshot = server
            .workspace_snapshot
            .clone()
            .ok_or(EngineError::MissingWorkspaceSnapshot)?;

        let workspace = Workspace::restore(&snapshot)?;
        let result = self.run(&workspace, server).await;

        debug!("cleaning up workspace");
        if let Err(e) = workspace.close() {
            warn!(error = %e, "failed cleaning up workspace");
        }

        result
    }

    async fn run(&self, workspace: &Workspace, server: &mut Server) -> Result<(), EngineError> {
        self.terraform.init(workspace).await?;
        self.terraform.destroy(workspace).await?;

        // Destroy rewrites the tool's state file; keep the snapshot current.
        server.workspace_snapshot = Some(workspace.snapshot()?);

        let mut deployments = self.store.find_deployments_by_server(&server.id).await?;

        let mut tx = StoreTx::new();
        for deployment in &mut deployments {
            deployment.state = DeploymentState::Deleted;
            tx.update_deployment(deployment);
        }
        tx.delete_deployments_for_server(&server.id);
        tx.delete_server(&server.id);

        self.store.commit(tx).await?;

        server.state = ServerState::Deleted;
        Ok(())
    }
}
