use std::net::IpAddr;

use chainforge_domain::{ProviderSettings, Server, ServerState};
use chainforge_driver::{cloud, Terraform, Workspace, IP_ADDRESS_OUTPUT};
use tracing::{debug, warn};

use crate::context::StepContext;
use crate::error::EngineError;

// ── ServerProvisioner ─────────────────────────────────────────────────────────

/// Materialises a requested server through the infrastructure tool.
///
/// Builds (or restores) a workspace for the server, runs init, plan and
/// apply, extracts the address output and persists the updated server with a
/// fresh workspace snapshot.
pub struct ServerProvisioner {
    terraform: Terraform,
}

impl ServerProvisioner {
    pub fn new(terraform: Terraform) -> Self {
        ServerProvisioner { terraform }
    }

    pub async fn provision(
        &self,
        ctx: &mut StepContext,
        settings: &ProviderSettings,
        server: &mut Server,
    ) -> Result<(), EngineError> {
        if server.state != ServerState::Requested {
            return Err(EngineError::ServerNotReadyForProvisioning);
        }

        let workspace = match &server.workspace_snapshot {
            Some(snapshot) => Workspace::restore(snapshot)?,
            None => setup_workspace(settings, server)?,
        };

        let result = self.run(&workspace, server).await;

        debug!("cleaning up workspace");
        if let Err(e) = workspace.close() {
            warn!(error = %e, "failed cleaning up workspace");
        }
        result?;

        ctx.tx().update_server(server);
        Ok(())
    }

    async fn run(&self, workspace: &Workspace, server: &mut Server) -> Result<(), EngineError> {
        debug!("running terraform init");
        self.terraform.init(workspace).await?;

        debug!("running terraform plan");
        self.terraform.plan(workspace).await?;

        debug!("running terraform apply");
        self.terraform.apply(workspace).await?;

        debug!("running terraform output");
        let raw_ip = self.terraform.output(workspace, IP_ADDRESS_OUTPUT).await?;
        let ip: IpAddr = raw_ip
            .parse()
            .map_err(|_| EngineError::InvalidServerIp(raw_ip.clone()))?;

        debug!(ip = %ip, "server provisioned");

        server.ip_address = Some(ip);
        server.state = ServerState::Ok;
        server.workspace_snapshot = Some(workspace.snapshot()?);

        Ok(())
    }
}

fn setup_workspace(
    settings: &ProviderSettings,
    server: &Server,
) -> Result<Workspace, EngineError> {
    let mut workspace = Workspace::create()?;
    debug!(dir = %workspace.work_dir().display(), "created workspace");

    cloud::register_provider(&mut workspace, settings)?;
    cloud::add_server(&mut workspace, server)?;
    workspace.flush()?;

    Ok(workspace)
}
