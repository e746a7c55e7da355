use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::DriverError;
use crate::workspace::Workspace;

const TOOL: &str = "terraform";

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerraformConfig {
    pub path: PathBuf,
}

impl Default for TerraformConfig {
    fn default() -> Self {
        TerraformConfig {
            path: PathBuf::from("/usr/local/bin/terraform"),
        }
    }
}

// ── Terraform ─────────────────────────────────────────────────────────────────

/// Thin wrapper over the infrastructure-as-code command line tool.
///
/// All commands run non-interactively with colour disabled and the working
/// directory set to the workspace; any non-zero exit is wrapped with the full
/// argument list and captured stderr.
#[derive(Debug, Clone)]
pub struct Terraform {
    path: PathBuf,
}

impl Terraform {
    pub fn new(config: &TerraformConfig) -> Self {
        Terraform {
            path: config.path.clone(),
        }
    }

    /// `init` must run in every workspace before `plan` or `apply`.
    pub async fn init(&self, workspace: &Workspace) -> Result<(), DriverError> {
        let out = self
            .exec(Some(workspace.work_dir()), &["init", "-no-color", "-input=false"])
            .await?;
        debug!(stdout = %out, "terraform init");
        Ok(())
    }

    /// Create an execution plan for the flushed definitions, saved as a plan
    /// file inside the workspace.
    pub async fn plan(&self, workspace: &Workspace) -> Result<(), DriverError> {
        let out = self
            .exec(
                Some(workspace.work_dir()),
                &["plan", "-out=tfplan", "-no-color", "-input=false"],
            )
            .await?;
        debug!(stdout = %out, "terraform plan");
        Ok(())
    }

    /// Apply the plan file produced by [`plan`](Terraform::plan).
    pub async fn apply(&self, workspace: &Workspace) -> Result<(), DriverError> {
        let out = self
            .exec(
                Some(workspace.work_dir()),
                &["apply", "-no-color", "-input=false", "tfplan"],
            )
            .await?;
        debug!(stdout = %out, "terraform apply");
        Ok(())
    }

    /// Read a declared output by name. Only valid after a successful apply.
    pub async fn output(&self, workspace: &Workspace, name: &str) -> Result<String, DriverError> {
        let out = self
            .exec(Some(workspace.work_dir()), &["output", "-no-color", name])
            .await?;
        debug!(stdout = %out, "terraform output");
        Ok(out.trim().to_string())
    }

    /// Destroy everything tracked by the workspace's state file.
    pub async fn destroy(&self, workspace: &Workspace) -> Result<(), DriverError> {
        let out = self
            .exec(
                Some(workspace.work_dir()),
                &["destroy", "-no-color", "-auto-approve"],
            )
            .await?;
        debug!(stdout = %out, "terraform destroy");
        Ok(())
    }

    /// Version of the underlying binary; doubles as a health check.
    pub async fn version(&self) -> Result<String, DriverError> {
        let out = self.exec(None, &["version"]).await?;

        let first_line = out.lines().next().unwrap_or_default();
        let parts: Vec<&str> = first_line.split_whitespace().collect();
        if parts.len() != 2 {
            return Ok(first_line.to_string());
        }

        Ok(parts[1].trim_start_matches('v').to_string())
    }

    async fn exec(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, DriverError> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args)
            .env("TF_IN_AUTOMATION", "true")
            .stdin(Stdio::null());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| DriverError::Spawn {
            tool: TOOL,
            args: args.join(" "),
            source: e,
        })?;

        if !output.status.success() {
            return Err(DriverError::CommandFailed {
                tool: TOOL,
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
