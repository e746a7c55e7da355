use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use chainforge_domain::{Deployment, Server, SshKey};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::DriverError;

const TOOL: &str = "ansible-playbook";

/// Fixed entry playbook applied to every host.
const PLAYBOOK_ENTRY: &str = "site.yaml";

/// Exit code the tool uses for hosts it could not reach.
const EXIT_UNREACHABLE: i32 = 4;

// ── Config ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AnsibleConfig {
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Directory holding the playbooks, including the entry playbook.
    pub playbooks_dir: PathBuf,
    /// Private directory SSH key files are written under.
    #[serde(default = "default_keys_dir")]
    pub keys_dir: PathBuf,
}

fn default_path() -> PathBuf {
    PathBuf::from("/usr/local/bin/ansible-playbook")
}

fn default_keys_dir() -> PathBuf {
    std::env::temp_dir().join("chainforge-keys")
}

impl AnsibleConfig {
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.playbooks_dir.as_os_str().is_empty() {
            return Err(DriverError::Internal("missing ansible playbooks dir".into()));
        }

        Ok(())
    }
}

// ── Ansible ───────────────────────────────────────────────────────────────────

/// Thin wrapper over the configuration-management command line tool.
///
/// Runs the entry playbook against a single-host inventory, authenticating
/// with the server's private key written to a uniquely named file (mode
/// 0400) that is removed again after the run, whatever the outcome.
#[derive(Debug, Clone)]
pub struct Ansible {
    path: PathBuf,
    playbooks_dir: PathBuf,
    keys_dir: PathBuf,
}

impl Ansible {
    pub fn new(config: &AnsibleConfig) -> Self {
        Ansible {
            path: config.path.clone(),
            playbooks_dir: config.playbooks_dir.clone(),
            keys_dir: config.keys_dir.clone(),
        }
    }

    /// Apply the entry playbook to the server, passing the deployment's
    /// configuration as extra variables.
    pub async fn run_playbook(
        &self,
        server: &Server,
        deployment: &Deployment,
    ) -> Result<(), DriverError> {
        let ip = server
            .ip_address
            .ok_or_else(|| DriverError::Internal("server has no IP address".into()))?;

        let key_file = self.write_key_file(&server.ssh_key)?;
        let result = self.run_with_key(ip, &key_file, deployment).await;
        cleanup_key_file(&key_file);

        result
    }

    async fn run_with_key(
        &self,
        ip: IpAddr,
        key_file: &Path,
        deployment: &Deployment,
    ) -> Result<(), DriverError> {
        let inventory = format!("{ip},");
        let key_arg = key_file.display().to_string();
        let extra_vars = deployment
            .config
            .marshal_map()
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(" ");

        let out = self
            .exec(
                Some(&self.playbooks_dir),
                &[
                    "--inventory",
                    &inventory,
                    "--key-file",
                    &key_arg,
                    "--extra-vars",
                    &extra_vars,
                    PLAYBOOK_ENTRY,
                ],
            )
            .await?;
        debug!(stdout = %out, "ansible-playbook run");

        Ok(())
    }

    /// Version of the underlying binary; doubles as a health check.
    pub async fn version(&self) -> Result<String, DriverError> {
        let out = self.exec(Some(&self.playbooks_dir), &["--version"]).await?;

        let first_line = out.lines().next().unwrap_or_default();
        let parts: Vec<&str> = first_line.split_whitespace().collect();
        if parts.len() != 2 {
            return Ok(first_line.to_string());
        }

        Ok(parts[1].to_string())
    }

    async fn exec(&self, dir: Option<&Path>, args: &[&str]) -> Result<String, DriverError> {
        let mut cmd = Command::new(&self.path);
        cmd.args(args).stdin(Stdio::null());
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output().await.map_err(|e| DriverError::Spawn {
            tool: TOOL,
            args: args.join(" "),
            source: e,
        })?;

        if output.status.code() == Some(EXIT_UNREACHABLE) {
            return Err(DriverError::ServerUnreachable);
        }
        if !output.status.success() {
            return Err(DriverError::CommandFailed {
                tool: TOOL,
                args: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Write the private key under a unique name so concurrent runs never
    /// share a key file.
    fn write_key_file(&self, ssh_key: &SshKey) -> Result<PathBuf, DriverError> {
        fs::create_dir_all(&self.keys_dir)
            .map_err(|e| DriverError::Internal(format!("create keys dir: {e}")))?;

        let key_file = self.keys_dir.join(Uuid::new_v4().to_string());
        let pem = ssh_key
            .private_key_pem()
            .map_err(|e| DriverError::Internal(format!("encode private key: {e}")))?;

        fs::write(&key_file, pem)
            .map_err(|e| DriverError::Internal(format!("write private key: {e}")))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_file, fs::Permissions::from_mode(0o400))
                .map_err(|e| DriverError::Internal(format!("chmod private key: {e}")))?;
        }

        Ok(key_file)
    }
}

fn cleanup_key_file(key_file: &Path) {
    if let Err(e) = fs::remove_file(key_file) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %key_file.display(), error = %e, "failed cleaning up ssh key file");
        }
    }
}
