use std::fs;
use std::path::{Path, PathBuf};

use chainforge_domain::WorkspaceSnapshot;
use uuid::Uuid;

use crate::error::DriverError;
use crate::render::{render_resource, Render, Resource};

/// Rendered definitions file inside a workspace.
pub const DEFINITIONS_FILE: &str = "main.tf";
/// Plan artefact emitted by `plan` and consumed by `apply`.
pub const PLAN_FILE: &str = "tfplan";
/// State file maintained by the infrastructure tool.
pub const STATE_FILE: &str = "terraform.tfstate";

// ── Workspace ─────────────────────────────────────────────────────────────────

/// A private scratch directory for one infrastructure-tool invocation.
///
/// Callers append renderable definitions and `flush` them to disk; after the
/// tool has run, `snapshot` captures the three on-disk artefacts so the
/// workspace can be rebuilt later with [`Workspace::restore`]. Restored
/// workspaces are read-only on the definition side: appending or flushing one
/// is a programming error.
///
/// Workspaces are never shared and must be [`close`](Workspace::close)d on
/// every exit path.
#[derive(Debug)]
pub struct Workspace {
    work_dir: PathBuf,
    rendered: Vec<String>,
    restored: bool,
}

impl Workspace {
    /// Allocate a workspace in a fresh unique temporary directory.
    pub fn create() -> Result<Self, DriverError> {
        let work_dir = std::env::temp_dir().join(format!("chainforge-workspace-{}", Uuid::new_v4()));
        fs::create_dir_all(&work_dir)
            .map_err(|e| DriverError::Internal(format!("create workspace dir: {e}")))?;

        Ok(Workspace {
            work_dir,
            rendered: Vec::new(),
            restored: false,
        })
    }

    /// Rebuild a workspace from a snapshot, writing all three artefacts back
    /// to disk so the tool can re-execute against them.
    pub fn restore(snapshot: &WorkspaceSnapshot) -> Result<Self, DriverError> {
        let workspace = Workspace::create()?;

        workspace.write_file(DEFINITIONS_FILE, &snapshot.definitions)?;
        workspace.write_file(PLAN_FILE, &snapshot.plan)?;
        workspace.write_file(STATE_FILE, &snapshot.state)?;

        Ok(Workspace { restored: true, ..workspace })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Append a rendered definition. Panics on a restored workspace.
    pub fn add(&mut self, item: &dyn Render) {
        if self.restored {
            panic!("restored workspaces are read-only");
        }

        self.rendered.push(item.render());
    }

    /// Append a resource definition. Panics on a restored workspace.
    pub fn add_resource(&mut self, res: &dyn Resource) {
        if self.restored {
            panic!("restored workspaces are read-only");
        }

        self.rendered.push(render_resource(res));
    }

    /// Write all appended definitions into a single file inside the
    /// workspace. Panics on a restored workspace.
    pub fn flush(&self) -> Result<(), DriverError> {
        if self.restored {
            panic!("restored workspaces are read-only");
        }

        let mut content = String::new();
        for block in &self.rendered {
            content.push_str(block);
            content.push('\n');
        }

        self.write_file(DEFINITIONS_FILE, &content)
    }

    /// Capture the definitions, plan and state files into an in-memory
    /// snapshot for persistence alongside the server.
    pub fn snapshot(&self) -> Result<WorkspaceSnapshot, DriverError> {
        Ok(WorkspaceSnapshot {
            definitions: self.read_file(DEFINITIONS_FILE)?,
            plan: self.read_file(PLAN_FILE)?,
            state: self.read_file(STATE_FILE)?,
        })
    }

    /// Remove the workspace directory and everything in it.
    pub fn close(self) -> Result<(), DriverError> {
        fs::remove_dir_all(&self.work_dir)
            .map_err(|e| DriverError::Internal(format!("cleanup workspace dir: {e}")))
    }

    fn write_file(&self, name: &str, content: &str) -> Result<(), DriverError> {
        fs::write(self.work_dir.join(name), content)
            .map_err(|e| DriverError::Internal(format!("write {name}: {e}")))
    }

    fn read_file(&self, name: &str) -> Result<String, DriverError> {
        fs::read_to_string(self.work_dir.join(name))
            .map_err(|e| DriverError::Internal(format!("read {name}: {e}")))
    }
}
