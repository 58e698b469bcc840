//! Workspace creation: directory, git checkout and manifest

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::Ticket;
use crate::prompts::PromptLoader;

use super::slug::slugify;

/// Error types for provisioning
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Ticket {0} has no worktree base path")]
    MissingBasePath(String),

    #[error("Title {0:?} does not yield a usable directory name")]
    EmptySlug(String),

    #[error("Failed to create workspace {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git init failed in {path}: {message}")]
    GitInit { path: PathBuf, message: String },

    #[error("Failed to write manifest {path}: {message}")]
    Manifest { path: PathBuf, message: String },
}

/// Configuration for the provisioner
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// File name of the manifest written at the workspace root
    pub manifest_file: String,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            manifest_file: "TICKET.md".to_string(),
        }
    }
}

/// Creates per-ticket workspaces
pub struct WorktreeProvisioner {
    config: ProvisionerConfig,
    prompts: Arc<PromptLoader>,
}

impl WorktreeProvisioner {
    pub fn new(config: ProvisionerConfig, prompts: Arc<PromptLoader>) -> Self {
        debug!(?config, "WorktreeProvisioner::new: called");
        Self { config, prompts }
    }

    /// Workspace path a ticket would be provisioned at
    pub fn workspace_path(ticket: &Ticket) -> Result<PathBuf, ProvisioningError> {
        let base = ticket
            .worktree_base_path
            .as_deref()
            .ok_or_else(|| ProvisioningError::MissingBasePath(ticket.id.clone()))?;
        let slug = slugify(&ticket.title);
        if slug.is_empty() {
            debug!(title = %ticket.title, "WorktreeProvisioner::workspace_path: empty slug");
            return Err(ProvisioningError::EmptySlug(ticket.title.clone()));
        }
        Ok(Path::new(base).join(slug))
    }

    /// Provision a workspace for the ticket and return its absolute path
    ///
    /// Re-provisioning an existing directory is allowed: `git init` is
    /// idempotent and the manifest is rewritten.
    pub async fn provision(&self, ticket: &Ticket) -> Result<PathBuf, ProvisioningError> {
        debug!(ticket_id = %ticket.id, "WorktreeProvisioner::provision: called");
        let path = Self::workspace_path(ticket)?;

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|source| ProvisioningError::CreateFailed {
                path: path.clone(),
                source,
            })?;

        let path = tokio::fs::canonicalize(&path)
            .await
            .map_err(|source| ProvisioningError::CreateFailed {
                path: path.clone(),
                source,
            })?;
        debug!(?path, "WorktreeProvisioner::provision: directory ready");

        self.git_init(&path).await?;
        self.write_manifest(&path, ticket).await?;

        info!(ticket_id = %ticket.id, ?path, "Provisioned workspace");
        Ok(path)
    }

    async fn git_init(&self, path: &Path) -> Result<(), ProvisioningError> {
        debug!(?path, "WorktreeProvisioner::git_init: called");
        let output = Command::new("git")
            .arg("init")
            .current_dir(path)
            .output()
            .await
            .map_err(|e| ProvisioningError::GitInit {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            debug!("WorktreeProvisioner::git_init: git init failed");
            return Err(ProvisioningError::GitInit {
                path: path.to_path_buf(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    async fn write_manifest(&self, path: &Path, ticket: &Ticket) -> Result<(), ProvisioningError> {
        let manifest_path = path.join(&self.config.manifest_file);
        debug!(?manifest_path, "WorktreeProvisioner::write_manifest: called");

        let content = self
            .prompts
            .render_ticket("manifest", ticket)
            .map_err(|e| ProvisioningError::Manifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            })?;

        tokio::fs::write(&manifest_path, content)
            .await
            .map_err(|e| ProvisioningError::Manifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            })
    }
}
