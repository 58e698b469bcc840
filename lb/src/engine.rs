//! Engine - the loop engine facade
//!
//! Wires the ticket store, workspace provisioner, PRD gate and agent
//! supervisor together. Callers request execution by ticket id only; the
//! engine decides whether a workspace has to be provisioned first.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, PrdGeneratorKind};
use crate::domain::{NewTicket, Prd, Ticket, TicketPatch, TicketStatus};
use crate::events::{StatusBus, StatusEvent, spawn_status_logger};
use crate::prd::{CommandPrdGenerator, GateError, PrdError, PrdGenerator, TemplatePrdGenerator, can_execute};
use crate::prompts::PromptLoader;
use crate::state::{Columns, StoreError, TicketEvent, TicketStore};
use crate::supervisor::{AgentSupervisor, AutoTransition, AutoTransitionHandle, ExecuteOutcome, RunStatus};
use crate::worktree::{ProvisioningError, WorktreeProvisioner};

/// Errors surfaced synchronously by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Prd(#[from] PrdError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Loop engine facade
pub struct Engine {
    store: TicketStore,
    supervisor: AgentSupervisor,
    provisioner: WorktreeProvisioner,
    prd_generator: Arc<dyn PrdGenerator>,
    default_base_dir: Option<PathBuf>,
    auto_transition: AutoTransitionHandle,
    background: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Assemble an engine and start the auto-transition subscriber
    pub fn new(
        store: TicketStore,
        supervisor: AgentSupervisor,
        provisioner: WorktreeProvisioner,
        prd_generator: Arc<dyn PrdGenerator>,
    ) -> Self {
        debug!("Engine::new: called");
        let auto_transition = AutoTransition::spawn(store.clone(), supervisor.bus());
        Self {
            store,
            supervisor,
            provisioner,
            prd_generator,
            default_base_dir: None,
            auto_transition,
            background: Vec::new(),
        }
    }

    /// Base directory applied to tickets without one when they execute
    pub fn with_default_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.default_base_dir = dir;
        self
    }

    /// Build the whole engine from configuration
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        use eyre::Context;

        debug!("Engine::from_config: called");
        let store = TicketStore::spawn(config.store.store_config()).context("Failed to open ticket store")?;
        let bus = StatusBus::default();
        let supervisor = AgentSupervisor::new(config.agent.supervisor_config(), bus.clone());
        let prompts = Arc::new(PromptLoader::new(config.templates_dir.as_ref()));
        let provisioner = WorktreeProvisioner::new(config.worktree.provisioner_config(), prompts.clone());

        let prd_generator: Arc<dyn PrdGenerator> = match config.prd.generator {
            PrdGeneratorKind::Template => Arc::new(TemplatePrdGenerator::new(prompts)),
            PrdGeneratorKind::Command => Arc::new(CommandPrdGenerator::new(
                config.prd.command.clone(),
                Duration::from_millis(config.prd.timeout_ms),
                prompts,
            )),
        };

        let mut engine = Self::new(store, supervisor, provisioner, prd_generator)
            .with_default_base_dir(config.worktree.default_base_dir.clone());

        if let Some(log_dir) = &config.events.log_dir {
            info!(log_dir = %log_dir.display(), "Logging status events");
            engine.background.push(spawn_status_logger(&bus, log_dir));
        }
        Ok(engine)
    }

    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    pub fn supervisor(&self) -> &AgentSupervisor {
        &self.supervisor
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.supervisor.bus().subscribe()
    }

    pub fn subscribe_tickets(&self) -> broadcast::Receiver<TicketEvent> {
        self.store.subscribe_events()
    }

    // === Tickets ===

    pub async fn create_ticket(&self, ticket: NewTicket) -> EngineResult<Ticket> {
        Ok(self.store.create(ticket).await?)
    }

    pub async fn get_ticket(&self, id: &str) -> EngineResult<Ticket> {
        Ok(self.store.get_required(id).await?)
    }

    pub async fn list_tickets(&self, status: Option<TicketStatus>) -> EngineResult<Vec<Ticket>> {
        Ok(self.store.list(status).await?)
    }

    pub async fn update_ticket(&self, id: &str, patch: TicketPatch) -> EngineResult<Ticket> {
        Ok(self.store.update(id, patch).await?)
    }

    /// Delete a ticket, stopping its run first
    pub async fn delete_ticket(&self, id: &str) -> EngineResult<Ticket> {
        debug!(%id, "Engine::delete_ticket: called");
        self.supervisor.stop(id).await;
        Ok(self.store.delete(id).await?)
    }

    pub async fn transition(&self, id: &str, target: TicketStatus) -> EngineResult<Ticket> {
        Ok(self.store.transition(id, target).await?)
    }

    pub async fn reorder(&self, id: &str, target: TicketStatus, index: usize) -> EngineResult<Columns> {
        Ok(self.store.reorder(id, target, index).await?)
    }

    pub async fn set_worktree_base_path(&self, id: &str, path: impl Into<String>) -> EngineResult<Ticket> {
        Ok(self.store.set_worktree_base_path(id, path).await?)
    }

    // === PRD ===

    /// Generate a PRD and attach it unapproved, replacing any previous one
    pub async fn generate_prd(&self, id: &str) -> EngineResult<Ticket> {
        debug!(%id, "Engine::generate_prd: called");
        let ticket = self.store.get_required(id).await?;
        let content = self.prd_generator.generate(&ticket).await?;
        Ok(self.store.set_prd(id, Prd::new(content)).await?)
    }

    pub async fn approve_prd(&self, id: &str) -> EngineResult<Ticket> {
        Ok(self.store.set_prd_approval(id, true).await?)
    }

    /// Mark the PRD not approved; its content is kept
    pub async fn reject_prd(&self, id: &str) -> EngineResult<Ticket> {
        Ok(self.store.set_prd_approval(id, false).await?)
    }

    // === Execution ===

    /// Run the agent for a ticket, provisioning its workspace on first use
    pub async fn execute(&self, id: &str) -> EngineResult<ExecuteOutcome> {
        debug!(%id, "Engine::execute: called");
        let mut ticket = self.store.get_required(id).await?;

        if !can_execute(&ticket) {
            debug!(%id, "Engine::execute: gate closed");
            return Err(GateError::PrdNotApproved(ticket.id).into());
        }

        if ticket.worktree_path.is_none() {
            ticket = self.provision(ticket).await?;
        } else {
            debug!(%id, "Engine::execute: reusing workspace");
        }

        Ok(self.supervisor.execute(&ticket).await?)
    }

    async fn provision(&self, mut ticket: Ticket) -> EngineResult<Ticket> {
        debug!(id = %ticket.id, "Engine::provision: called");
        if ticket.worktree_base_path.is_none() {
            if let Some(dir) = &self.default_base_dir {
                debug!(id = %ticket.id, "Engine::provision: applying default base dir");
                ticket = self
                    .store
                    .set_worktree_base_path(&ticket.id, dir.to_string_lossy())
                    .await?;
            }
        }

        let path = self.provisioner.provision(&ticket).await?;
        Ok(self
            .store
            .set_worktree_path(&ticket.id, path.to_string_lossy())
            .await?)
    }

    /// Stop a ticket's run; false when nothing was running
    pub async fn stop(&self, id: &str) -> bool {
        self.supervisor.stop(id).await
    }

    pub async fn status(&self, id: &str) -> RunStatus {
        self.supervisor.get_status(id).await
    }

    /// Stop every live run, then flush and close the store
    ///
    /// Runs ended here still get the auto-transition, and agents that ignore
    /// SIGTERM are killed before this returns.
    pub async fn shutdown(self) -> EngineResult<()> {
        let running = self.supervisor.running_tickets().await;
        info!(count = running.len(), "Engine shutting down");
        futures::future::join_all(running.iter().map(|id| self.supervisor.stop(id))).await;

        self.auto_transition.sync().await;
        self.supervisor.wait_for_terminations().await;

        self.store.shutdown().await?;
        self.auto_transition.task.abort();
        for handle in &self.background {
            handle.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StoreConfig;
    use crate::supervisor::{AgentCommand, SupervisorConfig};
    use crate::worktree::ProvisionerConfig;
    use tempfile::tempdir;

    fn engine(dir: &std::path::Path, script: &str) -> Engine {
        let store = TicketStore::spawn(StoreConfig::new(dir.join("tickets.json"))).unwrap();
        let supervisor = AgentSupervisor::new(
            SupervisorConfig::with_command(AgentCommand::shell(script)),
            StatusBus::new(64),
        );
        let prompts = Arc::new(PromptLoader::embedded_only());
        let provisioner = WorktreeProvisioner::new(ProvisionerConfig::default(), prompts.clone());
        Engine::new(store, supervisor, provisioner, Arc::new(TemplatePrdGenerator::new(prompts)))
    }

    #[tokio::test]
    async fn test_prd_lifecycle() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path(), "true");
        let ticket = engine.create_ticket(NewTicket::titled("Search")).await.unwrap();

        let with_prd = engine.generate_prd(&ticket.id).await.unwrap();
        let prd = with_prd.prd.unwrap();
        assert!(prd.content.starts_with("# PRD: Search"));
        assert!(!prd.approved);

        assert!(engine.approve_prd(&ticket.id).await.unwrap().has_approved_prd());

        let rejected = engine.reject_prd(&ticket.id).await.unwrap();
        assert!(!rejected.has_approved_prd());
        assert_eq!(rejected.prd.unwrap().content, prd.content);
    }

    #[tokio::test]
    async fn test_execute_without_prd_is_gated() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path(), "true");
        let ticket = engine.create_ticket(NewTicket::titled("Gated")).await.unwrap();

        let err = engine.execute(&ticket.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Gate(GateError::PrdNotApproved(_))));
        assert!(engine.get_ticket(&ticket.id).await.unwrap().worktree_path.is_none());
    }

    #[tokio::test]
    async fn test_execute_without_base_dir_fails_provisioning() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path(), "true");
        let ticket = engine.create_ticket(NewTicket::titled("Nowhere")).await.unwrap();
        engine.generate_prd(&ticket.id).await.unwrap();
        engine.approve_prd(&ticket.id).await.unwrap();

        let err = engine.execute(&ticket.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Provisioning(ProvisioningError::MissingBasePath(_))));
    }

    #[tokio::test]
    async fn test_execute_applies_default_base_dir() {
        let temp = tempdir().unwrap();
        let base = temp.path().join("work");
        let engine = engine(temp.path(), "true").with_default_base_dir(Some(base.clone()));
        let ticket = engine.create_ticket(NewTicket::titled("Default Base")).await.unwrap();
        engine.generate_prd(&ticket.id).await.unwrap();
        engine.approve_prd(&ticket.id).await.unwrap();

        assert_eq!(engine.execute(&ticket.id).await.unwrap(), ExecuteOutcome::Started);

        let stored = engine.get_ticket(&ticket.id).await.unwrap();
        assert_eq!(stored.worktree_base_path.as_deref(), Some(&*base.to_string_lossy()));
        let workspace = PathBuf::from(stored.worktree_path.unwrap());
        assert!(workspace.ends_with("default-base"));
        assert!(workspace.join("TICKET.md").is_file());
    }

    #[tokio::test]
    async fn test_shutdown_stops_runs_and_persists() {
        let temp = tempdir().unwrap();
        let engine = engine(temp.path(), "sleep 30");
        let ticket = engine.create_ticket(NewTicket::titled("Long")).await.unwrap();
        engine
            .set_worktree_base_path(&ticket.id, temp.path().to_string_lossy())
            .await
            .unwrap();
        engine.generate_prd(&ticket.id).await.unwrap();
        engine.approve_prd(&ticket.id).await.unwrap();
        engine.execute(&ticket.id).await.unwrap();
        assert!(engine.status(&ticket.id).await.running);

        let supervisor = engine.supervisor().clone();
        engine.shutdown().await.unwrap();
        assert!(!supervisor.get_status(&ticket.id).await.running);

        let reloaded = TicketStore::spawn(StoreConfig::new(temp.path().join("tickets.json"))).unwrap();
        let ticket = reloaded.get_required(&ticket.id).await.unwrap();
        assert!(ticket.worktree_path.is_some());
        assert!(ticket.has_approved_prd());
    }
}
