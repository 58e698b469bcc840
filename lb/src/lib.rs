//! Loopboard - ticket board that runs coding agents in per-ticket workspaces
//!
//! Tickets move through a fixed status state machine. Once a ticket's PRD is
//! approved, the loop engine provisions a git workspace for it, spawns an
//! external agent process there and supervises it, counting progress
//! markers in its output. When the run ends the ticket moves to testing.
//!
//! # Modules
//!
//! - [`domain`] - Ticket, status state machine, PRD
//! - [`state`] - Ticket store actor with debounced JSON persistence
//! - [`worktree`] - Workspace provisioning
//! - [`prd`] - PRD generation and the execution gate
//! - [`supervisor`] - Agent process supervision and auto-transition
//! - [`events`] - Status event bus and JSONL logger
//! - [`engine`] - Facade wiring it all together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod prd;
pub mod prompts;
pub mod state;
pub mod supervisor;
pub mod worktree;

// Re-export commonly used types
pub use config::Config;
pub use domain::{HistoryEvent, NewTicket, Prd, Priority, Ticket, TicketPatch, TicketStatus, TicketType, ValidationError};
pub use engine::{Engine, EngineError, EngineResult};
pub use events::{StatusBus, StatusEmitter, StatusEvent, StatusLogger, read_status_log, spawn_status_logger};
pub use prd::{CommandPrdGenerator, GateError, PrdError, PrdGenerator, TemplatePrdGenerator, can_execute};
pub use prompts::PromptLoader;
pub use state::{Columns, StoreConfig, StoreError, TicketEvent, TicketStore};
pub use supervisor::{
    AgentCommand, AgentSupervisor, AutoTransition, ExecuteOutcome, RollingLog, RunStatus, SupervisorConfig,
};
pub use worktree::{ProvisionerConfig, ProvisioningError, WorktreeProvisioner, slugify};
