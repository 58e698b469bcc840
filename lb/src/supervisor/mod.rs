//! Agent process supervision
//!
//! [`AgentSupervisor`] runs at most one external agent per ticket, rooted at
//! the ticket's workspace, in its own process group. Output drives an
//! iteration counter and a capped rolling log; every change is published on
//! the [`StatusBus`](crate::events::StatusBus). [`AutoTransition`] is an
//! independent subscriber that moves finished tickets to testing.

mod auto_transition;
mod manager;
mod output;
mod process;
mod run_state;

pub use auto_transition::{AutoTransition, AutoTransitionHandle};
pub use manager::{AgentSupervisor, ExecuteOutcome, SupervisorConfig};
pub use output::{ChunkDecoder, LineSplitter, is_iteration_marker};
pub use process::{AgentCommand, SignalOutcome, spawn_agent};
pub use run_state::{DEFAULT_LOG_CAP, RollingLog, RunState, RunStatus};
