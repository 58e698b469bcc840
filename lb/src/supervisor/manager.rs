//! AgentSupervisor - one external agent process per ticket

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::Ticket;
use crate::events::{StatusBus, StatusEmitter};
use crate::prd::{GateError, check_executable};

use super::output::{ChunkDecoder, LineSplitter, is_iteration_marker};
use super::process::{AgentCommand, spawn_agent};
use super::run_state::{DEFAULT_LOG_CAP, RunState, RunStatus};

const READ_BUF_SIZE: usize = 8192;

/// Configuration for the supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub command: AgentCommand,
    /// Delay between SIGTERM and SIGKILL on stop
    pub grace_period: Duration,
    /// Characters of output kept per run
    pub log_cap: usize,
    /// Hidden directory inside the workspace holding the prompt
    pub prompt_dir: String,
    pub prompt_file: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            command: AgentCommand::new("claude", vec!["--print".to_string()]),
            grace_period: Duration::from_millis(500),
            log_cap: DEFAULT_LOG_CAP,
            prompt_dir: ".loopboard".to_string(),
            prompt_file: "PROMPT.md".to_string(),
        }
    }
}

impl SupervisorConfig {
    pub fn with_command(command: AgentCommand) -> Self {
        Self {
            command,
            ..Default::default()
        }
    }
}

/// What `execute` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// A new run was started (its process may still fail to spawn; that is
    /// reported through the status stream)
    Started,
    /// A run for this ticket is already live; nothing was changed
    AlreadyRunning,
}

type RunSlot = Arc<Mutex<RunState>>;

/// Spawns and supervises agent processes
///
/// Cheap to clone. Each ticket's [`RunState`] sits behind its own lock, so
/// runs for different tickets never contend.
#[derive(Clone)]
pub struct AgentSupervisor {
    config: Arc<SupervisorConfig>,
    runs: Arc<RwLock<HashMap<String, RunSlot>>>,
    bus: StatusBus,
    /// Pending SIGKILL escalations; awaited by [`Self::wait_for_terminations`]
    escalations: Arc<Mutex<JoinSet<()>>>,
}

impl AgentSupervisor {
    pub fn new(config: SupervisorConfig, bus: StatusBus) -> Self {
        debug!(?config, "AgentSupervisor::new: called");
        Self {
            config: Arc::new(config),
            runs: Arc::new(RwLock::new(HashMap::new())),
            bus,
            escalations: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn bus(&self) -> &StatusBus {
        &self.bus
    }

    async fn slot(&self, ticket_id: &str) -> Option<RunSlot> {
        self.runs.read().await.get(ticket_id).cloned()
    }

    async fn slot_or_create(&self, ticket_id: &str) -> RunSlot {
        if let Some(slot) = self.slot(ticket_id).await {
            return slot;
        }
        let mut runs = self.runs.write().await;
        runs.entry(ticket_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(RunState::new(self.config.log_cap))))
            .clone()
    }

    fn prompt_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.config.prompt_dir).join(&self.config.prompt_file)
    }

    /// Start the agent for a ticket
    ///
    /// Fails only on the gate check. A second call while a run is live is a
    /// logged no-op.
    pub async fn execute(&self, ticket: &Ticket) -> Result<ExecuteOutcome, GateError> {
        debug!(ticket_id = %ticket.id, "AgentSupervisor::execute: called");
        check_executable(ticket)?;

        let (Some(prd), Some(workspace)) = (ticket.prd.as_ref(), ticket.worktree_path.as_deref()) else {
            // check_executable guarantees both
            return Err(GateError::NoWorkspace(ticket.id.clone()));
        };
        let workspace = PathBuf::from(workspace);

        let slot = self.slot_or_create(&ticket.id).await;
        let mut state = slot.lock().await;

        if state.running {
            info!(ticket_id = %ticket.id, "Run already in progress, ignoring execute");
            return Ok(ExecuteOutcome::AlreadyRunning);
        }

        let generation = state.begin(workspace.clone());
        let emitter = self.bus.emitter_for(ticket.id.clone());
        emitter.started();

        match self.launch(&workspace, &prd.content).await {
            Ok(child) => {
                state.pid = child.id();
                let (exit_tx, exit_rx) = watch::channel(false);
                state.exited = Some(exit_rx);
                info!(ticket_id = %ticket.id, pid = ?state.pid, generation, "Agent started");

                let run = RunTask {
                    slot: slot.clone(),
                    generation,
                    emitter,
                    exit_tx,
                    drain: self.config.grace_period,
                };
                tokio::spawn(run.supervise(child));
            }
            Err(e) => {
                warn!(ticket_id = %ticket.id, error = %e, "Failed to start agent");
                state.log.push(&format!("[spawn error] {}\n", e));
                state.running = false;
                emitter.finished(state.iteration);
            }
        }

        Ok(ExecuteOutcome::Started)
    }

    /// Write the prompt into the workspace, spawn the agent and feed it the
    /// prompt on stdin
    async fn launch(&self, workspace: &Path, prompt: &str) -> std::io::Result<Child> {
        let prompt_path = self.prompt_path(workspace);
        debug!(?prompt_path, "AgentSupervisor::launch: writing prompt");
        if let Some(dir) = prompt_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&prompt_path, prompt).await?;

        let mut child = spawn_agent(&self.config.command, workspace)?;

        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                    debug!(error = %e, "AgentSupervisor::launch: agent closed stdin early");
                }
                // dropping stdin closes the pipe
            });
        }
        Ok(child)
    }

    /// Stop a ticket's run
    ///
    /// Sends SIGTERM to the agent's process group, then SIGKILL after the
    /// grace period unless the process has exited. The run is reported as
    /// stopped immediately. Returns false when there was nothing to stop.
    pub async fn stop(&self, ticket_id: &str) -> bool {
        debug!(%ticket_id, "AgentSupervisor::stop: called");
        let Some(slot) = self.slot(ticket_id).await else {
            debug!(%ticket_id, "AgentSupervisor::stop: no run state");
            return false;
        };

        let mut state = slot.lock().await;
        if !state.running {
            debug!(%ticket_id, "AgentSupervisor::stop: not running");
            return false;
        }

        if let Some(pid) = state.pid {
            self.terminate(ticket_id, pid, state.exited.clone()).await;
        }

        state.running = false;
        info!(%ticket_id, iteration = state.iteration, "Run stopped");
        self.bus.emitter_for(ticket_id).finished(state.iteration);
        true
    }

    #[cfg(unix)]
    async fn terminate(&self, ticket_id: &str, pid: u32, exited: Option<watch::Receiver<bool>>) {
        use super::process::{Signal, signal_group};

        debug!(%ticket_id, pid, "AgentSupervisor::terminate: sending SIGTERM");
        signal_group(pid, Signal::SIGTERM);

        let grace = self.config.grace_period;
        let ticket_id = ticket_id.to_string();
        let mut escalations = self.escalations.lock().await;
        while escalations.try_join_next().is_some() {}
        escalations.spawn(async move {
            let exited_in_time = match exited {
                Some(mut rx) => tokio::time::timeout(grace, rx.wait_for(|done| *done)).await.is_ok(),
                None => {
                    tokio::time::sleep(grace).await;
                    false
                }
            };
            if !exited_in_time {
                debug!(%ticket_id, pid, "AgentSupervisor::terminate: grace period elapsed, sending SIGKILL");
                signal_group(pid, Signal::SIGKILL);
            }
        });
    }

    #[cfg(not(unix))]
    async fn terminate(&self, ticket_id: &str, pid: u32, _exited: Option<watch::Receiver<bool>>) {
        warn!(%ticket_id, pid, "Process-group termination is only supported on unix");
    }

    /// Wait until every stop has either seen its process exit or sent SIGKILL
    ///
    /// Call before the runtime shuts down, otherwise a pending escalation is
    /// dropped and an agent ignoring SIGTERM outlives the caller.
    pub async fn wait_for_terminations(&self) {
        let mut escalations = std::mem::take(&mut *self.escalations.lock().await);
        debug!(pending = escalations.len(), "AgentSupervisor::wait_for_terminations: called");
        while let Some(result) = escalations.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Termination task failed");
            }
        }
    }

    /// Current status; unknown tickets report an idle, empty run
    pub async fn get_status(&self, ticket_id: &str) -> RunStatus {
        debug!(%ticket_id, "AgentSupervisor::get_status: called");
        match self.slot(ticket_id).await {
            Some(slot) => slot.lock().await.status(),
            None => RunStatus::default(),
        }
    }

    /// Workspace used by the ticket's latest run
    pub async fn workspace(&self, ticket_id: &str) -> Option<PathBuf> {
        let slot = self.slot(ticket_id).await?;
        let state = slot.lock().await;
        Some(state.workspace.clone()).filter(|p| !p.as_os_str().is_empty())
    }

    /// Ids of tickets with a live run
    pub async fn running_tickets(&self) -> Vec<String> {
        let slots: Vec<(String, RunSlot)> = self
            .runs
            .read()
            .await
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut running = Vec::new();
        for (id, slot) in slots {
            if slot.lock().await.running {
                running.push(id);
            }
        }
        running.sort();
        running
    }
}

/// Drives one spawned process until its output is drained and it has exited
struct RunTask {
    slot: RunSlot,
    generation: u64,
    emitter: StatusEmitter,
    exit_tx: watch::Sender<bool>,
    /// How long to keep reading after exit when a descendant holds the pipes
    drain: Duration,
}

impl RunTask {
    async fn supervise(self, mut child: Child) {
        let ticket_id = self.emitter.ticket_id().to_string();
        debug!(%ticket_id, generation = self.generation, "RunTask::supervise: started");

        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();
        let mut out_buf = vec![0u8; READ_BUF_SIZE];
        let mut err_buf = vec![0u8; READ_BUF_SIZE];
        let mut out_decoder = ChunkDecoder::default();
        let mut err_decoder = ChunkDecoder::default();
        let mut lines = LineSplitter::default();

        let mut status: Option<ExitStatus> = None;
        let mut drain_deadline: Option<Instant> = None;

        while stdout.is_some() || stderr.is_some() || status.is_none() {
            tokio::select! {
                read = read_chunk(&mut stdout, &mut out_buf) => match read {
                    Ok(n) if n > 0 => {
                        let text = out_decoder.decode(&out_buf[..n]);
                        self.on_stdout(&text, &mut lines).await;
                    }
                    result => {
                        if let Err(e) = result {
                            debug!(%ticket_id, error = %e, "RunTask::supervise: stdout read failed");
                        }
                        stdout = None;
                        let text = out_decoder.finish();
                        self.on_stdout(&text, &mut lines).await;
                        if let Some(line) = lines.finish() {
                            self.on_lines(&[line]).await;
                        }
                    }
                },
                read = read_chunk(&mut stderr, &mut err_buf) => match read {
                    Ok(n) if n > 0 => {
                        let text = err_decoder.decode(&err_buf[..n]);
                        self.on_stderr(&text).await;
                    }
                    result => {
                        if let Err(e) = result {
                            debug!(%ticket_id, error = %e, "RunTask::supervise: stderr read failed");
                        }
                        stderr = None;
                        let text = err_decoder.finish();
                        self.on_stderr(&text).await;
                    }
                },
                waited = child.wait(), if status.is_none() => {
                    match waited {
                        Ok(exit) => {
                            debug!(%ticket_id, %exit, "RunTask::supervise: process exited");
                            status = Some(exit);
                        }
                        Err(e) => {
                            warn!(%ticket_id, error = %e, "Failed to wait for agent");
                            status = Some(ExitStatus::default());
                        }
                    }
                    let _ = self.exit_tx.send(true);
                    drain_deadline = Some(Instant::now() + self.drain);
                },
                _ = sleep_until_opt(drain_deadline) => {
                    debug!(%ticket_id, "RunTask::supervise: output still open after exit, abandoning streams");
                    break;
                }
            }
        }

        self.on_exit(status).await;
    }

    async fn on_stdout(&self, text: &str, lines: &mut LineSplitter) {
        if text.is_empty() {
            return;
        }
        let complete = lines.push(text);
        let mut state = self.slot.lock().await;
        if !state.is_current(self.generation) {
            return;
        }
        state.log.push(text);
        self.count_markers(&mut state, &complete);
    }

    async fn on_lines(&self, lines: &[String]) {
        let mut state = self.slot.lock().await;
        if state.is_current(self.generation) {
            self.count_markers(&mut state, lines);
        }
    }

    fn count_markers(&self, state: &mut RunState, lines: &[String]) {
        if !state.running {
            return;
        }
        for line in lines.iter().filter(|l| is_iteration_marker(l)) {
            state.iteration += 1;
            self.emitter.iteration(state.iteration);
        }
    }

    async fn on_stderr(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.slot.lock().await;
        if state.is_current(self.generation) {
            state.log.push(text);
        }
    }

    async fn on_exit(&self, status: Option<ExitStatus>) {
        let mut state = self.slot.lock().await;
        if !state.is_current(self.generation) {
            debug!(ticket_id = %self.emitter.ticket_id(), "RunTask::on_exit: stale generation");
            return;
        }

        state.pid = None;
        if let Some(status) = status.filter(|s| !s.success()) {
            state.log.push(&format!("\n[process exited: {}]\n", status));
        }

        if state.running {
            state.running = false;
            info!(ticket_id = %self.emitter.ticket_id(), iteration = state.iteration, "Agent finished");
            self.emitter.finished(state.iteration);
        }
    }
}

/// Read from an optional stream; a closed stream never resolves
async fn read_chunk<R: AsyncRead + Unpin>(stream: &mut Option<R>, buf: &mut [u8]) -> std::io::Result<usize> {
    match stream {
        Some(s) => s.read(buf).await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
