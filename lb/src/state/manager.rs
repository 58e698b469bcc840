//! TicketStore - actor that owns the ticket board
//!
//! Processes commands via channels for thread-safe access to persistent state.
//! Mutations mark the board dirty; the actor writes the snapshot once the
//! debounce window elapses, or immediately on `flush`/`shutdown`.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::{NewTicket, Prd, Ticket, TicketPatch, TicketStatus};

use super::board::TicketBoard;
use super::messages::{Columns, StoreCommand, StoreError, StoreResponse};
use super::snapshot::SnapshotFile;

/// Event broadcast after every successful mutation
#[derive(Debug, Clone)]
pub enum TicketEvent {
    Created(Ticket),
    Updated(Ticket),
    Deleted { id: String },
}

impl TicketEvent {
    pub fn ticket_id(&self) -> &str {
        match self {
            Self::Created(ticket) | Self::Updated(ticket) => &ticket.id,
            Self::Deleted { id } => id,
        }
    }
}

/// Where and how often the board is persisted
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub flush_debounce: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_debounce: Duration::from_millis(500),
        }
    }
}

/// Handle to send commands to the TicketStore actor
#[derive(Clone)]
pub struct TicketStore {
    tx: mpsc::Sender<StoreCommand>,
    /// Broadcast sender for ticket change notifications
    event_tx: broadcast::Sender<TicketEvent>,
}

impl TicketStore {
    /// Load the snapshot and spawn the actor
    pub fn spawn(config: StoreConfig) -> StoreResponse<Self> {
        debug!(path = %config.path.display(), "TicketStore::spawn: called");
        let snapshot = SnapshotFile::new(&config.path);
        let board = TicketBoard::from_tickets(snapshot.load()?);
        info!(tickets = board.len(), "Ticket board loaded");

        let (tx, rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);

        let actor = StoreActor {
            board,
            snapshot,
            debounce: config.flush_debounce,
            flush_at: None,
            event_tx: event_tx.clone(),
        };
        tokio::spawn(actor.run(rx));

        info!("TicketStore spawned");
        Ok(Self { tx, event_tx })
    }

    /// Subscribe to ticket change events
    pub fn subscribe_events(&self) -> broadcast::Receiver<TicketEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<StoreResponse<T>>) -> StoreCommand,
    ) -> StoreResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StoreError::ChannelError)?;
        reply_rx.await.map_err(|_| StoreError::ChannelError)?
    }

    // === Ticket CRUD ===

    pub async fn create(&self, ticket: NewTicket) -> StoreResponse<Ticket> {
        debug!(title = %ticket.title, "create: called");
        self.request(|reply| StoreCommand::Create { ticket, reply }).await
    }

    /// Insert a fully formed ticket (import, tests)
    pub async fn insert(&self, ticket: Ticket) -> StoreResponse<Ticket> {
        debug!(id = %ticket.id, "insert: called");
        self.request(|reply| StoreCommand::Insert { ticket, reply }).await
    }

    pub async fn get(&self, id: &str) -> StoreResponse<Option<Ticket>> {
        debug!(%id, "get: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::Get { id, reply }).await
    }

    /// Get a ticket by ID, returning error if not found
    pub async fn get_required(&self, id: &str) -> StoreResponse<Ticket> {
        self.get(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn list(&self, status_filter: Option<TicketStatus>) -> StoreResponse<Vec<Ticket>> {
        debug!(?status_filter, "list: called");
        self.request(|reply| StoreCommand::List { status_filter, reply }).await
    }

    pub async fn update(&self, id: &str, patch: TicketPatch) -> StoreResponse<Ticket> {
        debug!(%id, "update: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::Update { id, patch, reply }).await
    }

    pub async fn delete(&self, id: &str) -> StoreResponse<Ticket> {
        debug!(%id, "delete: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::Delete { id, reply }).await
    }

    // === Workflow ===

    /// The only sanctioned way to change a ticket's status
    pub async fn transition(&self, id: &str, target: TicketStatus) -> StoreResponse<Ticket> {
        debug!(%id, %target, "transition: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::Transition { id, target, reply }).await
    }

    pub async fn reorder(&self, id: &str, target: TicketStatus, index: usize) -> StoreResponse<Columns> {
        debug!(%id, %target, index, "reorder: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::Reorder {
            id,
            target,
            index,
            reply,
        })
        .await
    }

    // === Execution fields ===

    pub async fn set_prd(&self, id: &str, prd: Prd) -> StoreResponse<Ticket> {
        debug!(%id, "set_prd: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::SetPrd { id, prd, reply }).await
    }

    pub async fn set_prd_approval(&self, id: &str, approved: bool) -> StoreResponse<Ticket> {
        debug!(%id, approved, "set_prd_approval: called");
        let id = id.to_string();
        self.request(|reply| StoreCommand::SetPrdApproval { id, approved, reply })
            .await
    }

    pub async fn set_worktree_base_path(&self, id: &str, path: impl Into<String>) -> StoreResponse<Ticket> {
        let id = id.to_string();
        let path = path.into();
        debug!(%id, %path, "set_worktree_base_path: called");
        self.request(|reply| StoreCommand::SetWorktreeBasePath { id, path, reply })
            .await
    }

    pub async fn set_worktree_path(&self, id: &str, path: impl Into<String>) -> StoreResponse<Ticket> {
        let id = id.to_string();
        let path = path.into();
        debug!(%id, %path, "set_worktree_path: called");
        self.request(|reply| StoreCommand::SetWorktreePath { id, path, reply })
            .await
    }

    // === Persistence ===

    /// Write any pending mutations to disk now
    pub async fn flush(&self) -> StoreResponse<()> {
        debug!("flush: called");
        self.request(|reply| StoreCommand::Flush { reply }).await
    }

    /// Flush and stop the actor
    pub async fn shutdown(&self) -> StoreResponse<()> {
        debug!("shutdown: called");
        self.request(|reply| StoreCommand::Shutdown { reply }).await
    }
}

/// State owned by the actor task
struct StoreActor {
    board: TicketBoard,
    snapshot: SnapshotFile,
    debounce: Duration,
    /// Set while there are unpersisted mutations
    flush_at: Option<Instant>,
    event_tx: broadcast::Sender<TicketEvent>,
}

impl StoreActor {
    async fn run(mut self, mut rx: mpsc::Receiver<StoreCommand>) {
        debug!("StoreActor::run: actor started");

        loop {
            let deadline = self.flush_at;
            let cmd = tokio::select! {
                cmd = rx.recv() => cmd,
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    debug!("StoreActor::run: debounce window elapsed");
                    if let Err(e) = self.flush() {
                        error!(error = %e, "Failed to persist ticket board");
                    }
                    continue;
                }
            };

            let Some(cmd) = cmd else {
                debug!("StoreActor::run: all handles dropped");
                if let Err(e) = self.flush() {
                    error!(error = %e, "Failed to persist ticket board on close");
                }
                break;
            };

            if self.handle(cmd) {
                break;
            }
        }

        debug!("TicketStore actor stopped");
    }

    /// Process one command; returns true when the actor should stop
    fn handle(&mut self, cmd: StoreCommand) -> bool {
        match cmd {
            StoreCommand::Create { ticket, reply } => {
                debug!("StoreActor: Create command");
                let result = self.board.create(ticket);
                self.after_mutation(&result, TicketEvent::Created);
                let _ = reply.send(result);
            }

            StoreCommand::Insert { ticket, reply } => {
                debug!(id = %ticket.id, "StoreActor: Insert command");
                let result = self.board.insert(ticket);
                self.after_mutation(&result, TicketEvent::Created);
                let _ = reply.send(result);
            }

            StoreCommand::Get { id, reply } => {
                debug!(%id, "StoreActor: Get command");
                let _ = reply.send(Ok(self.board.get(&id).cloned()));
            }

            StoreCommand::List { status_filter, reply } => {
                debug!(?status_filter, "StoreActor: List command");
                let _ = reply.send(Ok(self.board.list(status_filter)));
            }

            StoreCommand::Update { id, patch, reply } => {
                debug!(%id, "StoreActor: Update command");
                let result = self.board.update(&id, patch);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::Delete { id, reply } => {
                debug!(%id, "StoreActor: Delete command");
                let result = self.board.remove(&id);
                self.after_mutation(&result, |t| TicketEvent::Deleted { id: t.id });
                // Remaining column members were renumbered
                if let Ok(removed) = &result {
                    for ticket in self.board.column(removed.status) {
                        let _ = self.event_tx.send(TicketEvent::Updated(ticket));
                    }
                }
                let _ = reply.send(result);
            }

            StoreCommand::Transition { id, target, reply } => {
                debug!(%id, %target, "StoreActor: Transition command");
                let result = self.board.transition(&id, target);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::Reorder {
                id,
                target,
                index,
                reply,
            } => {
                debug!(%id, %target, index, "StoreActor: Reorder command");
                let result = self.board.reorder(&id, target, index);
                if let Ok(columns) = &result {
                    self.mark_dirty();
                    for ticket in columns.values().flatten() {
                        let _ = self.event_tx.send(TicketEvent::Updated(ticket.clone()));
                    }
                }
                let _ = reply.send(result);
            }

            StoreCommand::SetPrd { id, prd, reply } => {
                debug!(%id, "StoreActor: SetPrd command");
                let result = self.board.set_prd(&id, prd);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::SetPrdApproval { id, approved, reply } => {
                debug!(%id, approved, "StoreActor: SetPrdApproval command");
                let result = self.board.set_prd_approval(&id, approved);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::SetWorktreeBasePath { id, path, reply } => {
                debug!(%id, %path, "StoreActor: SetWorktreeBasePath command");
                let result = self.board.set_worktree_base_path(&id, path);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::SetWorktreePath { id, path, reply } => {
                debug!(%id, %path, "StoreActor: SetWorktreePath command");
                let result = self.board.set_worktree_path(&id, path);
                self.after_mutation(&result, TicketEvent::Updated);
                let _ = reply.send(result);
            }

            StoreCommand::Flush { reply } => {
                debug!("StoreActor: Flush command");
                let _ = reply.send(self.flush());
            }

            StoreCommand::Shutdown { reply } => {
                debug!("StoreActor: Shutdown command");
                info!("TicketStore shutting down");
                let _ = reply.send(self.flush());
                return true;
            }
        }
        false
    }

    fn after_mutation(&mut self, result: &StoreResponse<Ticket>, event: impl FnOnce(Ticket) -> TicketEvent) {
        if let Ok(ticket) = result {
            self.mark_dirty();
            let _ = self.event_tx.send(event(ticket.clone()));
        }
    }

    /// Start the debounce window unless one is already open
    fn mark_dirty(&mut self) {
        if self.flush_at.is_none() {
            self.flush_at = Some(Instant::now() + self.debounce);
        }
    }

    fn flush(&mut self) -> StoreResponse<()> {
        if self.flush_at.is_none() {
            debug!("StoreActor::flush: nothing pending");
            return Ok(());
        }
        match self.snapshot.save(self.board.tickets()) {
            Ok(()) => {
                debug!(tickets = self.board.len(), "StoreActor::flush: snapshot written");
                self.flush_at = None;
                Ok(())
            }
            Err(e) => {
                // Stay dirty so the next window retries
                warn!(error = %e, "StoreActor::flush: snapshot write failed");
                self.flush_at = Some(Instant::now() + self.debounce);
                Err(e)
            }
        }
    }
}
