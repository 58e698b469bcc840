//! Moves a ticket to testing when its agent run ends
//!
//! Subscribes to the status bus independently of every other consumer.
//! On a running to not-running change, a ticket still `in_progress` is
//! transitioned to `in_testing`; anything else is left alone.

use std::collections::HashSet;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Ticket, TicketStatus};
use crate::events::{StatusBus, StatusEvent};
use crate::state::TicketStore;

/// Status-stream subscriber that applies the run-finished rule
pub struct AutoTransition {
    store: TicketStore,
    /// Tickets whose last event was a running one; removed when the run ends
    running: HashSet<String>,
}

/// Handle to a spawned [`AutoTransition`] task
pub struct AutoTransitionHandle {
    pub task: JoinHandle<()>,
    sync_tx: mpsc::Sender<oneshot::Sender<()>>,
}

impl AutoTransitionHandle {
    /// Wait until every status event emitted before this call has been handled
    pub async fn sync(&self) {
        debug!("AutoTransitionHandle::sync: called");
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.sync_tx.send(ack_tx).await.is_err() {
            debug!("AutoTransitionHandle::sync: task already stopped");
            return;
        }
        let _ = ack_rx.await;
    }
}

impl AutoTransition {
    pub fn new(store: TicketStore) -> Self {
        Self {
            store,
            running: HashSet::new(),
        }
    }

    /// Subscribe to the bus and process events in a background task
    pub fn spawn(store: TicketStore, bus: &StatusBus) -> AutoTransitionHandle {
        let rx = bus.subscribe();
        let (sync_tx, sync_rx) = mpsc::channel(4);
        AutoTransitionHandle {
            task: tokio::spawn(Self::new(store).run(rx, sync_rx)),
            sync_tx,
        }
    }

    pub async fn run(
        mut self,
        mut rx: broadcast::Receiver<StatusEvent>,
        mut sync_rx: mpsc::Receiver<oneshot::Sender<()>>,
    ) {
        debug!("AutoTransition::run: started");
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Ok(event) => {
                        self.handle(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "AutoTransition: lagged behind, missed status events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("AutoTransition: channel closed, shutting down");
                        break;
                    }
                },
                Some(ack) = sync_rx.recv() => {
                    self.drain(&mut rx).await;
                    let _ = ack.send(());
                }
            }
        }
    }

    /// Handle everything already buffered on the bus
    async fn drain(&mut self, rx: &mut broadcast::Receiver<StatusEvent>) {
        loop {
            match rx.try_recv() {
                Ok(event) => {
                    self.handle(&event).await;
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(missed = n, "AutoTransition: lagged behind, missed status events");
                }
                Err(_) => return,
            }
        }
    }

    /// Apply the rule to one event, returning the transitioned ticket
    ///
    /// A terminal event for a ticket never seen running still counts, since
    /// the matching start event may have been lost to lag. A repeated terminal
    /// event finds the ticket already out of `in_progress`.
    pub async fn handle(&mut self, event: &StatusEvent) -> Option<Ticket> {
        if event.running {
            self.running.insert(event.ticket_id.clone());
            return None;
        }
        self.running.remove(&event.ticket_id);
        debug!(ticket_id = %event.ticket_id, "AutoTransition::handle: run ended");

        let ticket = match self.store.get(&event.ticket_id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                debug!(ticket_id = %event.ticket_id, "AutoTransition::handle: ticket gone");
                return None;
            }
            Err(e) => {
                warn!(ticket_id = %event.ticket_id, error = %e, "AutoTransition: failed to load ticket");
                return None;
            }
        };

        if ticket.status != TicketStatus::InProgress {
            debug!(ticket_id = %ticket.id, status = %ticket.status, "AutoTransition::handle: not in progress, leaving as is");
            return None;
        }

        match self.store.transition(&ticket.id, TicketStatus::InTesting).await {
            Ok(updated) => {
                info!(ticket_id = %updated.id, "Run finished, moved ticket to in_testing");
                Some(updated)
            }
            Err(e) => {
                // Moved concurrently; never override
                debug!(ticket_id = %ticket.id, error = %e, "AutoTransition::handle: transition refused");
                None
            }
        }
    }
}
