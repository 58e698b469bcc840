//! Ticket store messages
//!
//! Commands and responses for the actor pattern.

use std::collections::BTreeMap;

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{NewTicket, Prd, Ticket, TicketPatch, TicketStatus, ValidationError};

/// Errors from ticket store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket already exists: {0}")]
    DuplicateId(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Ticket {0} has no PRD")]
    MissingPrd(String),

    #[error("Ticket {id} already has a worktree at {path}")]
    WorktreeAlreadySet { id: String, path: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from ticket store operations
pub type StoreResponse<T> = Result<T, StoreError>;

/// Tickets of every column touched by a reorder, keyed by column
pub type Columns = BTreeMap<TicketStatus, Vec<Ticket>>;

/// Commands sent to the TicketStore actor
#[derive(Debug)]
pub enum StoreCommand {
    Create {
        ticket: NewTicket,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    Insert {
        ticket: Ticket,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<StoreResponse<Option<Ticket>>>,
    },
    List {
        status_filter: Option<TicketStatus>,
        reply: oneshot::Sender<StoreResponse<Vec<Ticket>>>,
    },
    Update {
        id: String,
        patch: TicketPatch,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    Delete {
        id: String,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },

    // Workflow operations
    Transition {
        id: String,
        target: TicketStatus,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    Reorder {
        id: String,
        target: TicketStatus,
        index: usize,
        reply: oneshot::Sender<StoreResponse<Columns>>,
    },

    // Execution fields
    SetPrd {
        id: String,
        prd: Prd,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    SetPrdApproval {
        id: String,
        approved: bool,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    SetWorktreeBasePath {
        id: String,
        path: String,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },
    SetWorktreePath {
        id: String,
        path: String,
        reply: oneshot::Sender<StoreResponse<Ticket>>,
    },

    // Persistence
    Flush {
        reply: oneshot::Sender<StoreResponse<()>>,
    },
    Shutdown {
        reply: oneshot::Sender<StoreResponse<()>>,
    },
}
