//! Domain types for loopboard
//!
//! Core domain types: Ticket, its status state machine, and the PRD artifact.

mod priority;
mod status;
mod ticket;

pub use priority::Priority;
pub use status::{TicketStatus, ValidationError};
pub use ticket::{HistoryEvent, NewTicket, Prd, Ticket, TicketPatch, TicketType};
