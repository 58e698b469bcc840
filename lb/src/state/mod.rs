//! Ticket state management with actor pattern
//!
//! TicketStore owns the ticket board and processes messages via channels,
//! providing thread-safe access to persistent state.

mod board;
mod manager;
mod messages;
mod snapshot;

pub use board::TicketBoard;
pub use manager::{StoreConfig, TicketEvent, TicketStore};
pub use messages::{Columns, StoreCommand, StoreError, StoreResponse};
pub use snapshot::SnapshotFile;
