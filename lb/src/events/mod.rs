//! Run status events
//!
//! Every status change of a supervised run is published as a
//! [`StatusEvent`] `(ticket_id, running, iteration)` on a [`StatusBus`].
//! Consumers subscribe independently:
//!
//! ```text
//!                AgentSupervisor
//!                      │ emit
//!                      ▼
//!        ┌──────────────────────────┐
//!        │        STATUS BUS        │
//!        │ (tokio broadcast channel)│
//!        └──────────────────────────┘
//!          │          │          │
//!          ▼          ▼          ▼
//!     CLI output  JSONL log  auto-transition
//! ```
//!
//! Events arrive in emission order. The channel is bounded
//! ([`DEFAULT_CHANNEL_CAPACITY`]); a subscriber that falls that far behind
//! sees `Lagged` and misses the oldest events.

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, StatusBus, StatusEmitter};
pub use logger::{StatusLogger, read_status_log, spawn_status_logger};
pub use types::{StatusEvent, StatusLogEntry};
