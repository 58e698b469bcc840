//! Status event types
//!
//! A status event is the `(ticket_id, running, iteration)` tuple emitted
//! whenever a supervised run starts, reaches an iteration marker or ends.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A change in a ticket's run status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub ticket_id: String,
    pub running: bool,
    pub iteration: u32,
}

impl StatusEvent {
    pub fn new(ticket_id: impl Into<String>, running: bool, iteration: u32) -> Self {
        Self {
            ticket_id: ticket_id.into(),
            running,
            iteration,
        }
    }

    /// True for the event that closes a run
    pub fn is_terminal(&self) -> bool {
        !self.running
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.running { "running" } else { "stopped" };
        write!(f, "{} {} iteration={}", self.ticket_id, state, self.iteration)
    }
}

/// Status event with a wall-clock timestamp, as written to JSONL logs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: StatusEvent,
}

impl StatusLogEntry {
    pub fn new(event: StatusEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_camel_case() {
        let json = serde_json::to_string(&StatusEvent::new("t-1", true, 2)).unwrap();
        assert_eq!(json, r#"{"ticketId":"t-1","running":true,"iteration":2}"#);
    }

    #[test]
    fn test_log_entry_flattens_event() {
        let entry = StatusLogEntry::new(StatusEvent::new("t-1", false, 3));
        let value: serde_json::Value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["ticketId"], "t-1");
        assert_eq!(value["running"], false);
        assert_eq!(value["iteration"], 3);
        assert!(value["timestamp"].is_string());

        let back: StatusLogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back.event, entry.event);
    }

    #[test]
    fn test_terminal() {
        assert!(StatusEvent::new("t", false, 0).is_terminal());
        assert!(!StatusEvent::new("t", true, 0).is_terminal());
    }
}
