//! Status Logger - persists status events to JSONL files
//!
//! Subscribes to the [`StatusBus`] and appends every event to
//! `<log-dir>/<ticket-id>/status.jsonl`.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use eyre::Context;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::StatusBus;
use super::types::{StatusEvent, StatusLogEntry};

const LOG_FILE: &str = "status.jsonl";

/// Writes status events to per-ticket JSONL files
pub struct StatusLogger {
    log_dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl StatusLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        debug!(?log_dir, "StatusLogger::new: creating logger");
        Self {
            log_dir,
            writers: HashMap::new(),
        }
    }

    /// Append one event to its ticket's log
    pub fn write_event(&mut self, event: &StatusEvent) -> eyre::Result<()> {
        debug!(ticket_id = %event.ticket_id, "StatusLogger::write_event: called");

        if !self.writers.contains_key(&event.ticket_id) {
            let ticket_dir = self.log_dir.join(&event.ticket_id);
            fs::create_dir_all(&ticket_dir).context("Failed to create status log directory")?;

            let log_path = ticket_dir.join(LOG_FILE);
            debug!(?log_path, "StatusLogger::write_event: opening log file");
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open {}", log_path.display()))?;
            self.writers.insert(event.ticket_id.clone(), BufWriter::new(file));
        }

        let writer = self
            .writers
            .get_mut(&event.ticket_id)
            .ok_or_else(|| eyre::eyre!("No writer for ticket {}", event.ticket_id))?;

        let json = serde_json::to_string(&StatusLogEntry::new(event.clone()))?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        Ok(())
    }

    /// Drop the writer for a ticket whose run has ended
    pub fn close_ticket(&mut self, ticket_id: &str) {
        debug!(%ticket_id, "StatusLogger::close_ticket: called");
        if let Some(mut writer) = self.writers.remove(ticket_id) {
            let _ = writer.flush();
        }
    }

    /// Consume events until the channel closes
    pub async fn run(mut self, mut rx: broadcast::Receiver<StatusEvent>) {
        debug!("StatusLogger::run: starting status logger");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.write_event(&event) {
                        error!(ticket_id = %event.ticket_id, error = %e, "StatusLogger: failed to write event");
                    }
                    if event.is_terminal() {
                        self.close_ticket(&event.ticket_id);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "StatusLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("StatusLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        for (ticket_id, mut writer) in self.writers.drain() {
            debug!(%ticket_id, "StatusLogger: flushing writer on shutdown");
            let _ = writer.flush();
        }
    }
}

/// Read a ticket's status log; a missing file yields no entries
pub fn read_status_log(log_dir: impl AsRef<Path>, ticket_id: &str) -> eyre::Result<Vec<StatusLogEntry>> {
    let log_path = log_dir.as_ref().join(ticket_id).join(LOG_FILE);
    debug!(?log_path, "read_status_log: called");

    if !log_path.exists() {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(&log_path).with_context(|| format!("Failed to read {}", log_path.display()))?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<StatusLogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(line, error = %e, "read_status_log: failed to parse line"),
        }
    }
    Ok(entries)
}

/// Spawn a logger subscribed to the bus
///
/// Subscribes before returning, so no event emitted afterwards is missed.
pub fn spawn_status_logger(bus: &StatusBus, log_dir: impl AsRef<Path>) -> tokio::task::JoinHandle<()> {
    let logger = StatusLogger::new(log_dir);
    let rx = bus.subscribe();
    tokio::spawn(logger.run(rx))
}
