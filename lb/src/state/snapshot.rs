//! JSON snapshot persistence for the ticket board
//!
//! The whole board is written as one JSON array. Writes go to a sibling temp
//! file first and are renamed into place so a crash never leaves a torn file.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::Ticket;

use super::messages::{StoreError, StoreResponse};

#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all tickets; a missing file is an empty board
    pub fn load(&self) -> StoreResponse<Vec<Ticket>> {
        debug!(path = %self.path.display(), "SnapshotFile::load: called");
        if !self.path.exists() {
            debug!("SnapshotFile::load: no snapshot yet");
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| StoreError::Persistence(format!("Failed to read {}: {}", self.path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tickets: Vec<Ticket> = serde_json::from_str(&content)
            .map_err(|e| StoreError::Persistence(format!("Failed to parse {}: {}", self.path.display(), e)))?;
        info!(count = tickets.len(), path = %self.path.display(), "Loaded ticket snapshot");
        Ok(tickets)
    }

    pub fn save(&self, tickets: &[Ticket]) -> StoreResponse<()> {
        debug!(count = tickets.len(), path = %self.path.display(), "SnapshotFile::save: called");
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| StoreError::Persistence(format!("Failed to create {}: {}", parent.display(), e)))?;
        }

        let json = serde_json::to_string_pretty(tickets)
            .map_err(|e| StoreError::Persistence(format!("Failed to serialize tickets: {}", e)))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .map_err(|e| StoreError::Persistence(format!("Failed to write {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &self.path)
            .map_err(|e| StoreError::Persistence(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}
