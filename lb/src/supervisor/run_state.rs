//! In-memory per-ticket run state

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::watch;

/// Default number of characters kept in a run log
pub const DEFAULT_LOG_CAP: usize = 10_000;

/// Log that keeps only the most recent `cap` characters
#[derive(Debug, Clone)]
pub struct RollingLog {
    buf: String,
    chars: usize,
    cap: usize,
}

impl RollingLog {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            chars: 0,
            cap,
        }
    }

    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        self.chars += text.chars().count();

        if self.chars > self.cap {
            let excess = self.chars - self.cap;
            let cut = self
                .buf
                .char_indices()
                .nth(excess)
                .map(|(idx, _)| idx)
                .unwrap_or(self.buf.len());
            self.buf.drain(..cut);
            self.chars = self.cap;
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.chars = 0;
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.chars
    }

    pub fn is_empty(&self) -> bool {
        self.chars == 0
    }

    pub fn cap(&self) -> usize {
        self.cap
    }
}

impl Default for RollingLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAP)
    }
}

/// Snapshot returned by status queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub iteration: u32,
    pub log: String,
}

/// Mutable state of one ticket's supervised run
///
/// Created on the first execution of a ticket and kept afterwards, so a
/// finished run still reports its last log.
#[derive(Debug)]
pub struct RunState {
    pub running: bool,
    pub iteration: u32,
    pub log: RollingLog,
    pub workspace: PathBuf,
    /// Process id of the agent, which also leads its process group.
    /// Cleared once the process has been reaped.
    pub pid: Option<u32>,
    /// Bumped on every execution; output from older processes is ignored
    pub generation: u64,
    /// Flips to true when the current generation's process exits
    pub exited: Option<watch::Receiver<bool>>,
}

impl RunState {
    pub fn new(log_cap: usize) -> Self {
        Self {
            running: false,
            iteration: 0,
            log: RollingLog::new(log_cap),
            workspace: PathBuf::new(),
            pid: None,
            generation: 0,
            exited: None,
        }
    }

    /// Start a fresh run and return its generation
    pub fn begin(&mut self, workspace: PathBuf) -> u64 {
        self.generation += 1;
        self.running = true;
        self.iteration = 0;
        self.log.clear();
        self.workspace = workspace;
        self.pid = None;
        self.exited = None;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            running: self.running,
            iteration: self.iteration,
            log: self.log.as_str().to_string(),
        }
    }
}
