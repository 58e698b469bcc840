//! Agent process spawning and process-group signaling

use std::path::Path;
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

/// How to launch the external agent
#[derive(Debug, Clone)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl AgentCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run a shell script as the agent
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", vec!["-c".to_string(), script.into()])
    }
}

/// Spawn the agent rooted at `workspace` with all three streams piped
///
/// On unix the child leads a new process group so the whole tree can be
/// signaled at once.
pub fn spawn_agent(command: &AgentCommand, workspace: &Path) -> std::io::Result<Child> {
    debug!(program = %command.program, ?workspace, "spawn_agent: called");
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(workspace)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// Result of signaling a process group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Delivered,
    /// Group already gone or not ours; expected during shutdown races
    Ignored,
    Failed,
}

#[cfg(unix)]
pub use nix::sys::signal::Signal;

/// Send `signal` to every process in the group led by `pgid`
#[cfg(unix)]
pub fn signal_group(pgid: u32, signal: Signal) -> SignalOutcome {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;
    use tracing::warn;

    debug!(pgid, ?signal, "signal_group: called");
    let Ok(raw) = i32::try_from(pgid) else {
        warn!(pgid, "signal_group: pid out of range");
        return SignalOutcome::Failed;
    };

    match killpg(Pid::from_raw(raw), signal) {
        Ok(()) => SignalOutcome::Delivered,
        Err(Errno::ESRCH) | Err(Errno::EPERM) => {
            debug!(pgid, ?signal, "signal_group: process group gone or not permitted");
            SignalOutcome::Ignored
        }
        Err(e) => {
            warn!(pgid, ?signal, error = %e, "Failed to signal process group");
            SignalOutcome::Failed
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_spawn_runs_in_workspace() {
        let temp = tempdir().unwrap();
        let child = spawn_agent(&AgentCommand::shell("pwd"), temp.path()).unwrap();
        let output = child.wait_with_output().await.unwrap();

        let printed = String::from_utf8(output.stdout).unwrap();
        let expected = std::fs::canonicalize(temp.path()).unwrap();
        assert_eq!(std::fs::canonicalize(printed.trim()).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_spawn_missing_program() {
        let temp = tempdir().unwrap();
        let command = AgentCommand::new("/nonexistent/agent", vec![]);
        assert!(spawn_agent(&command, temp.path()).is_err());
    }

    #[tokio::test]
    async fn test_signal_group_terminates_tree() {
        let temp = tempdir().unwrap();
        let mut child = spawn_agent(&AgentCommand::shell("sleep 30 & sleep 30; wait"), temp.path()).unwrap();
        let pid = child.id().unwrap();

        assert_eq!(signal_group(pid, Signal::SIGTERM), SignalOutcome::Delivered);
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_signal_dead_group_is_ignored() {
        let temp = tempdir().unwrap();
        let mut child = spawn_agent(&AgentCommand::shell("exit 0"), temp.path()).unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        assert_eq!(signal_group(pid, Signal::SIGTERM), SignalOutcome::Ignored);
    }
}
