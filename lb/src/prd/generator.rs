//! PRD content generators

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::domain::Ticket;
use crate::prompts::PromptLoader;

/// Error types for PRD generation
#[derive(Debug, thiserror::Error)]
pub enum PrdError {
    #[error("Failed to render PRD template: {0}")]
    Render(String),

    #[error("PRD generator command is empty")]
    EmptyCommand,

    #[error("Failed to run PRD generator {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PRD generator timed out after {0}ms")]
    Timeout(u64),

    #[error("PRD generator exited with {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("PRD generator produced no output")]
    EmptyOutput,
}

/// Produces PRD markdown for a ticket
#[async_trait]
pub trait PrdGenerator: Send + Sync {
    async fn generate(&self, ticket: &Ticket) -> Result<String, PrdError>;
}

/// Renders the PRD from ticket fields with the `prd` template
pub struct TemplatePrdGenerator {
    prompts: Arc<PromptLoader>,
}

impl TemplatePrdGenerator {
    pub fn new(prompts: Arc<PromptLoader>) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl PrdGenerator for TemplatePrdGenerator {
    async fn generate(&self, ticket: &Ticket) -> Result<String, PrdError> {
        debug!(ticket_id = %ticket.id, "TemplatePrdGenerator::generate: called");
        self.prompts
            .render_ticket("prd", ticket)
            .map_err(|e| PrdError::Render(e.to_string()))
    }
}

/// Pipes the `prd_request` template into an external command and takes its
/// stdout as the PRD
pub struct CommandPrdGenerator {
    argv: Vec<String>,
    timeout: Duration,
    prompts: Arc<PromptLoader>,
}

impl CommandPrdGenerator {
    pub fn new(argv: Vec<String>, timeout: Duration, prompts: Arc<PromptLoader>) -> Self {
        debug!(?argv, ?timeout, "CommandPrdGenerator::new: called");
        Self { argv, timeout, prompts }
    }
}

#[async_trait]
impl PrdGenerator for CommandPrdGenerator {
    async fn generate(&self, ticket: &Ticket) -> Result<String, PrdError> {
        debug!(ticket_id = %ticket.id, "CommandPrdGenerator::generate: called");
        let (program, args) = self.argv.split_first().ok_or(PrdError::EmptyCommand)?;

        let request = self
            .prompts
            .render_ticket("prd_request", ticket)
            .map_err(|e| PrdError::Render(e.to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PrdError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(request.as_bytes()).await {
                    warn!(error = %e, "CommandPrdGenerator: failed to write request");
                }
            });
        }

        let timeout_ms = self.timeout.as_millis() as u64;
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                debug!(%e, "CommandPrdGenerator::generate: wait failed");
                return Err(PrdError::Spawn {
                    program: program.clone(),
                    source: e,
                });
            }
            Err(_) => {
                debug!("CommandPrdGenerator::generate: timed out");
                return Err(PrdError::Timeout(timeout_ms));
            }
        };

        if !output.status.success() {
            debug!(code = ?output.status.code(), "CommandPrdGenerator::generate: command failed");
            return Err(PrdError::CommandFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let content = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if content.is_empty() {
            return Err(PrdError::EmptyOutput);
        }
        info!(ticket_id = %ticket.id, len = content.len(), "Generated PRD");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        let mut ticket = Ticket::with_id("t-1", "Dark mode");
        ticket.description = "Add a dark theme".to_string();
        ticket.acceptance_criteria = vec!["Toggle in settings".to_string()];
        ticket
    }

    fn sh(script: &str, timeout_ms: u64) -> CommandPrdGenerator {
        CommandPrdGenerator::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_millis(timeout_ms),
            Arc::new(PromptLoader::embedded_only()),
        )
    }

    #[tokio::test]
    async fn test_template_generator() {
        let generator = TemplatePrdGenerator::new(Arc::new(PromptLoader::embedded_only()));
        let prd = generator.generate(&ticket()).await.unwrap();
        assert!(prd.starts_with("# PRD: Dark mode"));
        assert!(prd.contains("- Toggle in settings"));
    }

    #[tokio::test]
    async fn test_command_generator_reads_request_from_stdin() {
        let prd = sh("cat", 5_000).generate(&ticket()).await.unwrap();
        assert!(prd.contains("Title: Dark mode"));
        assert!(prd.contains("- Toggle in settings"));
    }

    #[tokio::test]
    async fn test_command_generator_failure() {
        let err = sh("echo broken >&2; exit 3", 5_000).generate(&ticket()).await.unwrap_err();
        assert!(matches!(err, PrdError::CommandFailed { code: Some(3), ref stderr } if stderr == "broken"));
    }

    #[tokio::test]
    async fn test_command_generator_timeout() {
        let err = sh("sleep 5", 100).generate(&ticket()).await.unwrap_err();
        assert!(matches!(err, PrdError::Timeout(100)));
    }

    #[tokio::test]
    async fn test_command_generator_empty_output() {
        let err = sh("cat >/dev/null", 5_000).generate(&ticket()).await.unwrap_err();
        assert!(matches!(err, PrdError::EmptyOutput));
    }

    #[tokio::test]
    async fn test_command_generator_empty_argv() {
        let generator = CommandPrdGenerator::new(vec![], Duration::from_secs(1), Arc::new(PromptLoader::embedded_only()));
        assert!(matches!(generator.generate(&ticket()).await, Err(PrdError::EmptyCommand)));
    }

    #[tokio::test]
    async fn test_command_generator_missing_program() {
        let generator = CommandPrdGenerator::new(
            vec!["/nonexistent/prd-tool".to_string()],
            Duration::from_secs(1),
            Arc::new(PromptLoader::embedded_only()),
        );
        assert!(matches!(generator.generate(&ticket()).await, Err(PrdError::Spawn { .. })));
    }
}
