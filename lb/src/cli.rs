//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::domain::{Priority, TicketStatus, TicketType};

/// Loopboard - ticket board that runs coding agents in per-ticket workspaces
#[derive(Parser)]
#[command(
    name = "lb",
    about = "Ticket board that runs coding agents in per-ticket workspaces",
    version = env!("GIT_DESCRIBE"),
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage tickets
    Ticket {
        #[command(subcommand)]
        command: TicketCommand,
    },

    /// Manage a ticket's PRD
    Prd {
        #[command(subcommand)]
        command: PrdCommand,
    },

    /// Run the agent for a ticket and follow its status until it ends
    Run {
        /// Ticket id
        id: String,
    },

    /// Show a ticket's workflow status and workspace
    Status {
        /// Ticket id
        id: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Ticket subcommands
#[derive(Debug, Subcommand)]
pub enum TicketCommand {
    /// Create a ticket in the backlog
    Create {
        title: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Acceptance criterion (repeatable)
        #[arg(short = 'a', long = "criterion")]
        criteria: Vec<String>,

        #[arg(short = 't', long = "type", default_value = "feature")]
        r#type: TicketType,

        #[arg(short, long, default_value = "medium")]
        priority: Priority,

        #[arg(long)]
        project: Option<String>,

        /// Directory the ticket's workspace will be created under
        #[arg(short, long)]
        base_dir: Option<PathBuf>,
    },

    /// List tickets by column
    List {
        /// Only this status
        #[arg(short, long)]
        status: Option<TicketStatus>,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one ticket
    Show {
        id: String,

        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Change a ticket's status
    Move { id: String, status: TicketStatus },

    /// Place a ticket at a position within a column
    Reorder {
        id: String,
        status: TicketStatus,
        index: usize,
    },

    /// Edit descriptive fields
    Update {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        description: Option<String>,

        /// Replace acceptance criteria (repeatable)
        #[arg(short = 'a', long = "criterion")]
        criteria: Vec<String>,

        #[arg(short = 't', long = "type")]
        r#type: Option<TicketType>,

        #[arg(short, long)]
        priority: Option<Priority>,
    },

    /// Delete a ticket
    Delete { id: String },

    /// Set the directory the workspace will be created under
    SetBase { id: String, path: PathBuf },
}

/// PRD subcommands
#[derive(Debug, Subcommand)]
pub enum PrdCommand {
    /// Generate a PRD (stored unapproved)
    Generate { id: String },

    /// Approve the PRD, allowing execution
    Approve { id: String },

    /// Reject the PRD; the content is kept
    Reject { id: String },

    /// Print the PRD
    Show { id: String },
}

/// Get the path to the log file
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopboard")
        .join("logs")
        .join("loopboard.log")
}

fn after_help() -> String {
    format!("Logs are written to: {}", get_log_path().display())
}

/// Output format for list/show/status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use text or json", s)),
        }
    }
}
