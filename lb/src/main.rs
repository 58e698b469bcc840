//! Loopboard - ticket board with supervised coding agents
//!
//! CLI entry point: ticket and PRD management, and foreground agent runs.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use loopboard::cli::{Cli, Command, OutputFormat, PrdCommand, TicketCommand};
use loopboard::config::Config;
use loopboard::domain::{NewTicket, Ticket, TicketPatch, TicketStatus};
use loopboard::engine::Engine;
use loopboard::events::read_status_log;
use loopboard::state::{Columns, TicketEvent};
use loopboard::supervisor::ExecuteOutcome;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("loopboard")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::options()
        .create(true)
        .append(true)
        .open(log_dir.join("loopboard.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging with priority: CLI > config > INFO default
    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;

    let engine = Engine::from_config(&config)?;

    debug!(command = ?cli.command, "main: dispatching command");
    let result = match cli.command {
        Command::Ticket { command } => cmd_ticket(&engine, command).await,
        Command::Prd { command } => cmd_prd(&engine, command).await,
        Command::Run { id } => cmd_run(&engine, &id).await,
        Command::Status { id, format } => cmd_status(&engine, &config, &id, format).await,
    };

    // Always flush, even when the command failed
    engine.shutdown().await.context("Failed to shut down engine")?;
    result
}

async fn cmd_ticket(engine: &Engine, command: TicketCommand) -> Result<()> {
    debug!(?command, "cmd_ticket: called");
    match command {
        TicketCommand::Create {
            title,
            description,
            criteria,
            r#type,
            priority,
            project,
            base_dir,
        } => {
            let ticket = engine
                .create_ticket(NewTicket {
                    title,
                    description,
                    acceptance_criteria: criteria,
                    r#type,
                    priority,
                    project_id: project,
                    worktree_base_path: base_dir.map(|p| p.to_string_lossy().into_owned()),
                })
                .await?;
            println!("{} {}", "Created".green(), ticket.id);
        }
        TicketCommand::List { status, format } => {
            let tickets = engine.list_tickets(status).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tickets)?),
                OutputFormat::Text => print_board(&tickets),
            }
        }
        TicketCommand::Show { id, format } => {
            let ticket = engine.get_ticket(&id).await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&ticket)?),
                OutputFormat::Text => print_ticket(&ticket),
            }
        }
        TicketCommand::Move { id, status } => {
            let ticket = engine.transition(&id, status).await?;
            println!("{} {} -> {}", "Moved".green(), ticket.id, ticket.status);
        }
        TicketCommand::Reorder { id, status, index } => {
            let columns = engine.reorder(&id, status, index).await?;
            print_columns(&columns);
        }
        TicketCommand::Update {
            id,
            title,
            description,
            criteria,
            r#type,
            priority,
        } => {
            let patch = TicketPatch {
                title,
                description,
                acceptance_criteria: (!criteria.is_empty()).then_some(criteria),
                r#type,
                priority,
                project_id: None,
            };
            let ticket = engine.update_ticket(&id, patch).await?;
            println!("{} {}", "Updated".green(), ticket.id);
        }
        TicketCommand::Delete { id } => {
            let ticket = engine.delete_ticket(&id).await?;
            println!("{} {}", "Deleted".yellow(), ticket.id);
        }
        TicketCommand::SetBase { id, path } => {
            let path = fs::canonicalize(&path).unwrap_or(path);
            let ticket = engine.set_worktree_base_path(&id, path.to_string_lossy()).await?;
            println!(
                "{} {} base dir {}",
                "Set".green(),
                ticket.id,
                ticket.worktree_base_path.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn cmd_prd(engine: &Engine, command: PrdCommand) -> Result<()> {
    debug!(?command, "cmd_prd: called");
    match command {
        PrdCommand::Generate { id } => {
            let ticket = engine.generate_prd(&id).await?;
            if let Some(prd) = &ticket.prd {
                println!("{}", prd.content);
            }
            println!("{} PRD for {} (not approved)", "Generated".green(), ticket.id);
        }
        PrdCommand::Approve { id } => {
            let ticket = engine.approve_prd(&id).await?;
            println!("{} PRD for {}", "Approved".green(), ticket.id);
        }
        PrdCommand::Reject { id } => {
            let ticket = engine.reject_prd(&id).await?;
            println!("{} PRD for {}", "Rejected".yellow(), ticket.id);
        }
        PrdCommand::Show { id } => {
            let ticket = engine.get_ticket(&id).await?;
            match &ticket.prd {
                Some(prd) => {
                    let state = if prd.approved { "approved".green() } else { "not approved".yellow() };
                    println!("PRD ({}, generated {})", state, prd.generated_at.to_rfc3339());
                    println!();
                    println!("{}", prd.content);
                }
                None => println!("{} has no PRD", ticket.id),
            }
        }
    }
    Ok(())
}

/// Execute a ticket and follow its status events until the run ends
async fn cmd_run(engine: &Engine, id: &str) -> Result<()> {
    debug!(%id, "cmd_run: called");
    let mut status_rx = engine.subscribe_status();
    let mut ticket_rx = engine.subscribe_tickets();
    let before = engine.get_ticket(id).await?;

    match engine.execute(id).await? {
        ExecuteOutcome::Started => println!("{} agent for {}", "Started".green(), id),
        ExecuteOutcome::AlreadyRunning => {
            println!("{} {} is already running", "Note:".yellow(), id);
            return Ok(());
        }
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stopping = false;

    loop {
        tokio::select! {
            event = status_rx.recv() => match event {
                Ok(event) if event.ticket_id == id => {
                    if event.running {
                        if event.iteration > 0 {
                            println!("  {} {}", "iteration".cyan(), event.iteration);
                        }
                    } else {
                        println!("{} after {} iteration(s)", "Finished".green(), event.iteration);
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(missed = n, "cmd_run: lagged behind"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            signal = &mut ctrl_c, if !stopping => {
                signal.context("Failed to listen for Ctrl-C")?;
                println!("{} {}", "Stopping".yellow(), id);
                stopping = true;
                engine.stop(id).await;
            }
        }
    }

    if before.status == TicketStatus::InProgress {
        wait_for_move(&mut ticket_rx, id).await;
    }

    let status = engine.status(id).await;
    if !status.log.is_empty() {
        println!();
        println!("{}", "--- agent output ---".dimmed());
        print!("{}", status.log);
        if !status.log.ends_with('\n') {
            println!();
        }
    }

    let ticket = engine.get_ticket(id).await?;
    println!("Ticket {} is now {}", ticket.id, ticket.status.to_string().bold());
    Ok(())
}

/// Give the auto-transition subscriber a moment to record its update
async fn wait_for_move(ticket_rx: &mut broadcast::Receiver<TicketEvent>, id: &str) {
    let wait = async {
        loop {
            match ticket_rx.recv().await {
                Ok(TicketEvent::Updated(ticket)) if ticket.id == id && ticket.status != TicketStatus::InProgress => {
                    return;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(2), wait).await.is_err() {
        debug!(%id, "wait_for_move: no status change observed");
    }
}

async fn cmd_status(engine: &Engine, config: &Config, id: &str, format: OutputFormat) -> Result<()> {
    debug!(%id, ?format, "cmd_status: called");
    let ticket = engine.get_ticket(id).await?;
    let history = match &config.events.log_dir {
        Some(dir) => read_status_log(dir, id)?,
        None => Vec::new(),
    };
    let last = history.last().map(|entry| &entry.event);

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "id": ticket.id,
                "status": ticket.status,
                "prdApproved": ticket.has_approved_prd(),
                "worktreePath": ticket.worktree_path,
                "lastRun": last,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            println!("{} {}", ticket.id.bold(), ticket.title);
            println!("Status:    {}", ticket.status);
            println!("PRD:       {}", prd_label(&ticket));
            println!(
                "Workspace: {}",
                ticket.worktree_path.as_deref().unwrap_or("(not provisioned)")
            );
            match last {
                Some(event) => {
                    let state = if event.running { "running" } else { "finished" };
                    println!("Last run:  {} at iteration {}", state, event.iteration);
                }
                None => println!("Last run:  (none recorded)"),
            }
        }
    }
    Ok(())
}

fn prd_label(ticket: &Ticket) -> String {
    match &ticket.prd {
        Some(prd) if prd.approved => "approved".green().to_string(),
        Some(_) => "pending approval".yellow().to_string(),
        None => "none".dimmed().to_string(),
    }
}

fn print_board(tickets: &[Ticket]) {
    if tickets.is_empty() {
        println!("No tickets");
        return;
    }
    for status in TicketStatus::ALL {
        let column: Vec<&Ticket> = tickets.iter().filter(|t| t.status == status).collect();
        if column.is_empty() {
            continue;
        }
        println!("{}", status.to_string().bold());
        for ticket in column {
            print_row(ticket);
        }
    }
}

fn print_columns(columns: &Columns) {
    for (status, tickets) in columns {
        println!("{}", status.to_string().bold());
        for ticket in tickets {
            print_row(ticket);
        }
    }
}

fn print_row(ticket: &Ticket) {
    println!(
        "  {:>3}  {}  {} [{}]",
        ticket.order,
        ticket.id.dimmed(),
        ticket.title,
        ticket.priority
    );
}

fn print_ticket(ticket: &Ticket) {
    println!("{}", ticket.title.bold());
    println!("Id:        {}", ticket.id);
    println!("Status:    {}", ticket.status);
    println!("Type:      {}", ticket.r#type);
    println!("Priority:  {}", ticket.priority);
    if let Some(project) = &ticket.project_id {
        println!("Project:   {}", project);
    }
    println!("PRD:       {}", prd_label(ticket));
    if let Some(base) = &ticket.worktree_base_path {
        println!("Base dir:  {}", base);
    }
    if let Some(path) = &ticket.worktree_path {
        println!("Workspace: {}", path);
    }
    if !ticket.description.is_empty() {
        println!();
        println!("{}", ticket.description);
    }
    if !ticket.acceptance_criteria.is_empty() {
        println!();
        println!("Acceptance criteria:");
        for criterion in &ticket.acceptance_criteria {
            println!("  - {}", criterion);
        }
    }
    println!();
    println!("History:");
    for event in &ticket.history {
        match (event.from, event.to) {
            (Some(from), Some(to)) => println!("  {}  {} {} -> {}", event.timestamp.to_rfc3339(), event.action, from, to),
            _ => println!("  {}  {}", event.timestamp.to_rfc3339(), event.action),
        }
    }
}
