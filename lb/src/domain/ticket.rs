//! Ticket record
//!
//! The unit of work moved across the board. Serialized with camelCase keys;
//! every field has a default so older snapshots missing newer fields still load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::priority::Priority;
use super::status::{TicketStatus, ValidationError};

/// Kind of work a ticket represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    #[default]
    Feature,
    Bug,
    Chore,
    Spike,
}

impl std::fmt::Display for TicketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feature => write!(f, "feature"),
            Self::Bug => write!(f, "bug"),
            Self::Chore => write!(f, "chore"),
            Self::Spike => write!(f, "spike"),
        }
    }
}

impl std::str::FromStr for TicketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "feature" => Ok(Self::Feature),
            "bug" => Ok(Self::Bug),
            "chore" => Ok(Self::Chore),
            "spike" => Ok(Self::Spike),
            _ => Err(format!("Unknown ticket type: {}", s)),
        }
    }
}

/// Entry in a ticket's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TicketStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<TicketStatus>,
}

impl HistoryEvent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            action: action.into(),
            from: None,
            to: None,
        }
    }

    pub fn status_change(from: TicketStatus, to: TicketStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            action: "status_changed".to_string(),
            from: Some(from),
            to: Some(to),
        }
    }
}

/// Product requirements document attached to a ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prd {
    pub content: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub approved: bool,
}

impl Prd {
    /// A freshly generated, unapproved PRD
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            generated_at: Utc::now(),
            approved: false,
        }
    }
}

/// A unit of work on the board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ticket {
    /// Unique identifier
    pub id: String,

    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,

    #[serde(rename = "type")]
    pub r#type: TicketType,
    pub priority: Priority,
    pub project_id: Option<String>,

    /// Board column
    pub status: TicketStatus,

    /// Position within the status column
    pub order: u32,

    pub history: Vec<HistoryEvent>,

    pub prd: Option<Prd>,

    /// User-chosen root under which the workspace gets provisioned
    pub worktree_base_path: Option<String>,

    /// Provisioned workspace; set once and never cleared
    pub worktree_path: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Ticket {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            title: String::new(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            r#type: TicketType::default(),
            priority: Priority::default(),
            project_id: None,
            status: TicketStatus::default(),
            order: 0,
            history: Vec::new(),
            prd: None,
            worktree_base_path: None,
            worktree_path: None,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Ticket {
    /// Create a new backlog ticket with a generated ID
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::now_v7().to_string(), title)
    }

    /// Create a ticket with a specific ID (for testing or import)
    pub fn with_id(id: impl Into<String>, title: impl Into<String>) -> Self {
        let mut ticket = Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        };
        ticket.history.push(HistoryEvent::new("created"));
        ticket
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Move to `target` if the state machine allows it, recording history
    pub fn transition(&mut self, target: TicketStatus) -> Result<(), ValidationError> {
        debug!(id = %self.id, from = %self.status, to = %target, "Ticket::transition: called");
        self.status.validate_transition(target)?;
        let from = self.status;
        self.status = target;
        self.history.push(HistoryEvent::status_change(from, target));
        self.touch();
        Ok(())
    }

    /// Apply a descriptive-field patch
    pub fn apply(&mut self, patch: TicketPatch) {
        debug!(id = %self.id, "Ticket::apply: called");
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(criteria) = patch.acceptance_criteria {
            self.acceptance_criteria = criteria;
        }
        if let Some(r#type) = patch.r#type {
            self.r#type = r#type;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(project_id) = patch.project_id {
            self.project_id = project_id;
        }
        self.history.push(HistoryEvent::new("updated"));
        self.touch();
    }

    /// Whether the attached PRD allows execution
    pub fn has_approved_prd(&self) -> bool {
        self.prd.as_ref().is_some_and(|prd| prd.approved)
    }
}

/// Fields a caller may set when creating a ticket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<String>,
    pub r#type: TicketType,
    pub priority: Priority,
    pub project_id: Option<String>,
    pub worktree_base_path: Option<String>,
}

impl NewTicket {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn into_ticket(self) -> Ticket {
        let mut ticket = Ticket::new(self.title);
        ticket.description = self.description;
        ticket.acceptance_criteria = self.acceptance_criteria;
        ticket.r#type = self.r#type;
        ticket.priority = self.priority;
        ticket.project_id = self.project_id;
        ticket.worktree_base_path = self.worktree_base_path;
        ticket
    }
}

/// Partial update of descriptive fields; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub acceptance_criteria: Option<Vec<String>>,
    pub r#type: Option<TicketType>,
    pub priority: Option<Priority>,
    /// `Some(None)` clears the project link
    pub project_id: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_ticket_defaults() {
        let ticket = Ticket::new("Add OAuth");
        assert!(!ticket.id.is_empty());
        assert_eq!(ticket.status, TicketStatus::Backlog);
        assert_eq!(ticket.priority, Priority::Medium);
        assert_eq!(ticket.r#type, TicketType::Feature);
        assert!(ticket.prd.is_none());
        assert!(ticket.worktree_path.is_none());
        assert_eq!(ticket.history.len(), 1);
        assert_eq!(ticket.history[0].action, "created");
    }

    #[test]
    fn test_transition_records_history() {
        let mut ticket = Ticket::with_id("t1", "Title");
        ticket.transition(TicketStatus::UpNext).unwrap();

        let last = ticket.history.last().unwrap();
        assert_eq!(last.from, Some(TicketStatus::Backlog));
        assert_eq!(last.to, Some(TicketStatus::UpNext));
        assert_eq!(ticket.status, TicketStatus::UpNext);
    }

    #[test]
    fn test_rejected_transition_leaves_ticket_unchanged() {
        let mut ticket = Ticket::with_id("t1", "Title");
        let before = ticket.clone();

        assert!(ticket.transition(TicketStatus::InProgress).is_err());
        assert_eq!(ticket, before);
    }

    #[test]
    fn test_apply_patch() {
        let mut ticket = Ticket::with_id("t1", "Old");
        ticket.project_id = Some("proj".to_string());

        ticket.apply(TicketPatch {
            title: Some("New".to_string()),
            priority: Some(Priority::Critical),
            project_id: Some(None),
            ..Default::default()
        });

        assert_eq!(ticket.title, "New");
        assert_eq!(ticket.priority, Priority::Critical);
        assert!(ticket.project_id.is_none());
        assert_eq!(ticket.history.last().unwrap().action, "updated");
    }

    #[test]
    fn test_approved_prd_check() {
        let mut ticket = Ticket::with_id("t1", "Title");
        assert!(!ticket.has_approved_prd());

        ticket.prd = Some(Prd::new("# PRD"));
        assert!(!ticket.has_approved_prd());

        ticket.prd.as_mut().unwrap().approved = true;
        assert!(ticket.has_approved_prd());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let mut ticket = Ticket::with_id("t1", "Title");
        ticket.worktree_base_path = Some("/tmp/base".to_string());
        let json = serde_json::to_value(&ticket).unwrap();

        assert_eq!(json["worktreeBasePath"], "/tmp/base");
        assert_eq!(json["type"], "feature");
        assert!(json.get("acceptanceCriteria").is_some());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let json = r#"{"id": "old-1", "title": "Legacy", "status": "up_next"}"#;
        let ticket: Ticket = serde_json::from_str(json).unwrap();

        assert_eq!(ticket.id, "old-1");
        assert_eq!(ticket.status, TicketStatus::UpNext);
        assert!(ticket.worktree_path.is_none());
        assert!(ticket.prd.is_none());
        assert!(ticket.history.is_empty());
        assert_eq!(ticket.order, 0);
    }

    #[test]
    fn test_prd_without_approved_flag_is_unapproved() {
        let json = r#"{"content": "x", "generatedAt": "2024-01-01T00:00:00Z"}"#;
        let prd: Prd = serde_json::from_str(json).unwrap();
        assert!(!prd.approved);
    }
}
