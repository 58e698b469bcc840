//! Ticket status state machine
//!
//! Every ticket sits in exactly one board column. Moving between columns is
//! only allowed along the edges returned by [`TicketStatus::allowed_next`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Board column a ticket currently sits in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Backlog,
    UpNext,
    InReview,
    InProgress,
    InTesting,
    Completed,
}

impl TicketStatus {
    /// All statuses in board order
    pub const ALL: [TicketStatus; 6] = [
        Self::Backlog,
        Self::UpNext,
        Self::InReview,
        Self::InProgress,
        Self::InTesting,
        Self::Completed,
    ];

    /// Statuses reachable from this one in a single transition
    pub fn allowed_next(self) -> &'static [TicketStatus] {
        match self {
            Self::Backlog => &[Self::UpNext],
            Self::UpNext => &[Self::InReview, Self::Backlog],
            Self::InReview => &[Self::InProgress, Self::Backlog],
            Self::InProgress => &[Self::InTesting],
            Self::InTesting => &[Self::Completed, Self::InProgress],
            Self::Completed => &[],
        }
    }

    /// Check whether `target` is a legal next status
    pub fn can_transition_to(self, target: TicketStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    /// Terminal statuses have no outgoing transitions
    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Validate a transition, producing the error the store reports
    pub fn validate_transition(self, target: TicketStatus) -> Result<(), ValidationError> {
        if self.can_transition_to(target) {
            Ok(())
        } else {
            Err(ValidationError::InvalidTransition { from: self, to: target })
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backlog => write!(f, "backlog"),
            Self::UpNext => write!(f, "up_next"),
            Self::InReview => write!(f, "in_review"),
            Self::InProgress => write!(f, "in_progress"),
            Self::InTesting => write!(f, "in_testing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "backlog" => Ok(Self::Backlog),
            "up_next" => Ok(Self::UpNext),
            "in_review" => Ok(Self::InReview),
            "in_progress" => Ok(Self::InProgress),
            "in_testing" => Ok(Self::InTesting),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TicketStatus, to: TicketStatus },
}
