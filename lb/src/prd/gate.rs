//! Execution gate checks

use crate::domain::Ticket;

/// Why a ticket may not be executed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("Ticket {0} has no approved PRD")]
    PrdNotApproved(String),

    #[error("Ticket {0} has no workspace")]
    NoWorkspace(String),
}

/// True when the ticket carries an approved PRD
pub fn can_execute(ticket: &Ticket) -> bool {
    ticket.has_approved_prd()
}

/// Full pre-spawn check: approved PRD and a provisioned workspace
pub fn check_executable(ticket: &Ticket) -> Result<(), GateError> {
    if !can_execute(ticket) {
        return Err(GateError::PrdNotApproved(ticket.id.clone()));
    }
    if ticket.worktree_path.is_none() {
        return Err(GateError::NoWorkspace(ticket.id.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Prd, TicketStatus};
    use proptest::prelude::*;

    fn ticket(prd: Option<bool>, workspace: bool) -> Ticket {
        let mut ticket = Ticket::with_id("t-1", "Gate");
        ticket.prd = prd.map(|approved| Prd {
            approved,
            ..Prd::new("content")
        });
        if workspace {
            ticket.worktree_path = Some("/tmp/ws".to_string());
        }
        ticket
    }

    #[test]
    fn test_can_execute() {
        assert!(!can_execute(&ticket(None, true)));
        assert!(!can_execute(&ticket(Some(false), true)));
        assert!(can_execute(&ticket(Some(true), false)));
    }

    #[test]
    fn test_check_executable() {
        assert_eq!(
            check_executable(&ticket(None, true)),
            Err(GateError::PrdNotApproved("t-1".to_string()))
        );
        assert_eq!(
            check_executable(&ticket(Some(true), false)),
            Err(GateError::NoWorkspace("t-1".to_string()))
        );
        assert_eq!(check_executable(&ticket(Some(true), true)), Ok(()));
    }

    proptest! {
        #[test]
        fn prop_unapproved_never_executes(idx in 0..TicketStatus::ALL.len(), has_prd: bool) {
            let mut t = ticket(has_prd.then_some(false), true);
            t.status = TicketStatus::ALL[idx];
            prop_assert!(matches!(check_executable(&t), Err(GateError::PrdNotApproved(_))));
        }
    }
}
