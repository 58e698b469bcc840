//! In-memory ticket board
//!
//! Pure data plus validation: no I/O. The store actor owns one board and
//! persists it after mutations. Every mutation keeps `order` dense (0..N-1)
//! within each status column.

use tracing::debug;

use crate::domain::{NewTicket, Prd, Ticket, TicketPatch, TicketStatus};

use super::messages::{Columns, StoreError, StoreResponse};

#[derive(Debug, Clone, Default)]
pub struct TicketBoard {
    tickets: Vec<Ticket>,
}

impl TicketBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a board from a loaded snapshot, repairing any gaps or
    /// duplicates in column ordering
    pub fn from_tickets(tickets: Vec<Ticket>) -> Self {
        debug!(count = tickets.len(), "TicketBoard::from_tickets: called");
        let mut board = Self { tickets };
        for status in TicketStatus::ALL {
            board.densify(status);
        }
        board
    }

    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Ticket> {
        self.tickets.iter().find(|t| t.id == id)
    }

    fn get_mut(&mut self, id: &str) -> StoreResponse<&mut Ticket> {
        self.tickets
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// Tickets of one column in display order
    pub fn column(&self, status: TicketStatus) -> Vec<Ticket> {
        let mut column: Vec<Ticket> = self.tickets.iter().filter(|t| t.status == status).cloned().collect();
        column.sort_by_key(|t| t.order);
        column
    }

    /// All tickets, grouped by column in board order
    pub fn list(&self, status_filter: Option<TicketStatus>) -> Vec<Ticket> {
        match status_filter {
            Some(status) => self.column(status),
            None => TicketStatus::ALL.iter().flat_map(|s| self.column(*s)).collect(),
        }
    }

    /// Create a backlog ticket at the end of its column
    pub fn create(&mut self, new: NewTicket) -> StoreResponse<Ticket> {
        self.insert(new.into_ticket())
    }

    /// Insert a prepared ticket at the end of its column
    pub fn insert(&mut self, mut ticket: Ticket) -> StoreResponse<Ticket> {
        debug!(id = %ticket.id, status = %ticket.status, "TicketBoard::insert: called");
        if self.get(&ticket.id).is_some() {
            return Err(StoreError::DuplicateId(ticket.id));
        }
        ticket.order = self.column_len(ticket.status);
        self.tickets.push(ticket.clone());
        Ok(ticket)
    }

    pub fn update(&mut self, id: &str, patch: TicketPatch) -> StoreResponse<Ticket> {
        let ticket = self.get_mut(id)?;
        ticket.apply(patch);
        Ok(ticket.clone())
    }

    pub fn remove(&mut self, id: &str) -> StoreResponse<Ticket> {
        debug!(%id, "TicketBoard::remove: called");
        let pos = self
            .tickets
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let removed = self.tickets.remove(pos);
        self.densify(removed.status);
        Ok(removed)
    }

    /// Change a ticket's status along the transition table.
    ///
    /// The ticket lands at the end of the target column.
    pub fn transition(&mut self, id: &str, target: TicketStatus) -> StoreResponse<Ticket> {
        debug!(%id, %target, "TicketBoard::transition: called");
        let end = self.column_len(target);
        let ticket = self.get_mut(id)?;
        let source = ticket.status;
        ticket.transition(target)?;
        ticket.order = end;
        let updated = ticket.clone();
        self.densify(source);
        Ok(updated)
    }

    /// Move a ticket to position `index` of `target`, transitioning first if
    /// the column changes. Returns every touched column.
    pub fn reorder(&mut self, id: &str, target: TicketStatus, index: usize) -> StoreResponse<Columns> {
        debug!(%id, %target, index, "TicketBoard::reorder: called");
        let source = self
            .get(id)
            .map(|t| t.status)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Validate before touching anything so a rejected move is a no-op
        if source != target {
            source.validate_transition(target)?;
        }

        let mut ids: Vec<String> = self
            .column(target)
            .into_iter()
            .filter(|t| t.id != id)
            .map(|t| t.id)
            .collect();
        let index = index.min(ids.len());
        ids.insert(index, id.to_string());

        {
            let ticket = self.get_mut(id)?;
            if source != target {
                ticket.transition(target)?;
            } else {
                ticket.touch();
            }
        }

        for (order, ticket_id) in ids.iter().enumerate() {
            if let Some(ticket) = self.tickets.iter_mut().find(|t| &t.id == ticket_id) {
                ticket.order = order as u32;
            }
        }

        let mut columns = Columns::new();
        if source != target {
            self.densify(source);
            columns.insert(source, self.column(source));
        }
        columns.insert(target, self.column(target));
        Ok(columns)
    }

    pub fn set_prd(&mut self, id: &str, prd: Prd) -> StoreResponse<Ticket> {
        let ticket = self.get_mut(id)?;
        ticket.prd = Some(prd);
        ticket.history.push(crate::domain::HistoryEvent::new("prd_generated"));
        ticket.touch();
        Ok(ticket.clone())
    }

    /// Flip the approval flag on an existing PRD; content is kept either way
    pub fn set_prd_approval(&mut self, id: &str, approved: bool) -> StoreResponse<Ticket> {
        let ticket = self.get_mut(id)?;
        let prd = ticket.prd.as_mut().ok_or_else(|| StoreError::MissingPrd(id.to_string()))?;
        prd.approved = approved;
        let action = if approved { "prd_approved" } else { "prd_rejected" };
        ticket.history.push(crate::domain::HistoryEvent::new(action));
        ticket.touch();
        Ok(ticket.clone())
    }

    /// Choose where the workspace will be provisioned; refused once a
    /// workspace exists
    pub fn set_worktree_base_path(&mut self, id: &str, path: String) -> StoreResponse<Ticket> {
        let ticket = self.get_mut(id)?;
        if let Some(existing) = &ticket.worktree_path {
            return Err(StoreError::WorktreeAlreadySet {
                id: id.to_string(),
                path: existing.clone(),
            });
        }
        ticket.worktree_base_path = Some(path);
        ticket.touch();
        Ok(ticket.clone())
    }

    /// Record the provisioned workspace. Set-once: re-recording the same
    /// path is accepted, a different path is rejected.
    pub fn set_worktree_path(&mut self, id: &str, path: String) -> StoreResponse<Ticket> {
        let ticket = self.get_mut(id)?;
        match &ticket.worktree_path {
            Some(existing) if *existing == path => Ok(ticket.clone()),
            Some(existing) => Err(StoreError::WorktreeAlreadySet {
                id: id.to_string(),
                path: existing.clone(),
            }),
            None => {
                ticket.worktree_path = Some(path);
                ticket.history.push(crate::domain::HistoryEvent::new("worktree_provisioned"));
                ticket.touch();
                Ok(ticket.clone())
            }
        }
    }

    fn column_len(&self, status: TicketStatus) -> u32 {
        self.tickets.iter().filter(|t| t.status == status).count() as u32
    }

    /// Reassign 0..N-1 to a column, keeping the current relative order
    fn densify(&mut self, status: TicketStatus) {
        let mut positions: Vec<usize> = (0..self.tickets.len())
            .filter(|&i| self.tickets[i].status == status)
            .collect();
        // Stable: ties keep snapshot position
        positions.sort_by_key(|&i| self.tickets[i].order);
        for (order, i) in positions.into_iter().enumerate() {
            self.tickets[i].order = order as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ticket_in(id: &str, status: TicketStatus, order: u32) -> Ticket {
        let mut t = Ticket::with_id(id, id);
        t.status = status;
        t.order = order;
        t
    }

    fn ids(column: &[Ticket]) -> Vec<(&str, u32)> {
        column.iter().map(|t| (t.id.as_str(), t.order)).collect()
    }

    #[test]
    fn test_create_appends_to_backlog() {
        let mut board = TicketBoard::new();
        let a = board.create(NewTicket::titled("A")).unwrap();
        let b = board.create(NewTicket::titled("B")).unwrap();

        assert_eq!(a.order, 0);
        assert_eq!(b.order, 1);
        assert_eq!(b.status, TicketStatus::Backlog);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut board = TicketBoard::new();
        board.insert(Ticket::with_id("t1", "A")).unwrap();
        let err = board.insert(Ticket::with_id("t1", "B")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(id) if id == "t1"));
    }

    #[test]
    fn test_backlog_to_in_progress_rejected() {
        let mut board = TicketBoard::new();
        board.insert(Ticket::with_id("t1", "A")).unwrap();

        let err = board.transition("t1", TicketStatus::InProgress).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(board.get("t1").unwrap().status, TicketStatus::Backlog);
        assert_eq!(board.get("t1").unwrap().history.len(), 1);
    }

    #[test]
    fn test_transition_moves_to_end_and_densifies_source() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 0),
            ticket_in("b", TicketStatus::Backlog, 1),
            ticket_in("c", TicketStatus::UpNext, 0),
        ]);

        let moved = board.transition("a", TicketStatus::UpNext).unwrap();
        assert_eq!(moved.order, 1);
        assert_eq!(ids(&board.column(TicketStatus::Backlog)), vec![("b", 0)]);
        assert_eq!(ids(&board.column(TicketStatus::UpNext)), vec![("c", 0), ("a", 1)]);
    }

    #[test]
    fn test_transition_unknown_ticket() {
        let mut board = TicketBoard::new();
        let err = board.transition("missing", TicketStatus::UpNext).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn test_reorder_into_new_column_at_front() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("t1", TicketStatus::InReview, 0),
            ticket_in("t2", TicketStatus::InReview, 1),
            ticket_in("t3", TicketStatus::UpNext, 0),
            ticket_in("t4", TicketStatus::UpNext, 1),
        ]);

        let columns = board.reorder("t3", TicketStatus::InReview, 0).unwrap();

        assert_eq!(
            ids(&columns[&TicketStatus::InReview]),
            vec![("t3", 0), ("t1", 1), ("t2", 2)]
        );
        assert_eq!(ids(&columns[&TicketStatus::UpNext]), vec![("t4", 0)]);
        let t3 = board.get("t3").unwrap();
        assert_eq!(t3.status, TicketStatus::InReview);
        assert_eq!(t3.history.last().unwrap().to, Some(TicketStatus::InReview));
    }

    #[test]
    fn test_reorder_within_column() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 0),
            ticket_in("b", TicketStatus::Backlog, 1),
            ticket_in("c", TicketStatus::Backlog, 2),
        ]);

        let columns = board.reorder("a", TicketStatus::Backlog, 2).unwrap();

        assert_eq!(columns.len(), 1);
        assert_eq!(
            ids(&columns[&TicketStatus::Backlog]),
            vec![("b", 0), ("c", 1), ("a", 2)]
        );
    }

    #[test]
    fn test_reorder_index_past_end_is_clamped() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 0),
            ticket_in("b", TicketStatus::UpNext, 0),
        ]);

        let columns = board.reorder("a", TicketStatus::UpNext, 99).unwrap();
        assert_eq!(ids(&columns[&TicketStatus::UpNext]), vec![("b", 0), ("a", 1)]);
    }

    #[test]
    fn test_reorder_invalid_column_change_is_noop() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 0),
            ticket_in("b", TicketStatus::Completed, 0),
        ]);
        let before = board.tickets().to_vec();

        let err = board.reorder("a", TicketStatus::Completed, 0).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert_eq!(board.tickets(), before.as_slice());
    }

    #[test]
    fn test_from_tickets_repairs_ordering() {
        let board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 7),
            ticket_in("b", TicketStatus::Backlog, 3),
            ticket_in("c", TicketStatus::Backlog, 3),
        ]);

        assert_eq!(
            ids(&board.column(TicketStatus::Backlog)),
            vec![("b", 0), ("c", 1), ("a", 2)]
        );
    }

    #[test]
    fn test_remove_densifies_column() {
        let mut board = TicketBoard::from_tickets(vec![
            ticket_in("a", TicketStatus::Backlog, 0),
            ticket_in("b", TicketStatus::Backlog, 1),
            ticket_in("c", TicketStatus::Backlog, 2),
        ]);

        board.remove("b").unwrap();
        assert_eq!(ids(&board.column(TicketStatus::Backlog)), vec![("a", 0), ("c", 1)]);
    }

    #[test]
    fn test_prd_approval_requires_prd() {
        let mut board = TicketBoard::new();
        board.insert(Ticket::with_id("t1", "A")).unwrap();

        let err = board.set_prd_approval("t1", true).unwrap_err();
        assert!(matches!(err, StoreError::MissingPrd(_)));
    }

    #[test]
    fn test_reject_keeps_content() {
        let mut board = TicketBoard::new();
        board.insert(Ticket::with_id("t1", "A")).unwrap();
        board.set_prd("t1", Prd::new("# Plan")).unwrap();
        board.set_prd_approval("t1", true).unwrap();

        let ticket = board.set_prd_approval("t1", false).unwrap();
        let prd = ticket.prd.unwrap();
        assert!(!prd.approved);
        assert_eq!(prd.content, "# Plan");
    }

    #[test]
    fn test_worktree_path_is_set_once() {
        let mut board = TicketBoard::new();
        board.insert(Ticket::with_id("t1", "A")).unwrap();

        board.set_worktree_path("t1", "/w/a".to_string()).unwrap();
        board.set_worktree_path("t1", "/w/a".to_string()).unwrap();
        let err = board.set_worktree_path("t1", "/w/b".to_string()).unwrap_err();

        assert!(matches!(err, StoreError::WorktreeAlreadySet { .. }));
        assert_eq!(board.get("t1").unwrap().worktree_path.as_deref(), Some("/w/a"));

        let err = board.set_worktree_base_path("t1", "/other".to_string()).unwrap_err();
        assert!(matches!(err, StoreError::WorktreeAlreadySet { .. }));
    }

    fn any_status() -> impl Strategy<Value = TicketStatus> {
        proptest::sample::select(TicketStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_transition_succeeds_iff_allowed(from in any_status(), to in any_status()) {
            let mut board = TicketBoard::new();
            board.insert(ticket_in("t", from, 0)).unwrap();

            let result = board.transition("t", to);
            let status = board.get("t").unwrap().status;
            if from.can_transition_to(to) {
                prop_assert!(result.is_ok());
                prop_assert_eq!(status, to);
            } else {
                prop_assert!(matches!(result, Err(StoreError::Validation(_))));
                prop_assert_eq!(status, from);
            }
        }

        #[test]
        fn prop_columns_stay_dense(
            moves in proptest::collection::vec((0usize..6, any_status(), 0usize..8), 0..40)
        ) {
            let mut board = TicketBoard::new();
            for i in 0..6 {
                board.create(NewTicket::titled(format!("t{i}"))).unwrap();
            }
            let all: Vec<String> = board.tickets().iter().map(|t| t.id.clone()).collect();

            for (which, target, index) in moves {
                let _ = board.reorder(&all[which], target, index);
            }

            for status in TicketStatus::ALL {
                let orders: Vec<u32> = board.column(status).iter().map(|t| t.order).collect();
                let expected: Vec<u32> = (0..orders.len() as u32).collect();
                prop_assert_eq!(orders, expected);
            }
        }
    }
}
