//! Ticket queue owned by a room: sequential human readable ids, ordinal
//! ordering, status transitions and the votes captured per ticket.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::room::StructuredVote;

/// Placeholder shown instead of participant names on anonymous rooms.
pub const ANONYMOUS_VOTER: &str = "Anonymous";

/// Lifecycle of a queued ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Waiting in the backlog.
    Pending,
    /// Currently being estimated (at most one per room).
    InProgress,
    /// Estimated and closed.
    Completed,
}

/// Issue tracker a ticket was imported from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExternalService {
    /// Created by hand inside the room.
    #[default]
    None,
    /// Atlassian Jira.
    Jira,
    /// Linear.
    Linear,
    /// GitHub issues.
    Github,
}

/// Direction for manual reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    /// Towards the head of the queue.
    Up,
    /// Towards the tail of the queue.
    Down,
}

/// Vote recorded against a ticket once its round closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketVote {
    /// Participant that cast the vote.
    pub user_name: String,
    /// Scalar estimate.
    pub vote: String,
    /// Multi-criterion payload, when structured voting was on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_vote: Option<StructuredVote>,
    /// Unix milliseconds.
    pub voted_at: i64,
}

/// Work item waiting in, or processed by, a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketQueueItem {
    /// Primary id, never reused within a room.
    pub id: u64,
    /// Human readable id such as `TICKET-001`.
    pub ticket_id: String,
    /// Short summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Longer body, usually markdown from the tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Lifecycle state.
    pub status: TicketStatus,
    /// Sort key; ties break on the primary id.
    pub ordinal: i64,
    /// Tracker the ticket came from.
    pub external_service: ExternalService,
    /// Identifier on the tracker side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_service_id: Option<String>,
    /// Opaque tracker metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub external_service_metadata: Option<Value>,
    /// Final estimate, set when the ticket is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    /// Unix milliseconds.
    pub created_at: i64,
    /// Unix milliseconds.
    pub updated_at: i64,
    /// Unix milliseconds, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
    /// Votes captured when the ticket's round closed.
    #[serde(default)]
    pub votes: Vec<TicketVote>,
}

/// Fields required to create a ticket. The ordinal is the caller's choice.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    /// Human readable id, unique per room ignoring case.
    pub ticket_id: String,
    /// Optional title.
    pub title: Option<String>,
    /// Optional description.
    pub description: Option<String>,
    /// Initial status; `InProgress` demotes the current ticket.
    pub status: TicketStatus,
    /// Sort key.
    pub ordinal: i64,
    /// Tracker the ticket came from.
    pub external_service: ExternalService,
    /// Identifier on the tracker side.
    pub external_service_id: Option<String>,
    /// Opaque tracker metadata.
    pub external_service_metadata: Option<Value>,
}

/// Partial update; `None` leaves a field untouched, an empty string clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketUpdate {
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<TicketStatus>,
    #[serde(default)]
    pub ordinal: Option<i64>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub external_service_metadata: Option<Value>,
}

/// Rejections raised by queue operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("ticket `{0}` not found")]
    NotFound(u64),
    #[error("ticket id `{0}` already exists")]
    DuplicateTicketId(String),
    #[error("ticket `{0}` is not pending")]
    NotPending(u64),
    #[error("ticket `{0}` cannot move further")]
    AtBoundary(u64),
    #[error("no {0} left to assign; renumber the queue")]
    Exhausted(&'static str),
}

/// Outcome of advancing to the next ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct Advance {
    /// Ticket that was in progress and is now completed.
    pub completed: Option<TicketQueueItem>,
    /// Ticket promoted to in progress.
    pub current: Option<TicketQueueItem>,
}

/// Ordered backlog of tickets with monotonic primary ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQueue {
    items: Vec<TicketQueueItem>,
    last_id: u64,
}

impl TicketQueue {
    /// Next `PREFIX-NNN` identifier: highest numeric suffix sharing `prefix`, plus one.
    pub fn next_ticket_id(&self, prefix: &str) -> Result<String, QueueError> {
        let scoped = format!("{prefix}-");
        let highest = self
            .items
            .iter()
            .filter_map(|item| item.ticket_id.strip_prefix(&scoped))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let next = highest
            .checked_add(1)
            .ok_or(QueueError::Exhausted("ticket number"))?;
        Ok(format!("{prefix}-{next:03}"))
    }

    /// Ordinal placing a new ticket at the tail of the queue.
    pub fn next_ordinal(&self) -> Result<i64, QueueError> {
        match self.items.iter().map(|item| item.ordinal).max() {
            Some(max) => max.checked_add(1).ok_or(QueueError::Exhausted("ordinal")),
            None => Ok(0),
        }
    }

    /// Whether a ticket with this human readable id exists (case-insensitive).
    pub fn contains_ticket_id(&self, ticket_id: &str) -> bool {
        self.items
            .iter()
            .any(|item| item.ticket_id.eq_ignore_ascii_case(ticket_id))
    }

    /// Insert a ticket, assigning its primary id and timestamps.
    pub fn create_ticket(
        &mut self,
        ticket: NewTicket,
        now: i64,
    ) -> Result<TicketQueueItem, QueueError> {
        if self.contains_ticket_id(&ticket.ticket_id) {
            return Err(QueueError::DuplicateTicketId(ticket.ticket_id));
        }
        if ticket.status == TicketStatus::InProgress {
            self.demote_current(now);
        }

        self.last_id += 1;
        let item = TicketQueueItem {
            id: self.last_id,
            ticket_id: ticket.ticket_id,
            title: ticket.title,
            description: ticket.description,
            status: ticket.status,
            ordinal: ticket.ordinal,
            external_service: ticket.external_service,
            external_service_id: ticket.external_service_id,
            external_service_metadata: ticket.external_service_metadata,
            outcome: None,
            created_at: now,
            updated_at: now,
            completed_at: (ticket.status == TicketStatus::Completed).then_some(now),
            votes: Vec::new(),
        };
        self.items.push(item.clone());
        Ok(item)
    }

    /// Apply a partial update, keeping at most one ticket in progress.
    pub fn update_ticket(
        &mut self,
        id: u64,
        update: TicketUpdate,
        now: i64,
    ) -> Result<TicketQueueItem, QueueError> {
        if let Some(ticket_id) = update.ticket_id.as_deref() {
            if self
                .items
                .iter()
                .any(|item| item.id != id && item.ticket_id.eq_ignore_ascii_case(ticket_id))
            {
                return Err(QueueError::DuplicateTicketId(ticket_id.to_string()));
            }
        }
        if update.status == Some(TicketStatus::InProgress) {
            self.demote_current_except(id, now);
        }

        let item = self.get_mut(id)?;
        if let Some(ticket_id) = update.ticket_id {
            item.ticket_id = ticket_id;
        }
        if let Some(title) = update.title {
            item.title = non_empty(title);
        }
        if let Some(description) = update.description {
            item.description = non_empty(description);
        }
        if let Some(outcome) = update.outcome {
            item.outcome = non_empty(outcome);
        }
        if let Some(metadata) = update.external_service_metadata {
            item.external_service_metadata = (!metadata.is_null()).then_some(metadata);
        }
        if let Some(ordinal) = update.ordinal {
            item.ordinal = ordinal;
        }
        if let Some(status) = update.status {
            item.completed_at = match status {
                TicketStatus::Completed => item.completed_at.or(Some(now)),
                _ => None,
            };
            item.status = status;
        }
        item.updated_at = now;
        Ok(item.clone())
    }

    /// Remove a ticket from the queue.
    pub fn delete_ticket(&mut self, id: u64) -> Result<TicketQueueItem, QueueError> {
        let index = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(QueueError::NotFound(id))?;
        Ok(self.items.remove(index))
    }

    /// Look a ticket up by primary id.
    pub fn get(&self, id: u64) -> Option<&TicketQueueItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Tickets sorted by ordinal, ties broken by creation order.
    pub fn ordered(&self) -> Vec<TicketQueueItem> {
        let mut items = self.items.clone();
        items.sort_by_key(|item| (item.ordinal, item.id));
        items
    }

    /// The single in-progress ticket, if any.
    pub fn current(&self) -> Option<&TicketQueueItem> {
        self.items
            .iter()
            .find(|item| item.status == TicketStatus::InProgress)
    }

    /// Make a pending ticket current, sending the previous one back to pending.
    pub fn select(&mut self, id: u64, now: i64) -> Result<TicketQueueItem, QueueError> {
        let status = self.get(id).ok_or(QueueError::NotFound(id))?.status;
        match status {
            TicketStatus::InProgress => return self.get_mut(id).map(|item| item.clone()),
            TicketStatus::Completed => return Err(QueueError::NotPending(id)),
            TicketStatus::Pending => {}
        }

        self.demote_current(now);
        let item = self.get_mut(id)?;
        item.status = TicketStatus::InProgress;
        item.updated_at = now;
        Ok(item.clone())
    }

    /// Complete the current ticket with `votes` and promote the lowest-ordinal pending one.
    pub fn advance(&mut self, votes: Vec<TicketVote>, now: i64) -> Advance {
        let completed = self
            .items
            .iter_mut()
            .find(|item| item.status == TicketStatus::InProgress)
            .map(|item| {
                item.status = TicketStatus::Completed;
                item.completed_at = Some(now);
                item.updated_at = now;
                item.votes = votes;
                item.clone()
            });

        let current = self
            .items
            .iter_mut()
            .filter(|item| item.status == TicketStatus::Pending)
            .min_by_key(|item| (item.ordinal, item.id))
            .map(|item| {
                item.status = TicketStatus::InProgress;
                item.updated_at = now;
                item.clone()
            });

        Advance { completed, current }
    }

    /// Swap ordinals with the neighbouring pending ticket.
    pub fn move_ticket(
        &mut self,
        id: u64,
        direction: MoveDirection,
        now: i64,
    ) -> Result<(), QueueError> {
        let target = self.get(id).ok_or(QueueError::NotFound(id))?;
        if target.status != TicketStatus::Pending {
            return Err(QueueError::NotPending(id));
        }
        let key = (target.ordinal, target.id);

        let neighbour = self
            .items
            .iter()
            .filter(|item| item.status == TicketStatus::Pending && item.id != id)
            .filter(|item| match direction {
                MoveDirection::Up => (item.ordinal, item.id) < key,
                MoveDirection::Down => (item.ordinal, item.id) > key,
            })
            .max_by_key(|item| match direction {
                MoveDirection::Up => (item.ordinal, item.id as i64),
                MoveDirection::Down => (-item.ordinal, -(item.id as i64)),
            })
            .map(|item| (item.id, item.ordinal))
            .ok_or(QueueError::AtBoundary(id))?;

        let (neighbour_id, neighbour_ordinal) = neighbour;
        let own_ordinal = key.0;
        if own_ordinal == neighbour_ordinal {
            // Equal ordinals would not reorder anything; open a gap first.
            let (first, second) = match direction {
                MoveDirection::Up => (id, neighbour_id),
                MoveDirection::Down => (neighbour_id, id),
            };
            self.get_mut(first)?.ordinal = own_ordinal;
            self.get_mut(second)?.ordinal = own_ordinal + 1;
            self.shift_after(own_ordinal + 1, &[first, second]);
        } else {
            self.get_mut(id)?.ordinal = neighbour_ordinal;
            self.get_mut(neighbour_id)?.ordinal = own_ordinal;
        }
        self.get_mut(id)?.updated_at = now;
        self.get_mut(neighbour_id)?.updated_at = now;
        Ok(())
    }

    /// Number of tickets in the queue.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no tickets.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn get_mut(&mut self, id: u64) -> Result<&mut TicketQueueItem, QueueError> {
        self.items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or(QueueError::NotFound(id))
    }

    fn demote_current(&mut self, now: i64) {
        self.demote_current_except(0, now);
    }

    fn demote_current_except(&mut self, keep: u64, now: i64) {
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.status == TicketStatus::InProgress && item.id != keep)
        {
            item.status = TicketStatus::Pending;
            item.updated_at = now;
        }
    }

    fn shift_after(&mut self, ordinal: i64, skip: &[u64]) {
        for item in self
            .items
            .iter_mut()
            .filter(|item| item.ordinal >= ordinal && !skip.contains(&item.id))
        {
            item.ordinal += 1;
        }
    }
}

/// Read-time projection of ticket votes honouring the room's anonymity settings.
pub fn redact_votes(votes: &[TicketVote], anonymize: bool) -> Vec<TicketVote> {
    votes
        .iter()
        .cloned()
        .map(|mut vote| {
            if anonymize {
                vote.user_name = ANONYMOUS_VOTER.to_string();
            }
            vote
        })
        .collect()
}

/// Copy of a ticket whose votes went through [`redact_votes`].
pub fn redact_ticket(ticket: &TicketQueueItem, anonymize: bool) -> TicketQueueItem {
    let mut ticket = ticket.clone();
    ticket.votes = redact_votes(&ticket.votes, anonymize);
    ticket
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn new_ticket(queue: &TicketQueue, ticket_id: &str) -> NewTicket {
        NewTicket {
            ticket_id: ticket_id.to_string(),
            title: Some(format!("Title {ticket_id}")),
            description: None,
            status: TicketStatus::Pending,
            ordinal: queue.next_ordinal().unwrap(),
            external_service: ExternalService::None,
            external_service_id: None,
            external_service_metadata: None,
        }
    }

    fn push(queue: &mut TicketQueue, ticket_id: &str) -> TicketQueueItem {
        let ticket = new_ticket(queue, ticket_id);
        queue.create_ticket(ticket, NOW).unwrap()
    }

    #[test]
    fn first_ticket_id_starts_at_one() {
        assert_eq!(TicketQueue::default().next_ticket_id("P").unwrap(), "P-001");
    }

    #[test]
    fn next_ticket_id_uses_highest_suffix_per_prefix() {
        let mut queue = TicketQueue::default();
        push(&mut queue, "P-001");
        push(&mut queue, "P-005");
        push(&mut queue, "Q-042");
        push(&mut queue, "P-notanumber");

        assert_eq!(queue.next_ticket_id("P").unwrap(), "P-006");
        assert_eq!(queue.next_ticket_id("Q").unwrap(), "Q-043");
        assert_eq!(queue.next_ticket_id("R").unwrap(), "R-001");
    }

    #[test]
    fn next_ticket_id_grows_past_three_digits() {
        let mut queue = TicketQueue::default();
        push(&mut queue, "P-999");
        assert_eq!(queue.next_ticket_id("P").unwrap(), "P-1000");
    }

    #[test]
    fn next_ticket_id_ignores_ordinal_gaps() {
        let mut queue = TicketQueue::default();
        let mut ticket = new_ticket(&queue, "P-003");
        ticket.ordinal = 40;
        queue.create_ticket(ticket, NOW).unwrap();
        push(&mut queue, "P-001");

        assert_eq!(queue.next_ticket_id("P").unwrap(), "P-004");
        assert_eq!(queue.next_ordinal(), Ok(42));
    }

    #[test]
    fn exhausted_numbering_is_an_error() {
        let mut queue = TicketQueue::default();
        let mut ticket = new_ticket(&queue, &format!("P-{}", u64::MAX));
        ticket.ordinal = i64::MAX;
        queue.create_ticket(ticket, NOW).unwrap();

        assert_eq!(
            queue.next_ticket_id("P"),
            Err(QueueError::Exhausted("ticket number"))
        );
        assert_eq!(queue.next_ticket_id("Q").unwrap(), "Q-001");
        assert_eq!(queue.next_ordinal(), Err(QueueError::Exhausted("ordinal")));
    }

    #[test]
    fn primary_ids_are_monotonic_after_delete() {
        let mut queue = TicketQueue::default();
        let first = push(&mut queue, "P-001");
        queue.delete_ticket(first.id).unwrap();
        let second = push(&mut queue, "P-002");
        assert!(second.id > first.id);
        assert_eq!(queue.delete_ticket(first.id), Err(QueueError::NotFound(first.id)));
    }

    #[test]
    fn duplicate_ticket_ids_are_rejected() {
        let mut queue = TicketQueue::default();
        push(&mut queue, "P-001");
        let duplicate = new_ticket(&queue, "p-001");
        assert_eq!(
            queue.create_ticket(duplicate, NOW),
            Err(QueueError::DuplicateTicketId("p-001".into()))
        );
    }

    #[test]
    fn advance_completes_current_and_promotes_lowest_pending() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        let b = push(&mut queue, "P-002");
        let c = push(&mut queue, "P-003");
        queue.select(b.id, NOW).unwrap();

        let votes = vec![TicketVote {
            user_name: "Alice".into(),
            vote: "5".into(),
            structured_vote: None,
            voted_at: NOW,
        }];
        let advance = queue.advance(votes.clone(), NOW + 1);

        let completed = advance.completed.unwrap();
        assert_eq!(completed.id, b.id);
        assert_eq!(completed.status, TicketStatus::Completed);
        assert_eq!(completed.votes, votes);
        assert_eq!(completed.completed_at, Some(NOW + 1));
        assert_eq!(advance.current.unwrap().id, a.id);
        assert_eq!(queue.current().map(|t| t.id), Some(a.id));

        queue.advance(Vec::new(), NOW + 2);
        assert_eq!(queue.current().map(|t| t.id), Some(c.id));
        let last = queue.advance(Vec::new(), NOW + 3);
        assert!(last.current.is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn at_most_one_ticket_in_progress() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        let b = push(&mut queue, "P-002");
        queue.select(a.id, NOW).unwrap();
        queue
            .update_ticket(
                b.id,
                TicketUpdate {
                    status: Some(TicketStatus::InProgress),
                    ..TicketUpdate::default()
                },
                NOW,
            )
            .unwrap();

        let in_progress = queue
            .ordered()
            .into_iter()
            .filter(|t| t.status == TicketStatus::InProgress)
            .map(|t| t.id)
            .collect::<Vec<_>>();
        assert_eq!(in_progress, vec![b.id]);
        assert_eq!(queue.get(a.id).unwrap().status, TicketStatus::Pending);
    }

    #[test]
    fn completed_tickets_cannot_be_selected() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        queue.select(a.id, NOW).unwrap();
        queue.advance(Vec::new(), NOW);
        assert_eq!(queue.select(a.id, NOW), Err(QueueError::NotPending(a.id)));
    }

    #[test]
    fn update_clears_fields_with_empty_strings() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        let updated = queue
            .update_ticket(
                a.id,
                TicketUpdate {
                    title: Some("  ".into()),
                    description: Some("Details".into()),
                    status: Some(TicketStatus::Completed),
                    ..TicketUpdate::default()
                },
                NOW + 5,
            )
            .unwrap();
        assert_eq!(updated.title, None);
        assert_eq!(updated.description.as_deref(), Some("Details"));
        assert_eq!(updated.completed_at, Some(NOW + 5));
    }

    #[test]
    fn move_swaps_with_neighbouring_pending_ticket() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        let b = push(&mut queue, "P-002");
        let c = push(&mut queue, "P-003");

        queue.move_ticket(c.id, MoveDirection::Up, NOW).unwrap();
        let order = queue.ordered().iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(order, vec![a.id, c.id, b.id]);

        queue.move_ticket(a.id, MoveDirection::Down, NOW).unwrap();
        let order = queue.ordered().iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(order, vec![c.id, a.id, b.id]);

        assert_eq!(
            queue.move_ticket(c.id, MoveDirection::Up, NOW),
            Err(QueueError::AtBoundary(c.id))
        );
    }

    #[test]
    fn move_skips_non_pending_tickets() {
        let mut queue = TicketQueue::default();
        let a = push(&mut queue, "P-001");
        let b = push(&mut queue, "P-002");
        let c = push(&mut queue, "P-003");
        queue.select(b.id, NOW).unwrap();

        queue.move_ticket(c.id, MoveDirection::Up, NOW).unwrap();
        assert_eq!(queue.get(c.id).unwrap().ordinal, a.ordinal);
        assert_eq!(queue.get(a.id).unwrap().ordinal, c.ordinal);
        assert_eq!(
            queue.move_ticket(b.id, MoveDirection::Up, NOW),
            Err(QueueError::NotPending(b.id))
        );
    }

    #[test]
    fn move_with_equal_ordinals_still_reorders() {
        let mut queue = TicketQueue::default();
        let mut first = new_ticket(&queue, "P-001");
        first.ordinal = 0;
        let a = queue.create_ticket(first, NOW).unwrap();
        let mut second = new_ticket(&queue, "P-002");
        second.ordinal = 0;
        let b = queue.create_ticket(second, NOW).unwrap();

        queue.move_ticket(b.id, MoveDirection::Up, NOW).unwrap();
        let order = queue.ordered().iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(order, vec![b.id, a.id]);
    }

    #[test]
    fn redaction_is_read_only() {
        let votes = vec![TicketVote {
            user_name: "Alice".into(),
            vote: "3".into(),
            structured_vote: None,
            voted_at: NOW,
        }];
        let redacted = redact_votes(&votes, true);
        assert_eq!(redacted[0].user_name, ANONYMOUS_VOTER);
        assert_eq!(redacted[0].vote, "3");
        assert_eq!(votes[0].user_name, "Alice");
        assert_eq!(redact_votes(&votes, false), votes);
    }
}
