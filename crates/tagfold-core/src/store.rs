//! Ticket store: authoritative id → ticket mapping plus the rater registry.
//!
//! Tickets are handed out by shared reference only. The resolver in
//! [`crate::resolve`] is the single place that inserts or merges.

use std::collections::HashMap;

use crate::rater::RaterRegistry;
use crate::ticket::Ticket;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TicketStore {
    tickets: Vec<Ticket>,
    by_id: HashMap<String, usize>,
    raters: RaterRegistry,
}

impl TicketStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty ticket set sharing an existing registry (and its column order).
    #[must_use]
    pub fn with_registry(raters: RaterRegistry) -> Self {
        Self {
            tickets: Vec::new(),
            by_id: HashMap::new(),
            raters,
        }
    }

    /// Tickets in insertion order.
    #[must_use]
    pub fn tickets(&self) -> &[Ticket] {
        &self.tickets
    }

    #[must_use]
    pub fn get(&self, ticket_id: &str) -> Option<&Ticket> {
        self.by_id.get(ticket_id).map(|&slot| &self.tickets[slot])
    }

    #[must_use]
    pub fn contains(&self, ticket_id: &str) -> bool {
        self.by_id.contains_key(ticket_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    #[must_use]
    pub const fn raters(&self) -> &RaterRegistry {
        &self.raters
    }

    pub(crate) fn raters_mut(&mut self) -> &mut RaterRegistry {
        &mut self.raters
    }

    /// Split into tickets and registry.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Ticket>, RaterRegistry) {
        (self.tickets, self.raters)
    }

    /// Append a ticket with an unknown id. Returns its slot.
    pub(crate) fn insert_new(&mut self, ticket: Ticket) -> usize {
        debug_assert!(!self.by_id.contains_key(&ticket.ticket_id));
        let slot = self.tickets.len();
        self.by_id.insert(ticket.ticket_id.clone(), slot);
        self.tickets.push(ticket);
        slot
    }

    pub(crate) fn slot_of(&self, ticket_id: &str) -> Option<usize> {
        self.by_id.get(ticket_id).copied()
    }

    pub(crate) fn ticket_at_mut(&mut self, slot: usize) -> &mut Ticket {
        &mut self.tickets[slot]
    }
}
