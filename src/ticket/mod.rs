pub mod record;

pub use record::Ticket;

use crate::error::{Error, Result};
use crate::types::{Address, TicketId};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

/// Rent window granted by creation and by every keepalive: one week.
pub const RETRYABLE_LIFETIME_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Ticket Store capability consumed by the retryable controller.
///
/// Implementations must preserve:
/// - `open` and `size_bytes` treat a ticket with `now >= timeout` as absent
/// - `increment_attempt` is a single read-modify-write returning the post-increment count
/// - mutations are visible to the next call in execution order
pub trait TicketStore {
    /// Open a live ticket, or `None` if it is absent or expired.
    fn open(&self, ticket_id: &TicketId, now: u64) -> Result<Option<Ticket>>;

    /// Remove a ticket and return the rent refund owed for its space.
    fn delete(&mut self, ticket_id: &TicketId) -> Result<u64>;

    /// Billed byte size of a live ticket; 0 if absent or expired.
    fn size_bytes(&self, ticket_id: &TicketId, now: u64) -> Result<u64>;

    /// Set a live ticket's timeout to `new_timeout`, which may not lie more than
    /// `lifetime` seconds past `now`.
    fn extend_expiry(
        &mut self,
        ticket_id: &TicketId,
        now: u64,
        new_timeout: u64,
        lifetime: u64,
    ) -> Result<()>;

    fn increment_attempt(&mut self, ticket_id: &TicketId) -> Result<u64>;

    fn beneficiary(&self, ticket_id: &TicketId) -> Result<Address>;

    fn timeout(&self, ticket_id: &TicketId) -> Result<u64>;
}

/// Deterministic id of a redeem attempt: Keccak-256 over the ticket id followed by the
/// sequence number as a 32-byte big-endian word.
pub fn retry_attempt_id(ticket_id: &TicketId, sequence_num: u64) -> TicketId {
    let mut hasher = Keccak256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.update([0u8; 24]);
    hasher.update(sequence_num.to_be_bytes());
    TicketId(hasher.finalize().into())
}

/// In-memory ticket store. Expired tickets are hidden from lookups but never reaped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemoryTicketStore {
    tickets: BTreeMap<TicketId, Ticket>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        MemoryTicketStore {
            tickets: BTreeMap::new(),
        }
    }

    /// Insert a new ticket. Ticket creation belongs to the outer layer, not the controller.
    pub fn insert(&mut self, ticket: Ticket) -> Result<()> {
        if self.tickets.contains_key(&ticket.id) {
            return Err(Error::StoreError(format!(
                "Ticket {} already exists",
                ticket.id
            )));
        }
        self.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    /// Raw record lookup that ignores expiry (for inspection and tests).
    pub fn get(&self, ticket_id: &TicketId) -> Option<&Ticket> {
        self.tickets.get(ticket_id)
    }

    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// All records, live or not, in id order.
    pub fn tickets(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets.values()
    }

    fn get_live_mut(&mut self, ticket_id: &TicketId, now: u64) -> Option<&mut Ticket> {
        self.tickets.get_mut(ticket_id).filter(|t| t.is_live(now))
    }

    fn get_existing(&self, ticket_id: &TicketId) -> Result<&Ticket> {
        self.tickets.get(ticket_id).ok_or(Error::NotFound)
    }
}

impl TicketStore for MemoryTicketStore {
    fn open(&self, ticket_id: &TicketId, now: u64) -> Result<Option<Ticket>> {
        Ok(self
            .tickets
            .get(ticket_id)
            .filter(|t| t.is_live(now))
            .cloned())
    }

    fn delete(&mut self, ticket_id: &TicketId) -> Result<u64> {
        // rented space is never refunded
        self.tickets.remove(ticket_id).ok_or(Error::NotFound)?;
        Ok(0)
    }

    fn size_bytes(&self, ticket_id: &TicketId, now: u64) -> Result<u64> {
        Ok(self
            .tickets
            .get(ticket_id)
            .filter(|t| t.is_live(now))
            .map(Ticket::size_bytes)
            .unwrap_or(0))
    }

    fn extend_expiry(
        &mut self,
        ticket_id: &TicketId,
        now: u64,
        new_timeout: u64,
        lifetime: u64,
    ) -> Result<()> {
        let limit = now.checked_add(lifetime).ok_or_else(|| {
            Error::StoreError("timeout limit overflows".to_string())
        })?;
        let ticket = self.get_live_mut(ticket_id, now).ok_or(Error::NotFound)?;
        if new_timeout > limit {
            return Err(Error::StoreError(
                "timeout too far into the future".to_string(),
            ));
        }
        ticket.timeout = new_timeout;
        Ok(())
    }

    fn increment_attempt(&mut self, ticket_id: &TicketId) -> Result<u64> {
        let ticket = self.tickets.get_mut(ticket_id).ok_or(Error::NotFound)?;
        ticket.increment_num_tries().ok_or_else(|| {
            Error::StoreError(format!("Attempt counter overflow for {}", ticket_id))
        })
    }

    fn beneficiary(&self, ticket_id: &TicketId) -> Result<Address> {
        Ok(self.get_existing(ticket_id)?.beneficiary)
    }

    fn timeout(&self, ticket_id: &TicketId) -> Result<u64> {
        Ok(self.get_existing(ticket_id)?.timeout)
    }
}
