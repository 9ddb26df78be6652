//! Event: lifecycle signals emitted by the retryable controller.
//!
//! The controller only sees the `EventSink` capability; whoever owns the sink decides
//! how events reach the chain log. Log gas is charged by the dispatch layer.

use crate::error::Result;
use crate::gas::{log_cost, WORD_SIZE};
use crate::types::{Address, TicketId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    TicketCreated {
        ticket_id: TicketId,
    },
    LifetimeExtended {
        ticket_id: TicketId,
        new_timeout: u64,
    },
    RedeemScheduled {
        ticket_id: TicketId,
        retry_tx_id: TicketId,
        sequence_num: u64,
        donated_gas: u64,
        gas_donor: Address,
    },
    Redeemed {
        ticket_id: TicketId,
    },
    Canceled {
        ticket_id: TicketId,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TicketCreated { .. } => EventKind::TicketCreated,
            Event::LifetimeExtended { .. } => EventKind::LifetimeExtended,
            Event::RedeemScheduled { .. } => EventKind::RedeemScheduled,
            Event::Redeemed { .. } => EventKind::Redeemed,
            Event::Canceled { .. } => EventKind::Canceled,
        }
    }

    pub fn ticket_id(&self) -> &TicketId {
        match self {
            Event::TicketCreated { ticket_id }
            | Event::LifetimeExtended { ticket_id, .. }
            | Event::RedeemScheduled { ticket_id, .. }
            | Event::Redeemed { ticket_id }
            | Event::Canceled { ticket_id } => ticket_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TicketCreated,
    LifetimeExtended,
    RedeemScheduled,
    Redeemed,
    Canceled,
}

impl EventKind {
    /// (indexed topics, non-indexed data words). The event signature topic is counted
    /// separately in `gas_cost`.
    fn layout(&self) -> (u64, u64) {
        match self {
            EventKind::TicketCreated => (1, 0),
            EventKind::LifetimeExtended => (1, 1),
            // ticket id, retry tx id and sequence number are indexed
            EventKind::RedeemScheduled => (3, 2),
            EventKind::Redeemed => (1, 0),
            EventKind::Canceled => (1, 0),
        }
    }

    /// Fixed log gas for emitting one event of this kind.
    pub fn gas_cost(&self) -> u64 {
        let (indexed, data_words) = self.layout();
        log_cost(1 + indexed, data_words * WORD_SIZE)
    }
}

/// Capability for emitting controller events.
pub trait EventSink {
    fn emit(&mut self, event: Event) -> Result<()>;
}

/// Buffering sink: keeps events in emission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog { events: Vec::new() }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&mut self, event: Event) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Default)]
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&mut self, _event: Event) -> Result<()> {
        Ok(())
    }
}
