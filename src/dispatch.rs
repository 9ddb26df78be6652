//! Dispatch: the outer call layer around the retryable controller.
//!
//! `execute` runs a call against a working copy of the store with buffered events and
//! commits the store only if the call succeeds; committed events are then forwarded to
//! the sink. Burned gas is never returned on failure. Log gas is charged by the
//! controller as each event is emitted.

use crate::error::{Error, Result};
use crate::event::{Event, EventLog, EventSink};
use crate::gas::{GasLedger, WORD_SIZE};
use crate::logger::Logger;
use crate::retryable::{CallContext, RetryableTx};
use crate::ticket::{MemoryTicketStore, Ticket, TicketStore};
use crate::types::{Address, TicketId};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Call {
    Cancel { ticket_id: TicketId },
    GetBeneficiary { ticket_id: TicketId },
    GetLifetime,
    GetTimeout { ticket_id: TicketId },
    Keepalive { ticket_id: TicketId },
    Redeem { ticket_id: TicketId },
}

impl Call {
    pub fn ticket_id(&self) -> Option<&TicketId> {
        match self {
            Call::Cancel { ticket_id }
            | Call::GetBeneficiary { ticket_id }
            | Call::GetTimeout { ticket_id }
            | Call::Keepalive { ticket_id }
            | Call::Redeem { ticket_id } => Some(ticket_id),
            Call::GetLifetime => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Call::Cancel { .. } => "cancel",
            Call::GetBeneficiary { .. } => "getBeneficiary",
            Call::GetLifetime => "getLifetime",
            Call::GetTimeout { .. } => "getTimeout",
            Call::Keepalive { .. } => "keepalive",
            Call::Redeem { .. } => "redeem",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Call::GetBeneficiary { .. } | Call::GetLifetime | Call::GetTimeout { .. }
        )
    }

    /// Value reported alongside an error: always defined, never absent.
    pub fn zero_output(&self) -> Output {
        match self {
            Call::Cancel { .. } => Output::Unit,
            Call::GetBeneficiary { .. } => Output::Address(Address::ZERO),
            Call::GetLifetime | Call::GetTimeout { .. } | Call::Keepalive { .. } => {
                Output::Timestamp(0)
            }
            Call::Redeem { .. } => Output::TicketId(TicketId::ZERO),
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ticket_id() {
            Some(id) => write!(f, "{}({})", self.name(), id),
            None => write!(f, "{}()", self.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    Unit,
    Address(Address),
    Timestamp(u64),
    TicketId(TicketId),
}

impl Output {
    /// Encode as a single big-endian, left-padded 32-byte return word.
    pub fn encode_word(&self) -> [u8; 32] {
        let mut word = [0u8; WORD_SIZE as usize];
        match self {
            Output::Unit => {}
            Output::Address(addr) => word[12..].copy_from_slice(addr.as_bytes()),
            Output::Timestamp(t) => word[24..].copy_from_slice(&t.to_be_bytes()),
            Output::TicketId(id) => word.copy_from_slice(id.as_bytes()),
        }
        word
    }
}

/// Result of a dispatched call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub output: Output,
    pub gas_used: u64,
    pub error: Option<Error>,
}

impl Receipt {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Output> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.output),
        }
    }
}

/// Execute one call atomically against `store`, forwarding committed events to `sink`.
///
/// Emission is fire-and-forget: once the store is committed the call has succeeded, and a
/// sink that rejects an event is logged rather than unwinding the commit.
pub fn execute<S, K>(
    store: &mut S,
    sink: &mut K,
    call: &Call,
    ctx: &CallContext,
    gas: &mut GasLedger,
) -> Receipt
where
    S: TicketStore + Clone,
    K: EventSink,
{
    let burned_before = gas.burned();
    let result = run(store, sink, call, ctx, gas);
    let gas_used = gas.burned() - burned_before;

    match result {
        Ok(output) => Receipt {
            output,
            gas_used,
            error: None,
        },
        Err(e) => {
            Logger::warn(&format!("{} by {} failed: {}", call, ctx.caller, e));
            Receipt {
                output: call.zero_output(),
                gas_used,
                error: Some(e),
            }
        }
    }
}

fn run<S, K>(
    store: &mut S,
    sink: &mut K,
    call: &Call,
    ctx: &CallContext,
    gas: &mut GasLedger,
) -> Result<Output>
where
    S: TicketStore + Clone,
    K: EventSink,
{
    if call.is_read_only() {
        let tx = RetryableTx::new(EventLog::new());
        return match call {
            Call::GetBeneficiary { ticket_id } => tx
                .get_beneficiary(&*store, ctx, ticket_id)
                .map(Output::Address),
            Call::GetTimeout { ticket_id } => {
                tx.get_timeout(&*store, ctx, ticket_id).map(Output::Timestamp)
            }
            _ => Ok(Output::Timestamp(tx.get_lifetime())),
        };
    }

    let mut working = store.clone();
    let mut tx = RetryableTx::new(EventLog::new());
    let output = match call {
        Call::Cancel { ticket_id } => {
            tx.cancel(&mut working, ctx, gas, ticket_id)?;
            Output::Unit
        }
        Call::Keepalive { ticket_id } => {
            Output::Timestamp(tx.keepalive(&mut working, ctx, gas, ticket_id)?)
        }
        Call::Redeem { ticket_id } => {
            Output::TicketId(tx.redeem(&mut working, ctx, gas, ticket_id)?)
        }
        Call::GetBeneficiary { .. } | Call::GetLifetime | Call::GetTimeout { .. } => {
            return Err(Error::InvalidInput(format!("{:?} is read-only", call)));
        }
    };

    *store = working;
    for event in tx.into_events().into_events() {
        if let Err(e) = sink.emit(event) {
            Logger::error(&format!("{} committed but event was dropped: {}", call, e));
        }
    }
    Ok(output)
}

/// Insert a new ticket and announce it. Creation is an outer-layer concern.
pub fn create_ticket<K: EventSink>(
    store: &mut MemoryTicketStore,
    sink: &mut K,
    ticket: Ticket,
) -> Result<TicketId> {
    let ticket_id = ticket.id;
    store.insert(ticket)?;
    Logger::debug(&format!("Created ticket {}", ticket_id));
    sink.emit(Event::TicketCreated { ticket_id })?;
    Ok(ticket_id)
}

/// Retire a ticket whose scheduled retry executed successfully.
pub fn complete_redeem<S: TicketStore, K: EventSink>(
    store: &mut S,
    sink: &mut K,
    ticket_id: &TicketId,
    now: u64,
) -> Result<()> {
    store.open(ticket_id, now)?.ok_or(Error::NotFound)?;
    store.delete(ticket_id)?;
    Logger::debug(&format!("Redeemed ticket {}", ticket_id));
    sink.emit(Event::Redeemed {
        ticket_id: *ticket_id,
    })
}
