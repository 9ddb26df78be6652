use crate::gas::{words_for_bytes, WORD_SIZE};
use crate::types::{Address, TicketId};
use serde::{Deserialize, Serialize};

/// Fixed word-sized fields billed for every ticket: id, from, to, call value,
/// beneficiary and timeout.
const FIXED_FIELD_WORDS: u64 = 6;

/// Retryable ticket record: a cross-layer message that may be retried until it expires.
///
/// Identity: `id`
///
/// Invariants:
/// - `num_tries` is monotonic
/// - the ticket is live only while `now < timeout`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,

    /// Sender of the original message
    pub from: Address,

    /// Destination of the retried call
    pub to: Address,

    pub call_value: u128,

    /// Account allowed to cancel the ticket
    pub beneficiary: Address,

    pub calldata: Vec<u8>,

    /// Absolute expiry timestamp (seconds)
    pub timeout: u64,

    /// Redemption attempts made so far
    pub num_tries: u64,
}

impl Ticket {
    pub fn new(
        id: TicketId,
        from: Address,
        to: Address,
        call_value: u128,
        beneficiary: Address,
        calldata: Vec<u8>,
        timeout: u64,
    ) -> Self {
        Ticket {
            id,
            from,
            to,
            call_value,
            beneficiary,
            calldata,
            timeout,
            num_tries: 0,
        }
    }

    pub fn is_live(&self, now: u64) -> bool {
        now < self.timeout
    }

    /// Byte footprint billed for rent: the fixed fields, a calldata length word,
    /// and the calldata rounded up to whole words.
    pub fn size_bytes(&self) -> u64 {
        let calldata = WORD_SIZE + WORD_SIZE * words_for_bytes(self.calldata.len() as u64);
        FIXED_FIELD_WORDS * WORD_SIZE + calldata
    }

    /// Record one more redemption attempt and return the new count.
    pub fn increment_num_tries(&mut self) -> Option<u64> {
        self.num_tries = self.num_tries.checked_add(1)?;
        Some(self.num_tries)
    }
}
