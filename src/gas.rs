//! Gas ledger and the protocol cost formulas charged by the retryable controller.
//!
//! Prices mirror the execution engine's storage pricing; every implementation must
//! charge the same amounts, so all formulas here are integer-exact.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const WORD_SIZE: u64 = 32;

/// Price of writing one fresh storage word.
pub const STORAGE_WRITE_GAS: u64 = 20_000;

/// Price of reading one storage word.
pub const STORAGE_READ_GAS: u64 = 50;

/// Expiry updates are billed at 1/UPDATE_DISCOUNT of a fresh write.
pub const UPDATE_DISCOUNT: u64 = 100;

/// Price of copying one word into return data.
pub const COPY_GAS: u64 = 3;

/// Reserved by Redeem so the caller can still pay for its own 32-byte result.
pub const RETURN_ENCODING_COST: u64 = WORD_SIZE * COPY_GAS;

pub const LOG_GAS: u64 = 375;
pub const LOG_TOPIC_GAS: u64 = 375;
pub const LOG_DATA_GAS: u64 = 8;

/// Number of 32-byte words needed to hold `nbytes` (rounded up).
pub fn words_for_bytes(nbytes: u64) -> u64 {
    nbytes / WORD_SIZE + u64::from(nbytes % WORD_SIZE != 0)
}

fn overflow() -> Error {
    Error::InsufficientGas {
        needed: u64::MAX,
        available: 0,
    }
}

/// Cost of resetting a ticket's expiry: discounted per-word storage update.
pub fn keepalive_cost(size_bytes: u64) -> Result<u64> {
    words_for_bytes(size_bytes)
        .checked_mul(STORAGE_WRITE_GAS)
        .map(|gas| gas / UPDATE_DISCOUNT)
        .ok_or_else(overflow)
}

/// Cost of reading a ticket before scheduling a redeem.
pub fn redeem_read_cost(size_bytes: u64) -> Result<u64> {
    STORAGE_READ_GAS
        .checked_mul(words_for_bytes(size_bytes))
        .ok_or_else(overflow)
}

/// Cost of emitting a log with `topics` topics and `data_bytes` bytes of data.
pub fn log_cost(topics: u64, data_bytes: u64) -> u64 {
    LOG_GAS
        .saturating_add(LOG_TOPIC_GAS.saturating_mul(topics))
        .saturating_add(LOG_DATA_GAS.saturating_mul(data_bytes))
}

/// Gas meter for a single call.
///
/// Invariants:
/// - `remaining + burned` never exceeds the starting budget
/// - a failed burn drains the meter, as the engine does on out-of-gas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLedger {
    remaining: u64,
    burned: u64,
}

impl GasLedger {
    pub fn new(limit: u64) -> Self {
        GasLedger {
            remaining: limit,
            burned: 0,
        }
    }

    /// Debit `amount`; fails with `InsufficientGas` and drains the ledger if short.
    pub fn burn(&mut self, amount: u64) -> Result<()> {
        if self.remaining < amount {
            let available = self.remaining;
            self.burned += available;
            self.remaining = 0;
            return Err(Error::InsufficientGas {
                needed: amount,
                available,
            });
        }
        self.remaining -= amount;
        self.burned += amount;
        Ok(())
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn burned(&self) -> u64 {
        self.burned
    }
}
