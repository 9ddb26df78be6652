use thiserror::Error;

use crate::types::Address;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("ticketId not found")]
    NotFound,

    #[error("only the beneficiary may cancel a retryable: caller {caller}, beneficiary {beneficiary}")]
    Unauthorized { caller: Address, beneficiary: Address },

    #[error("Out of gas: need {needed}, have {available}")]
    InsufficientGas { needed: u64, available: u64 },

    #[error("Ticket store error: {0}")]
    StoreError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("State error: {0}")]
    StateError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
