//! Fixed-width identifiers: 32-byte ticket ids and 20-byte account addresses.
//!
//! Both render as `0x`-prefixed lowercase hex and parse with or without the prefix.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const HEX_PREFIX: &str = "0x";

fn decode_fixed<const N: usize>(s: &str, what: &str) -> Result<[u8; N]> {
    let s = s.trim();
    let hex_part = s.strip_prefix(HEX_PREFIX).unwrap_or(s);
    let bytes = hex::decode(hex_part.to_lowercase())
        .map_err(|e| Error::InvalidInput(format!("Invalid {} hex: {}", what, e)))?;
    let len = bytes.len();
    bytes.try_into().map_err(|_| {
        Error::InvalidInput(format!("Expected {}-byte {}, got {} bytes", N, what, len))
    })
}

/// Ticket identifier; retry-attempt ids use the same representation.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TicketId(pub [u8; 32]);

impl TicketId {
    pub const ZERO: TicketId = TicketId([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", HEX_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for TicketId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed::<32>(s, "ticket id").map(TicketId)
    }
}

#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", HEX_PREFIX, hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        decode_fixed::<20>(s, "address").map(Address)
    }
}
