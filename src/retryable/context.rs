use crate::types::Address;

/// Per-call execution context handed in by the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub caller: Address,
    /// Block timestamp (seconds) the call executes at.
    pub now: u64,
}

impl CallContext {
    pub fn new(caller: Address, now: u64) -> Self {
        CallContext { caller, now }
    }
}
