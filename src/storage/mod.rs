pub mod kv;

pub use kv::FileStorage;

use crate::error::Result;
use crate::event::Event;
use crate::ticket::MemoryTicketStore;

/// Durable backing for the CLI harness: an append-only event log plus the latest
/// ticket store snapshot.
///
/// Implementations must preserve:
/// - Append-only semantics for the event log
/// - Atomic snapshot writes (crash-safe)
pub trait Storage {
    /// Append a committed event to the log (fsync before ack)
    fn append_event(&mut self, event: &Event) -> Result<()>;

    /// All logged events in append order.
    fn load_events(&self) -> Result<Vec<Event>>;

    /// Load the latest ticket store snapshot; `None` if nothing has been persisted.
    fn load_store(&self) -> Result<Option<MemoryTicketStore>>;

    /// Persist the ticket store atomically (write to temp file, fsync, rename)
    fn persist_store(&mut self, store: &MemoryTicketStore) -> Result<()>;

    /// Record a committed call: events first, then the snapshot. A failed append
    /// leaves the previous snapshot in place.
    fn commit(&mut self, store: &MemoryTicketStore, events: &[Event]) -> Result<()> {
        for event in events {
            self.append_event(event)?;
        }
        self.persist_store(store)
    }
}
