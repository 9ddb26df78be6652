//! Retryable ticket controller: cancel, inspect, keep alive and schedule redeems of
//! tickets that already exist in a [`TicketStore`].
//!
//! Every entry point opens the ticket at `ctx.now`, authorizes, charges gas, mutates or
//! queries, then emits an event. Log gas for an event is burned at emission, so a call
//! that fails before emitting pays nothing for it. Atomicity across a failed call is provided by the
//! dispatch layer, which runs the controller against a working copy of the store.

pub mod context;

pub use context::CallContext;

use crate::error::{Error, Result};
use crate::event::{Event, EventSink};
use crate::gas::{keepalive_cost, redeem_read_cost, GasLedger, RETURN_ENCODING_COST};
use crate::logger::Logger;
use crate::ticket::{retry_attempt_id, TicketStore, RETRYABLE_LIFETIME_SECONDS};
use crate::types::{Address, TicketId};

pub struct RetryableTx<E: EventSink> {
    events: E,
}

impl<E: EventSink> RetryableTx<E> {
    pub fn new(events: E) -> Self {
        RetryableTx { events }
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn into_events(self) -> E {
        self.events
    }

    /// Burn the event's log gas, then hand it to the sink.
    fn emit(&mut self, gas: &mut GasLedger, event: Event) -> Result<()> {
        gas.burn(event.kind().gas_cost())?;
        self.events.emit(event)
    }

    /// Delete a ticket on behalf of its beneficiary. No rent is refunded.
    pub fn cancel<S: TicketStore>(
        &mut self,
        store: &mut S,
        ctx: &CallContext,
        gas: &mut GasLedger,
        ticket_id: &TicketId,
    ) -> Result<()> {
        open_live(&*store, ticket_id, ctx.now)?;
        let beneficiary = store.beneficiary(ticket_id)?;
        if ctx.caller != beneficiary {
            return Err(Error::Unauthorized {
                caller: ctx.caller,
                beneficiary,
            });
        }

        store.delete(ticket_id)?;
        Logger::debug(&format!("Canceled ticket {} by {}", ticket_id, ctx.caller));
        self.emit(
            gas,
            Event::Canceled {
                ticket_id: *ticket_id,
            },
        )
    }

    pub fn get_beneficiary<S: TicketStore>(
        &self,
        store: &S,
        ctx: &CallContext,
        ticket_id: &TicketId,
    ) -> Result<Address> {
        open_live(&*store, ticket_id, ctx.now)?;
        store.beneficiary(ticket_id)
    }

    /// Rent window granted per keepalive; no lookup and no metering.
    pub fn get_lifetime(&self) -> u64 {
        RETRYABLE_LIFETIME_SECONDS
    }

    pub fn get_timeout<S: TicketStore>(
        &self,
        store: &S,
        ctx: &CallContext,
        ticket_id: &TicketId,
    ) -> Result<u64> {
        open_live(&*store, ticket_id, ctx.now)?;
        store.timeout(ticket_id)
    }

    /// Reset a ticket's expiry to `now + lifetime`, charging a discounted storage update.
    ///
    /// Returns the timeout committed by the store.
    pub fn keepalive<S: TicketStore>(
        &mut self,
        store: &mut S,
        ctx: &CallContext,
        gas: &mut GasLedger,
        ticket_id: &TicketId,
    ) -> Result<u64> {
        let nbytes = store.size_bytes(ticket_id, ctx.now)?;
        if nbytes == 0 {
            return Err(Error::NotFound);
        }
        gas.burn(keepalive_cost(nbytes)?)?;

        let window = ctx.now.checked_add(RETRYABLE_LIFETIME_SECONDS).ok_or_else(|| {
            Error::StoreError("timeout overflows".to_string())
        })?;
        store.extend_expiry(ticket_id, ctx.now, window, RETRYABLE_LIFETIME_SECONDS)?;

        open_live(&*store, ticket_id, ctx.now)?;
        let new_timeout = store.timeout(ticket_id)?;
        Logger::debug(&format!(
            "Extended ticket {} to timeout {}",
            ticket_id, new_timeout
        ));
        self.emit(
            gas,
            Event::LifetimeExtended {
                ticket_id: *ticket_id,
                new_timeout,
            },
        )?;
        Ok(new_timeout)
    }

    /// Schedule a redeem attempt and donate all gas but the return-encoding reserve to it.
    ///
    /// The read charge is burned before liveness is checked and is kept even when the
    /// ticket turns out to be absent.
    pub fn redeem<S: TicketStore>(
        &mut self,
        store: &mut S,
        ctx: &CallContext,
        gas: &mut GasLedger,
        ticket_id: &TicketId,
    ) -> Result<TicketId> {
        let byte_count = store.size_bytes(ticket_id, ctx.now)?;
        gas.burn(redeem_read_cost(byte_count)?)?;

        open_live(&*store, ticket_id, ctx.now)?;
        let sequence_num = store.increment_attempt(ticket_id)?;
        let retry_tx_id = retry_attempt_id(ticket_id, sequence_num);
        let scheduled = Event::RedeemScheduled {
            ticket_id: *ticket_id,
            retry_tx_id,
            sequence_num,
            donated_gas: gas.remaining(),
            gas_donor: ctx.caller,
        };
        self.emit(gas, scheduled)?;

        // The burned gas is credited back to the pool right before the retry executes.
        if gas.remaining() < RETURN_ENCODING_COST {
            // drains the meter and fails: the caller could not pay for its own result
            gas.burn(RETURN_ENCODING_COST)?;
        }
        gas.burn(gas.remaining() - RETURN_ENCODING_COST)?;

        Logger::debug(&format!(
            "Scheduled redeem {} of ticket {} as {}",
            sequence_num, ticket_id, retry_tx_id
        ));
        Ok(retry_tx_id)
    }
}

fn open_live<S: TicketStore>(store: &S, ticket_id: &TicketId, now: u64) -> Result<()> {
    store.open(ticket_id, now)?.ok_or(Error::NotFound).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventKind, EventLog};
    use crate::gas::{keepalive_cost, STORAGE_WRITE_GAS, UPDATE_DISCOUNT};
    use crate::ticket::{MemoryTicketStore, Ticket};

    const NOW: u64 = 1000;

    fn alice() -> Address {
        Address([0xa1; 20])
    }

    fn bob() -> Address {
        Address([0xb0; 20])
    }

    fn ticket_id() -> TicketId {
        TicketId([0x11; 32])
    }

    fn store_with_ticket(timeout: u64) -> MemoryTicketStore {
        let mut store = MemoryTicketStore::new();
        store
            .insert(Ticket::new(
                ticket_id(),
                bob(),
                bob(),
                0,
                alice(),
                vec![1, 2, 3],
                timeout,
            ))
            .unwrap();
        store
    }

    fn controller() -> RetryableTx<EventLog> {
        RetryableTx::new(EventLog::new())
    }

    /// Store holding a single live ticket with a fixed billed size.
    struct FixedSizeStore {
        inner: MemoryTicketStore,
        size: u64,
    }

    impl TicketStore for FixedSizeStore {
        fn open(&self, id: &TicketId, now: u64) -> Result<Option<Ticket>> {
            self.inner.open(id, now)
        }
        fn delete(&mut self, id: &TicketId) -> Result<u64> {
            self.inner.delete(id)
        }
        fn size_bytes(&self, id: &TicketId, now: u64) -> Result<u64> {
            Ok(if self.inner.size_bytes(id, now)? == 0 { 0 } else { self.size })
        }
        fn extend_expiry(&mut self, id: &TicketId, now: u64, t: u64, l: u64) -> Result<()> {
            self.inner.extend_expiry(id, now, t, l)
        }
        fn increment_attempt(&mut self, id: &TicketId) -> Result<u64> {
            self.inner.increment_attempt(id)
        }
        fn beneficiary(&self, id: &TicketId) -> Result<Address> {
            self.inner.beneficiary(id)
        }
        fn timeout(&self, id: &TicketId) -> Result<u64> {
            self.inner.timeout(id)
        }
    }

    #[test]
    fn test_cancel_by_beneficiary() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let mut gas = GasLedger::new(10_000);
        tx.cancel(&mut store, &CallContext::new(alice(), NOW), &mut gas, &ticket_id())
            .unwrap();
        assert!(store.is_empty());
        assert_eq!(gas.burned(), EventKind::Canceled.gas_cost());
        assert_eq!(
            tx.events().events(),
            &[Event::Canceled {
                ticket_id: ticket_id()
            }]
        );
    }

    #[test]
    fn test_cancel_unauthorized_keeps_ticket() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let mut gas = GasLedger::new(10_000);
        let err = tx
            .cancel(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert_eq!(
            err,
            Error::Unauthorized {
                caller: bob(),
                beneficiary: alice()
            }
        );
        assert_eq!(store.len(), 1);
        assert!(tx.events().is_empty());
        assert_eq!(gas.burned(), 0);
    }

    #[test]
    fn test_cancel_expired_not_found() {
        let mut store = store_with_ticket(NOW);
        let mut tx = controller();
        let mut gas = GasLedger::new(10);
        let err = tx
            .cancel(&mut store, &CallContext::new(alice(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert_eq!(err, Error::NotFound);
        assert_eq!(gas.burned(), 0);
    }

    #[test]
    fn test_cancel_event_gas_short_fails() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let mut gas = GasLedger::new(EventKind::Canceled.gas_cost() - 1);
        let err = tx
            .cancel(&mut store, &CallContext::new(alice(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientGas { .. }));
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_queries() {
        let store = store_with_ticket(NOW + 10);
        let tx = controller();
        let ctx = CallContext::new(bob(), NOW);
        assert_eq!(tx.get_beneficiary(&store, &ctx, &ticket_id()).unwrap(), alice());
        assert_eq!(tx.get_timeout(&store, &ctx, &ticket_id()).unwrap(), NOW + 10);
        assert_eq!(tx.get_lifetime(), 604_800);
    }

    #[test]
    fn test_queries_absent() {
        let store = MemoryTicketStore::new();
        let tx = controller();
        let ctx = CallContext::new(bob(), NOW);
        assert_eq!(tx.get_beneficiary(&store, &ctx, &ticket_id()), Err(Error::NotFound));
        assert_eq!(tx.get_timeout(&store, &ctx, &ticket_id()), Err(Error::NotFound));
    }

    #[test]
    fn test_keepalive_scenario_64_bytes() {
        let mut store = FixedSizeStore {
            inner: store_with_ticket(NOW + 10),
            size: 64,
        };
        let mut tx = controller();
        let mut gas = GasLedger::new(10_000);
        let new_timeout = tx
            .keepalive(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap();

        assert_eq!(new_timeout, 605_800);
        assert_eq!(
            gas.burned(),
            2 * STORAGE_WRITE_GAS / UPDATE_DISCOUNT + EventKind::LifetimeExtended.gas_cost()
        );
        assert_eq!(
            tx.events().events(),
            &[Event::LifetimeExtended {
                ticket_id: ticket_id(),
                new_timeout: 605_800
            }]
        );
    }

    #[test]
    fn test_keepalive_resets_not_stacks() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let ctx = CallContext::new(bob(), NOW);
        let mut gas = GasLedger::new(10_000);
        let first = tx.keepalive(&mut store, &ctx, &mut gas, &ticket_id()).unwrap();
        let second = tx.keepalive(&mut store, &ctx, &mut gas, &ticket_id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.timeout(&ticket_id()).unwrap(), NOW + RETRYABLE_LIFETIME_SECONDS);
    }

    #[test]
    fn test_keepalive_insufficient_gas_no_mutation() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let cost = keepalive_cost(store.size_bytes(&ticket_id(), NOW).unwrap()).unwrap();
        let mut gas = GasLedger::new(cost - 1);
        let err = tx
            .keepalive(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientGas { .. }));
        assert_eq!(store.timeout(&ticket_id()).unwrap(), NOW + 10);
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_keepalive_absent_burns_nothing() {
        let mut store = MemoryTicketStore::new();
        let mut tx = controller();
        let mut gas = GasLedger::new(1);
        let err = tx
            .keepalive(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert_eq!(err, Error::NotFound);
        assert_eq!(gas.burned(), 0);
    }

    #[test]
    fn test_redeem_donates_all_but_reserve() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let mut gas = GasLedger::new(100_000);
        let read = redeem_read_cost(store.size_bytes(&ticket_id(), NOW).unwrap()).unwrap();

        let retry = tx
            .redeem(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap();

        assert_eq!(retry, retry_attempt_id(&ticket_id(), 1));
        assert_eq!(gas.remaining(), RETURN_ENCODING_COST);
        assert_eq!(store.get(&ticket_id()).unwrap().num_tries, 1);
        match &tx.events().events()[0] {
            Event::RedeemScheduled {
                sequence_num,
                donated_gas,
                gas_donor,
                retry_tx_id,
                ..
            } => {
                assert_eq!(*sequence_num, 1);
                assert_eq!(*donated_gas, 100_000 - read);
                assert_eq!(*gas_donor, bob());
                assert_eq!(*retry_tx_id, retry);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_redeem_sequence_numbers_increase() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let ctx = CallContext::new(bob(), NOW);
        let first = tx
            .redeem(&mut store, &ctx, &mut GasLedger::new(100_000), &ticket_id())
            .unwrap();
        let second = tx
            .redeem(&mut store, &ctx, &mut GasLedger::new(100_000), &ticket_id())
            .unwrap();
        assert_ne!(first, second);
        let seqs: Vec<u64> = tx
            .events()
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::RedeemScheduled { sequence_num, .. } => Some(*sequence_num),
                _ => None,
            })
            .collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn test_redeem_below_reserve_fails_and_drains() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let read = redeem_read_cost(store.size_bytes(&ticket_id(), NOW).unwrap()).unwrap();
        let scheduled = EventKind::RedeemScheduled.gas_cost();
        let mut gas = GasLedger::new(read + scheduled + RETURN_ENCODING_COST - 1);

        let err = tx
            .redeem(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();

        assert_eq!(
            err,
            Error::InsufficientGas {
                needed: RETURN_ENCODING_COST,
                available: RETURN_ENCODING_COST - 1
            }
        );
        assert_eq!(gas.remaining(), 0);
        // the attempt was recorded before the donation failed; dispatch discards it
        assert_eq!(store.get(&ticket_id()).unwrap().num_tries, 1);
    }

    #[test]
    fn test_redeem_short_of_event_gas_fails_before_donation() {
        let mut store = store_with_ticket(NOW + 10);
        let mut tx = controller();
        let read = redeem_read_cost(store.size_bytes(&ticket_id(), NOW).unwrap()).unwrap();
        let mut gas = GasLedger::new(read + 10);

        let err = tx
            .redeem(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();

        assert_eq!(
            err,
            Error::InsufficientGas {
                needed: EventKind::RedeemScheduled.gas_cost(),
                available: 10
            }
        );
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_redeem_absent_not_found_without_charge() {
        let mut store = MemoryTicketStore::new();
        let mut tx = controller();
        let mut gas = GasLedger::new(1000);
        let err = tx
            .redeem(&mut store, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert_eq!(err, Error::NotFound);
        // zero size means zero words read
        assert_eq!(gas.burned(), 0);
        assert!(tx.events().is_empty());
    }

    #[test]
    fn test_redeem_read_charge_kept_when_ticket_vanishes() {
        // size query reports a live ticket but open does not: the read charge stays burned
        struct Vanishing;
        impl TicketStore for Vanishing {
            fn open(&self, _: &TicketId, _: u64) -> Result<Option<Ticket>> {
                Ok(None)
            }
            fn delete(&mut self, _: &TicketId) -> Result<u64> {
                Err(Error::NotFound)
            }
            fn size_bytes(&self, _: &TicketId, _: u64) -> Result<u64> {
                Ok(256)
            }
            fn extend_expiry(&mut self, _: &TicketId, _: u64, _: u64, _: u64) -> Result<()> {
                Err(Error::NotFound)
            }
            fn increment_attempt(&mut self, _: &TicketId) -> Result<u64> {
                Err(Error::NotFound)
            }
            fn beneficiary(&self, _: &TicketId) -> Result<Address> {
                Err(Error::NotFound)
            }
            fn timeout(&self, _: &TicketId) -> Result<u64> {
                Err(Error::NotFound)
            }
        }

        let mut tx = controller();
        let mut gas = GasLedger::new(1000);
        let err = tx
            .redeem(&mut Vanishing, &CallContext::new(bob(), NOW), &mut gas, &ticket_id())
            .unwrap_err();
        assert_eq!(err, Error::NotFound);
        assert_eq!(gas.burned(), redeem_read_cost(256).unwrap());
    }
}
