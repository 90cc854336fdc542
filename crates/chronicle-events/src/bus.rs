//! Synchronous publish/subscribe channel for event records.
//!
//! # Design
//!
//! - Subscribers are held as [`Weak`] references. Subscription never keeps
//!   a listener alive; a listener that has been dropped is skipped and
//!   pruned on the next delivery.
//! - Delivery iterates over a snapshot of the subscriber list taken when
//!   the record is dispatched. Every listener subscribed at that moment
//!   receives the record exactly once, even if an earlier listener
//!   unsubscribes it mid-delivery.
//! - A `send` issued from inside a listener is queued and delivered by the
//!   outermost `send` once the current record has reached every listener.
//!   A record is therefore fully absorbed before the outermost call
//!   returns, and each record reaches listeners in subscription order.
//! - Dropping the bus force-unsubscribes every remaining listener and
//!   calls [`EventSubscriber::on_unsubscribe`] on each.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use chronicle_types::{EventRecord, EventSchemas};
use tracing::{debug, warn};

use crate::error::BusError;

/// A listener that receives every valid record sent on the bus.
pub trait EventSubscriber {
    /// Called once per record, synchronously, in subscription order.
    fn notify(&self, record: &EventRecord);

    /// Called when the bus is destroyed while this listener is still
    /// subscribed.
    fn on_unsubscribe(&self) {}
}

/// The shared event channel.
///
/// All methods take `&self` so listeners holding an `Rc<EventBus>` can
/// send, subscribe, and unsubscribe from inside their own callbacks.
pub struct EventBus {
    /// Schemas every record is validated against.
    schemas: Rc<EventSchemas>,
    /// Listeners in subscription order.
    subscribers: RefCell<Vec<Weak<dyn EventSubscriber>>>,
    /// Whether a `send` is currently delivering.
    dispatching: Cell<bool>,
    /// Records sent re-entrantly, awaiting delivery.
    pending: RefCell<VecDeque<EventRecord>>,
}

impl EventBus {
    /// Create a bus that validates records against `schemas`.
    pub fn new(schemas: Rc<EventSchemas>) -> Self {
        Self {
            schemas,
            subscribers: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    /// Return the schema registry this bus validates against.
    pub fn schemas(&self) -> &EventSchemas {
        &self.schemas
    }

    /// Register a listener at the end of the delivery order.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::AlreadySubscribed`] (and logs it) if the
    /// listener is already registered. The subscriber list is unchanged.
    pub fn subscribe(&self, listener: &Rc<dyn EventSubscriber>) -> Result<(), BusError> {
        let mut subscribers = self.subscribers.borrow_mut();
        if subscribers
            .iter()
            .any(|weak| same_listener(weak, listener.as_ref()))
        {
            warn!("Listener subscribed to the event bus twice");
            return Err(BusError::AlreadySubscribed);
        }
        subscribers.push(Rc::downgrade(listener));
        debug!(subscribers = subscribers.len(), "Listener subscribed");
        Ok(())
    }

    /// Deregister a listener.
    ///
    /// Safe to call from inside any listener's `notify`, including the
    /// listener's own. A record already being delivered still reaches every
    /// listener that was subscribed when its delivery began.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NotSubscribed`] (and logs it) if the listener is
    /// not registered.
    pub fn unsubscribe(&self, listener: &dyn EventSubscriber) -> Result<(), BusError> {
        let mut subscribers = self.subscribers.borrow_mut();
        let Some(position) = subscribers
            .iter()
            .position(|weak| same_listener(weak, listener))
        else {
            warn!("Tried to unsubscribe a listener that is not subscribed");
            return Err(BusError::NotSubscribed);
        };
        subscribers.remove(position);
        debug!(subscribers = subscribers.len(), "Listener unsubscribed");
        Ok(())
    }

    /// Return the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Validate `record` and deliver it to every subscriber.
    ///
    /// Invalid records are logged and discarded. When called from inside a
    /// listener, the record is queued and delivered before the outermost
    /// `send` returns.
    pub fn send(&self, record: EventRecord) {
        if let Err(err) = self.schemas.validate(&record) {
            warn!(kind = %record.kind(), %err, "Discarding invalid event record");
            return;
        }

        if self.dispatching.get() {
            debug!(kind = %record.kind(), "Queueing re-entrant event record");
            self.pending.borrow_mut().push_back(record);
            return;
        }

        let _guard = DispatchGuard::enter(&self.dispatching);
        let mut next = Some(record);
        while let Some(record) = next {
            self.deliver(&record);
            next = self.pending.borrow_mut().pop_front();
        }
    }

    /// Deliver one record to a snapshot of the subscriber list.
    fn deliver(&self, record: &EventRecord) {
        let snapshot = self.subscribers.borrow().clone();
        for weak in &snapshot {
            if let Some(listener) = weak.upgrade() {
                listener.notify(record);
            }
        }
        self.subscribers
            .borrow_mut()
            .retain(|weak| weak.strong_count() > 0);
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("dispatching", &self.dispatching.get())
            .field("pending", &self.pending.borrow().len())
            .finish_non_exhaustive()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        let subscribers = std::mem::take(self.subscribers.get_mut());
        let mut released: usize = 0;
        for listener in subscribers.iter().filter_map(Weak::upgrade) {
            listener.on_unsubscribe();
            released = released.saturating_add(1);
        }
        debug!(released, "Event bus dropped, listeners force-unsubscribed");
    }
}

/// Whether `weak` refers to the same allocation as `listener`.
fn same_listener(weak: &Weak<dyn EventSubscriber>, listener: &dyn EventSubscriber) -> bool {
    std::ptr::addr_eq(weak.as_ptr(), std::ptr::from_ref(listener))
}

/// Clears the dispatching flag when delivery ends, even on unwind.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_types::{EventSchema, Turn, ValueType};

    type Log = Rc<RefCell<Vec<String>>>;

    /// Appends `name:kind` to a shared log on every record.
    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl EventSubscriber for Recorder {
        fn notify(&self, record: &EventRecord) {
            self.log
                .borrow_mut()
                .push(format!("{}:{}", self.name, record.kind()));
        }

        fn on_unsubscribe(&self) {
            self.log.borrow_mut().push(format!("{}:released", self.name));
        }
    }

    /// Unsubscribes `victim` the first time it is notified.
    struct Assassin {
        bus: Rc<EventBus>,
        victim: RefCell<Option<Rc<dyn EventSubscriber>>>,
    }

    impl EventSubscriber for Assassin {
        fn notify(&self, _record: &EventRecord) {
            if let Some(victim) = self.victim.borrow_mut().take() {
                assert_eq!(self.bus.unsubscribe(victim.as_ref()), Ok(()));
            }
        }
    }

    /// Sends a follow-up record whenever it sees `kill`.
    struct Echo {
        bus: Rc<EventBus>,
        log: Log,
    }

    impl EventSubscriber for Echo {
        fn notify(&self, record: &EventRecord) {
            self.log.borrow_mut().push(format!("echo:{}", record.kind()));
            if record.kind().as_str() == "kill" {
                self.bus.send(EventRecord::of("award", Turn(0)));
            }
        }
    }

    fn schemas() -> Rc<EventSchemas> {
        let mut schemas = EventSchemas::new();
        schemas.register(EventSchema::new("kill").field("damage", ValueType::Int));
        schemas.register(EventSchema::new("award"));
        Rc::new(schemas)
    }

    fn recorder(name: &'static str, log: &Log) -> Rc<dyn EventSubscriber> {
        Rc::new(Recorder {
            name,
            log: Rc::clone(log),
        })
    }

    fn kill() -> EventRecord {
        EventRecord::of("kill", Turn(0)).with("damage", 3)
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new(schemas());
        let log = Log::default();
        let first = recorder("a", &log);
        let second = recorder("b", &log);
        assert_eq!(bus.subscribe(&first), Ok(()));
        assert_eq!(bus.subscribe(&second), Ok(()));

        bus.send(kill());
        assert_eq!(*log.borrow(), vec!["a:kill", "b:kill"]);
    }

    #[test]
    fn double_subscribe_and_stray_unsubscribe_are_rejected() {
        let bus = EventBus::new(schemas());
        let log = Log::default();
        let listener = recorder("a", &log);
        assert_eq!(bus.subscribe(&listener), Ok(()));
        assert_eq!(bus.subscribe(&listener), Err(BusError::AlreadySubscribed));
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(bus.unsubscribe(listener.as_ref()), Ok(()));
        assert_eq!(
            bus.unsubscribe(listener.as_ref()),
            Err(BusError::NotSubscribed)
        );
    }

    #[test]
    fn invalid_records_are_discarded() {
        let bus = EventBus::new(schemas());
        let log = Log::default();
        let listener = recorder("a", &log);
        assert_eq!(bus.subscribe(&listener), Ok(()));

        bus.send(EventRecord::of("kill", Turn(0)));
        bus.send(EventRecord::of("", Turn(0)));
        bus.send(EventRecord::of("sneeze", Turn(0)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn unsubscribing_a_later_listener_mid_delivery_still_delivers_once() {
        let bus = Rc::new(EventBus::new(schemas()));
        let log = Log::default();
        let victim = recorder("victim", &log);
        let assassin: Rc<dyn EventSubscriber> = Rc::new(Assassin {
            bus: Rc::clone(&bus),
            victim: RefCell::new(Some(Rc::clone(&victim))),
        });
        let before = recorder("before", &log);

        assert_eq!(bus.subscribe(&before), Ok(()));
        assert_eq!(bus.subscribe(&assassin), Ok(()));
        assert_eq!(bus.subscribe(&victim), Ok(()));

        bus.send(kill());
        assert_eq!(*log.borrow(), vec!["before:kill", "victim:kill"]);

        bus.send(kill());
        assert_eq!(
            *log.borrow(),
            vec!["before:kill", "victim:kill", "before:kill"]
        );
    }

    #[test]
    fn reentrant_send_is_delivered_after_the_current_record() {
        let bus = Rc::new(EventBus::new(schemas()));
        let log = Log::default();
        let echo: Rc<dyn EventSubscriber> = Rc::new(Echo {
            bus: Rc::clone(&bus),
            log: Rc::clone(&log),
        });
        let tail = recorder("tail", &log);
        assert_eq!(bus.subscribe(&echo), Ok(()));
        assert_eq!(bus.subscribe(&tail), Ok(()));

        bus.send(kill());
        assert_eq!(
            *log.borrow(),
            vec!["echo:kill", "tail:kill", "echo:award", "tail:award"]
        );
    }

    #[test]
    fn dropped_listeners_are_skipped() {
        let bus = EventBus::new(schemas());
        let log = Log::default();
        let listener = recorder("a", &log);
        assert_eq!(bus.subscribe(&listener), Ok(()));
        drop(listener);

        bus.send(kill());
        assert!(log.borrow().is_empty());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn dropping_the_bus_releases_remaining_listeners() {
        let bus = EventBus::new(schemas());
        let log = Log::default();
        let kept = recorder("kept", &log);
        let gone = recorder("gone", &log);
        assert_eq!(bus.subscribe(&kept), Ok(()));
        assert_eq!(bus.subscribe(&gone), Ok(()));
        assert_eq!(bus.unsubscribe(gone.as_ref()), Ok(()));

        drop(bus);
        assert_eq!(*log.borrow(), vec!["kept:released"]);
    }
}
