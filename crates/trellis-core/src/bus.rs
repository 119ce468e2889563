//! Per-object publish/subscribe.
//!
//! Every controller, view, model and the application own an [`EventBus`]. A
//! bus holds the object's copy of its [`EventClass`] slot table and the set of
//! observers that receive the events the object triggers.
//!
//! # Delivery
//!
//! [`EventBus::trigger_event`] delivers synchronously, on the calling thread,
//! to a snapshot of the observers taken when the call starts. Observers added
//! or removed by a handler only affect later triggers. An object may observe
//! itself.
//!
//! Observers are either other participants, held as non-owning references, or
//! plain callbacks. A participant that has been dropped is skipped and pruned.
//!
//! # Receiving
//!
//! A participant receiving an event runs every slot its bus holds for the
//! event name: the class slots (bound to the receiving object) first, then
//! plain callbacks added with [`EventBus::add_event_slot`]. A handler failing
//! with [`Error::PayloadMismatch`] is skipped; any other error stops
//! delivery and propagates to whoever triggered the event.
//!
//! Delivery takes no lock of the owning object. Handlers that touch shared
//! state take the owner's lock themselves.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Result};
use crate::event::{Event, ObjectId, Payload, Trigger, next_object_id};
use crate::meta::{DeclareEvents, EventClass, SlotMeta};

/// A plain callback observer or slot handler.
pub type Callback = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// An object that owns an event bus.
pub trait EventObject: Any + Send + Sync {
    /// The bus of this object.
    fn event_bus(&self) -> &EventBus;
}

impl dyn EventObject {
    /// Relay `event` to the slots of this object.
    pub fn receive_event(&self, event: &Event) -> Result<()> {
        let receiver: &dyn Any = self;
        self.event_bus().dispatch(receiver, event)
    }

    /// The identity of this object.
    pub fn object_id(&self) -> ObjectId {
        self.event_bus().id()
    }
}

/// Event bus helpers available on every sized participant.
pub trait EventObjectExt: EventObject + Sized {
    /// Relay `event` to the slots of this object.
    fn receive_event(&self, event: &Event) -> Result<()> {
        self.event_bus().dispatch(self, event)
    }

    /// Trigger `name` on this object's bus.
    fn trigger_event(&self, name: &str, data: Option<Payload>) -> Result<()> {
        self.event_bus().trigger_event(name, data)
    }

    /// The identity of this object.
    fn object_id(&self) -> ObjectId {
        self.event_bus().id()
    }
}

impl<T: EventObject> EventObjectExt for T {}

/// A registered observer.
#[derive(Clone)]
pub enum ObserverRef {
    /// Another participant; events are relayed to its slots.
    Object {
        /// Identity of the observing object.
        id: ObjectId,
        /// Non-owning reference to the observing object.
        target: Weak<dyn EventObject>,
    },
    /// A plain callback, identified by its allocation.
    Callback(Callback),
}

impl ObserverRef {
    /// Observer for a live participant.
    pub fn object<T: EventObject>(target: &Arc<T>) -> Self {
        let weak: Weak<T> = Arc::downgrade(target);
        Self::Object {
            id: target.event_bus().id(),
            target: weak,
        }
    }

    /// Observer for a participant known only by a weak reference.
    ///
    /// Fails with [`Error::InvalidHandler`] if the object is already gone.
    pub fn from_weak(target: Weak<dyn EventObject>) -> Result<Self> {
        let strong = target.upgrade().ok_or_else(|| {
            Error::InvalidHandler("observer has already been dropped".to_string())
        })?;
        Ok(Self::Object {
            id: strong.object_id(),
            target,
        })
    }

    /// Observer that calls `f` for every event.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(f))
    }

    fn key(&self) -> ObserverKey {
        match self {
            Self::Object { id, .. } => ObserverKey::Object(*id),
            Self::Callback(f) => ObserverKey::Callback(Arc::as_ptr(f) as *const () as usize),
        }
    }

    fn is_alive(&self) -> bool {
        match self {
            Self::Object { target, .. } => target.strong_count() > 0,
            Self::Callback(_) => true,
        }
    }

    fn deliver(&self, event: &Event) -> Result<()> {
        match self {
            Self::Object { target, .. } => match target.upgrade() {
                Some(target) => target.receive_event(event),
                None => Ok(()),
            },
            Self::Callback(f) => f(event),
        }
    }
}

impl<T: EventObject> From<&Arc<T>> for ObserverRef {
    fn from(target: &Arc<T>) -> Self {
        Self::object(target)
    }
}

impl fmt::Debug for ObserverRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object { id, .. } => f.debug_tuple("Object").field(id).finish(),
            Self::Callback(_) => f.write_str("Callback"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObserverKey {
    Object(ObjectId),
    Callback(usize),
}

/// A handler held in the instance slot table.
///
/// The kind is fixed when the handler is registered.
#[derive(Clone)]
enum Handler {
    /// A class slot, invoked with the receiving object.
    Bound(SlotMeta),
    /// A plain callback added to this instance only.
    Plain(Callback),
}

/// The publish/subscribe state of one object.
pub struct EventBus {
    id: ObjectId,
    class: Arc<EventClass>,
    hooks: RwLock<BTreeSet<String>>,
    slots: RwLock<BTreeMap<String, Vec<Handler>>>,
    observers: Mutex<Vec<ObserverRef>>,
}

impl EventBus {
    /// Create the bus for an instance of `T`.
    ///
    /// The instance starts with its own copy of `T`'s hooks and slots.
    pub fn new<T: DeclareEvents>() -> Self {
        let class = EventClass::of::<T>();
        let slots = class
            .slot_table()
            .iter()
            .map(|(name, slots)| {
                (
                    name.clone(),
                    slots.iter().cloned().map(Handler::Bound).collect(),
                )
            })
            .collect();

        Self {
            id: next_object_id(),
            hooks: RwLock::new(class.hook_set().clone()),
            slots: RwLock::new(slots),
            observers: Mutex::new(Vec::new()),
            class,
        }
    }

    /// The identity of the owning object.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The event class of the owning object.
    pub fn class(&self) -> &Arc<EventClass> {
        &self.class
    }

    /// Type name of the owning object.
    pub fn type_name(&self) -> &'static str {
        self.class.type_name()
    }

    /// Event names the owning object can emit.
    pub fn event_hooks(&self) -> Vec<String> {
        self.hooks.read().iter().cloned().collect()
    }

    /// Whether the owning object can emit `name`.
    pub fn has_event_hook(&self, name: &str) -> bool {
        self.hooks.read().contains(name)
    }

    /// Event names the owning object handles.
    pub fn event_slots(&self) -> Vec<String> {
        self.slots.read().keys().cloned().collect()
    }

    /// Whether the owning object handles `name`.
    pub fn has_event_slot(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    /// Add a plain handler for `name` to this instance only.
    ///
    /// Returns `false` if the same handler is already registered for `name`.
    pub fn add_event_slot(&self, name: &str, handler: Callback) -> Result<bool> {
        if name.is_empty() {
            return Err(Error::InvalidHandler(
                "slot registered without an event name".to_string(),
            ));
        }
        let mut slots = self.slots.write();
        let handlers = slots.entry(name.to_string()).or_default();
        let exists = handlers.iter().any(|h| match h {
            Handler::Plain(existing) => Arc::ptr_eq(existing, &handler),
            Handler::Bound(_) => false,
        });
        if exists {
            return Ok(false);
        }
        handlers.push(Handler::Plain(handler));
        Ok(true)
    }

    /// Register an observer.
    ///
    /// Returns `false` if it was already registered.
    pub fn add_observer(&self, observer: impl Into<ObserverRef>) -> bool {
        let observer = observer.into();
        let key = observer.key();
        let mut observers = self.observers.lock();
        if observers.iter().any(|o| o.key() == key) {
            return false;
        }
        tracing::trace!(
            target: "trellis_core::bus",
            source = %self.id,
            ?observer,
            "observer added"
        );
        observers.push(observer);
        true
    }

    /// Unregister an observer.
    ///
    /// Returns `false` if it was not registered.
    pub fn remove_observer(&self, observer: impl Into<ObserverRef>) -> bool {
        let key = observer.into().key();
        self.remove_key(key)
    }

    /// Unregister the participant with identity `id`.
    pub fn remove_observer_id(&self, id: ObjectId) -> bool {
        self.remove_key(ObserverKey::Object(id))
    }

    fn remove_key(&self, key: ObserverKey) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|o| o.key() != key);
        before != observers.len()
    }

    /// Whether the participant with identity `id` observes this object.
    pub fn is_observed_by(&self, id: ObjectId) -> bool {
        let key = ObserverKey::Object(id);
        self.observers.lock().iter().any(|o| o.key() == key)
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    /// Remove every observer.
    pub fn clear_observers(&self) {
        self.observers.lock().clear();
    }

    /// Build an event sourced at this object.
    pub fn event(&self, name: &str, data: Option<Payload>) -> Event {
        Event::new(name, self.id, self.class.type_name(), data)
    }

    /// Deliver `name` to every currently registered observer.
    #[tracing::instrument(skip(self, data), target = "trellis_core::bus", level = "trace")]
    pub fn trigger_event(&self, name: &str, data: Option<Payload>) -> Result<()> {
        let event = self.event(name, data);
        let snapshot = {
            let mut observers = self.observers.lock();
            observers.retain(ObserverRef::is_alive);
            observers.clone()
        };
        tracing::trace!(
            target: "trellis_core::bus",
            source = %self.id,
            observer_count = snapshot.len(),
            "delivering event"
        );
        for observer in &snapshot {
            observer.deliver(&event)?;
        }
        Ok(())
    }

    /// Trigger `name` carrying `value`.
    pub fn emit<T: Any + Send + Sync>(&self, name: &str, value: T) -> Result<()> {
        self.trigger_event(name, Some(Payload::new(value)))
    }

    /// Run `body` and trigger `name` around it.
    ///
    /// With [`Trigger::Before`] the event fires without data before the body
    /// runs. With [`Trigger::After`] it fires once the body has finished,
    /// carrying the returned value, or no data if the body failed. The body's
    /// error takes precedence over a handler error.
    pub fn triggers<R, F>(&self, name: &str, timing: Trigger, body: F) -> Result<R>
    where
        R: Clone + Send + Sync + 'static,
        F: FnOnce() -> Result<R>,
    {
        match timing {
            Trigger::Before => {
                self.trigger_event(name, None)?;
                body()
            }
            Trigger::After => match body() {
                Ok(value) => {
                    self.trigger_event(name, Some(Payload::new(value.clone())))?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(handler_err) = self.trigger_event(name, None) {
                        tracing::debug!(
                            target: "trellis_core::bus",
                            event = name,
                            error = %handler_err,
                            "handler failed after failing body"
                        );
                    }
                    Err(err)
                }
            },
        }
    }

    /// Run the handlers for `event` against `receiver`, the owner of this bus.
    fn dispatch(&self, receiver: &dyn Any, event: &Event) -> Result<()> {
        let handlers = match self.slots.read().get(event.name()) {
            Some(handlers) => handlers.clone(),
            None => return Ok(()),
        };

        for handler in &handlers {
            let result = match handler {
                Handler::Bound(slot) => (slot.call())(receiver, event),
                Handler::Plain(f) => f(event),
            };
            match result {
                Ok(()) => {}
                Err(Error::PayloadMismatch { event: name, expected }) => {
                    tracing::debug!(
                        target: "trellis_core::bus",
                        event = %name,
                        expected,
                        receiver = %self.id,
                        "skipping handler: payload mismatch"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("id", &self.id)
            .field("type_name", &self.class.type_name())
            .field("observers", &self.observers.lock().len())
            .finish()
    }
}

static_assertions::assert_impl_all!(EventBus: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::EventClassBuilder;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    struct Pinger {
        bus: EventBus,
        hits: AtomicUsize,
    }

    impl Pinger {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                bus: EventBus::new::<Self>(),
                hits: AtomicUsize::new(0),
            })
        }
    }

    impl DeclareEvents for Pinger {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            class.hook("ping").slot("ping", "on_ping", |pinger, _| {
                pinger.hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    }

    impl EventObject for Pinger {
        fn event_bus(&self) -> &EventBus {
            &self.bus
        }
    }

    #[test]
    fn add_observer_is_idempotent() {
        let a = Pinger::new();
        let b = Pinger::new();
        assert!(a.bus.add_observer(&b));
        assert!(!a.bus.add_observer(&b));
        assert_eq!(a.bus.observer_count(), 1);
        assert!(a.bus.is_observed_by(b.object_id()));
    }

    #[test]
    fn remove_observer_reports_presence() {
        let a = Pinger::new();
        let b = Pinger::new();
        assert!(!a.bus.remove_observer(&b));
        a.bus.add_observer(&b);
        assert!(a.bus.remove_observer(&b));
        assert_eq!(a.bus.observer_count(), 0);
    }

    #[test]
    fn delivers_once_per_observer() {
        let a = Pinger::new();
        let b = Pinger::new();
        let c = Pinger::new();
        a.bus.add_observer(&b);
        a.bus.add_observer(&c);
        a.bus.add_observer(&b);
        a.bus.remove_observer(&c);

        a.trigger_event("ping", None).unwrap();
        assert_eq!(b.hits.load(Ordering::SeqCst), 1);
        assert_eq!(c.hits.load(Ordering::SeqCst), 0);
        assert_eq!(a.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn self_observation_does_not_recurse() {
        let a = Pinger::new();
        a.bus.add_observer(&a);
        a.trigger_event("ping", None).unwrap();
        assert_eq!(a.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropped_observers_are_pruned() {
        let a = Pinger::new();
        let b = Pinger::new();
        a.bus.add_observer(&b);
        drop(b);
        a.trigger_event("ping", None).unwrap();
        assert_eq!(a.bus.observer_count(), 0);
    }

    #[test]
    fn dead_weak_is_invalid_handler() {
        let b = Pinger::new();
        let weak: Weak<dyn EventObject> = Arc::downgrade(&b) as Weak<dyn EventObject>;
        drop(b);
        assert!(matches!(
            ObserverRef::from_weak(weak),
            Err(Error::InvalidHandler(_))
        ));
    }

    #[test]
    fn callbacks_are_identified_by_allocation() {
        let a = Pinger::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let observer = ObserverRef::callback(move |event| {
            assert_eq!(event.name(), "ping");
            seen_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert!(a.bus.add_observer(observer.clone()));
        assert!(!a.bus.add_observer(observer.clone()));
        a.trigger_event("ping", None).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(a.bus.remove_observer(observer));
    }

    #[test]
    fn observers_added_during_delivery_wait_for_next_trigger() {
        let a = Pinger::new();
        let late = Pinger::new();
        let a_weak = Arc::downgrade(&a);
        let late_clone = late.clone();
        a.bus.add_observer(ObserverRef::callback(move |_| {
            if let Some(a) = a_weak.upgrade() {
                a.bus.add_observer(&late_clone);
            }
            Ok(())
        }));

        a.trigger_event("ping", None).unwrap();
        assert_eq!(late.hits.load(Ordering::SeqCst), 0);
        a.trigger_event("ping", None).unwrap();
        assert_eq!(late.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn instance_slots_do_not_leak_into_class() {
        let a = Pinger::new();
        let b = Pinger::new();
        let total = Arc::new(AtomicI32::new(0));
        let total_clone = total.clone();
        let handler: Callback = Arc::new(move |event: &Event| {
            let step = event.payload::<i32>()?.copied().unwrap_or(0);
            total_clone.fetch_add(step, Ordering::SeqCst);
            Ok(())
        });
        assert!(a.bus.add_event_slot("bump", handler.clone()).unwrap());
        assert!(!a.bus.add_event_slot("bump", handler).unwrap());

        assert!(a.bus.has_event_slot("bump"));
        assert!(!b.bus.has_event_slot("bump"));
        assert!(!EventClass::of::<Pinger>().has_slot("bump"));

        a.bus.add_observer(&a);
        a.bus.emit("bump", 5_i32).unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn empty_slot_name_is_rejected() {
        let a = Pinger::new();
        let handler: Callback = Arc::new(|_: &Event| Ok(()));
        assert!(matches!(
            a.bus.add_event_slot("", handler),
            Err(Error::InvalidHandler(_))
        ));
    }

    #[test]
    fn payload_mismatch_is_swallowed_other_errors_propagate() {
        let a = Pinger::new();
        let handler: Callback = Arc::new(|event: &Event| {
            event.require_payload::<String>()?;
            Ok(())
        });
        a.bus.add_event_slot("ping", handler).unwrap();
        a.bus.add_observer(&a);

        a.bus.emit("ping", 1_i32).unwrap();
        assert_eq!(a.hits.load(Ordering::SeqCst), 1);

        let failing: Callback = Arc::new(|_: &Event| Err(Error::handler("boom")));
        a.bus.add_event_slot("ping", failing).unwrap();
        let err = a.trigger_event("ping", None).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn triggers_after_carries_result() {
        let a = Pinger::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        a.bus.add_observer(ObserverRef::callback(move |event| {
            seen_clone
                .lock()
                .push((event.name().to_string(), event.payload::<i32>()?.copied()));
            Ok(())
        }));

        let value = a.bus.triggers("done", Trigger::After, || Ok(7_i32)).unwrap();
        assert_eq!(value, 7);
        let value = a.bus.triggers("start", Trigger::Before, || Ok(4_i32)).unwrap();
        assert_eq!(value, 4);
        let failed: Result<i32> = a
            .bus
            .triggers("done", Trigger::After, || Err(Error::handler("nope")));
        assert!(failed.is_err());

        assert_eq!(
            *seen.lock(),
            vec![
                ("done".to_string(), Some(7)),
                ("start".to_string(), None),
                ("done".to_string(), None),
            ]
        );
    }
}
