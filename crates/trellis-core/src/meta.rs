//! Per-type event metadata: which events a type emits and which it consumes.
//!
//! Every type that takes part in event delivery describes itself once through
//! [`DeclareEvents`]. The description is turned into an immutable
//! [`EventClass`] the first time it is needed and cached by [`TypeId`], so all
//! instances of a type share one table and sibling types never share state.
//!
//! # Hooks and slots
//!
//! - A **hook** is an event name the type can emit.
//! - A **slot** is a handler run when an observed object emits a named event.
//!
//! Composition stands in for inheritance: a type that embeds another
//! participant calls [`EventClassBuilder::inherit`] with a projection to the
//! embedded value. Inherited hooks are unioned in. Inherited slots are merged
//! per event name; a slot declared under the *same method name* for the same
//! event overrides the inherited one, a slot under a different method name is
//! an additional handler.
//!
//! # Example
//!
//! ```
//! use trellis_core::{DeclareEvents, EventClass, EventClassBuilder};
//!
//! struct Counter;
//!
//! impl DeclareEvents for Counter {
//!     fn declare_events(class: &mut EventClassBuilder<Self>) {
//!         class
//!             .hook("changed")
//!             .slot("reset", "on_reset", |_counter, _event| Ok(()));
//!     }
//! }
//!
//! let class = EventClass::of::<Counter>();
//! assert!(class.has_hook("changed"));
//! assert_eq!(class.slot_methods("reset"), vec!["on_reset"]);
//! ```

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::event::Event;

/// A type-erased slot handler, invoked with the receiving object.
pub(crate) type SlotFn = Arc<dyn Fn(&dyn Any, &Event) -> Result<()> + Send + Sync>;

/// Types that declare event hooks and slots.
pub trait DeclareEvents: Any + Send + Sync + Sized {
    /// Describe the hooks and slots of this type.
    ///
    /// Called once per type; the result is cached.
    fn declare_events(class: &mut EventClassBuilder<Self>);
}

/// A slot declared by an event class.
#[derive(Clone)]
pub struct SlotMeta {
    method: &'static str,
    declared_by: &'static str,
    call: SlotFn,
}

impl SlotMeta {
    /// The method name the slot was declared under.
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The type that declared the slot.
    pub fn declared_by(&self) -> &'static str {
        self.declared_by
    }

    pub(crate) fn call(&self) -> &SlotFn {
        &self.call
    }
}

impl fmt::Debug for SlotMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotMeta")
            .field("method", &self.method)
            .field("declared_by", &self.declared_by)
            .finish_non_exhaustive()
    }
}

/// The immutable hook and slot table of one type.
pub struct EventClass {
    type_id: TypeId,
    type_name: &'static str,
    hooks: BTreeSet<String>,
    slots: BTreeMap<String, Vec<SlotMeta>>,
}

impl EventClass {
    /// Get (building on first use) the event class of `T`.
    pub fn of<T: DeclareEvents>() -> Arc<EventClass> {
        let id = TypeId::of::<T>();
        if let Some(class) = class_registry().read().get(&id) {
            return class.clone();
        }

        // Build outside the lock: declarations may look up their bases.
        let mut builder = EventClassBuilder::<T>::new();
        T::declare_events(&mut builder);
        let class = Arc::new(builder.finish());
        tracing::trace!(
            target: "trellis_core::meta",
            type_name = class.type_name,
            hooks = class.hooks.len(),
            slots = class.slots.len(),
            "registered event class"
        );

        class_registry().write().entry(id).or_insert(class).clone()
    }

    /// The type this class describes.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The name of the type this class describes.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Event names this type can emit.
    pub fn hooks(&self) -> impl Iterator<Item = &str> {
        self.hooks.iter().map(String::as_str)
    }

    /// Whether this type can emit `name`.
    pub fn has_hook(&self, name: &str) -> bool {
        self.hooks.contains(name)
    }

    /// Event names this type has handlers for.
    pub fn slot_names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    /// Whether this type handles `name`.
    pub fn has_slot(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Method names of the handlers for `name`.
    pub fn slot_methods(&self, name: &str) -> Vec<&'static str> {
        self.slots
            .get(name)
            .map(|slots| slots.iter().map(SlotMeta::method).collect())
            .unwrap_or_default()
    }

    /// The declared slots for `name`.
    pub fn slots(&self, name: &str) -> &[SlotMeta] {
        self.slots.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn slot_table(&self) -> &BTreeMap<String, Vec<SlotMeta>> {
        &self.slots
    }

    pub(crate) fn hook_set(&self) -> &BTreeSet<String> {
        &self.hooks
    }
}

impl fmt::Debug for EventClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventClass")
            .field("type_name", &self.type_name)
            .field("hooks", &self.hooks)
            .field("slots", &self.slots)
            .finish()
    }
}

/// Collects the hooks and slots of `T` during [`DeclareEvents::declare_events`].
pub struct EventClassBuilder<T> {
    hooks: BTreeSet<String>,
    slots: BTreeMap<String, Vec<SlotMeta>>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: DeclareEvents> EventClassBuilder<T> {
    fn new() -> Self {
        Self {
            hooks: BTreeSet::new(),
            slots: BTreeMap::new(),
            _marker: PhantomData,
        }
    }

    /// Declare that `T` emits `name`.
    pub fn hook(&mut self, name: &str) -> &mut Self {
        self.hooks.insert(name.to_string());
        self
    }

    /// Declare `handler` as the slot `method` for event `event`.
    ///
    /// A slot already present under the same method name for the same event
    /// is replaced.
    pub fn slot<F>(&mut self, event: &str, method: &'static str, handler: F) -> &mut Self
    where
        F: Fn(&T, &Event) -> Result<()> + Send + Sync + 'static,
    {
        let call: SlotFn = Arc::new(move |receiver: &dyn Any, event: &Event| {
            match receiver.downcast_ref::<T>() {
                Some(receiver) => handler(receiver, event),
                None => Err(Error::InvalidHandler(format!(
                    "slot of {} invoked on another type",
                    std::any::type_name::<T>()
                ))),
            }
        });
        let meta = SlotMeta {
            method,
            declared_by: std::any::type_name::<T>(),
            call,
        };

        let slots = self.slots.entry(event.to_string()).or_default();
        match slots.iter_mut().find(|s| s.method == method) {
            Some(existing) => *existing = meta,
            None => slots.push(meta),
        }
        self
    }

    /// Merge the hooks and slots of the embedded participant `B`.
    ///
    /// `project` reaches the embedded `B` inside `T`. Slots `T` already
    /// declares under the same method name are kept.
    pub fn inherit<B: DeclareEvents>(&mut self, project: fn(&T) -> &B) -> &mut Self {
        let base = EventClass::of::<B>();
        self.hooks.extend(base.hook_set().iter().cloned());

        for (event, base_slots) in base.slot_table() {
            let slots = self.slots.entry(event.clone()).or_default();
            for base_slot in base_slots {
                if slots.iter().any(|s| s.method == base_slot.method) {
                    continue;
                }
                let base_call = base_slot.call.clone();
                let call: SlotFn = Arc::new(move |receiver: &dyn Any, event: &Event| {
                    match receiver.downcast_ref::<T>() {
                        Some(receiver) => base_call(project(receiver), event),
                        None => Err(Error::InvalidHandler(format!(
                            "slot of {} invoked on another type",
                            std::any::type_name::<T>()
                        ))),
                    }
                });
                slots.push(SlotMeta {
                    method: base_slot.method,
                    declared_by: base_slot.declared_by,
                    call,
                });
            }
        }
        self
    }

    fn finish(self) -> EventClass {
        EventClass {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            hooks: self.hooks,
            slots: self.slots,
        }
    }
}

/// Global cache of event classes keyed by type.
fn class_registry() -> &'static RwLock<HashMap<TypeId, Arc<EventClass>>> {
    static CLASSES: OnceLock<RwLock<HashMap<TypeId, Arc<EventClass>>>> = OnceLock::new();
    CLASSES.get_or_init(|| RwLock::new(HashMap::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::next_object_id;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct Plain;

    impl DeclareEvents for Plain {
        fn declare_events(_class: &mut EventClassBuilder<Self>) {}
    }

    struct Base {
        count: AtomicI32,
    }

    impl DeclareEvents for Base {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            class
                .hook("update")
                .hook("update_before")
                .slot("update", "update_slot", |base, event| {
                    let step = event.payload::<i32>()?.copied().unwrap_or(0);
                    base.count.fetch_sub(step, Ordering::SeqCst);
                    Ok(())
                })
                .slot("update_before", "update_before_slot", |base, _| {
                    base.count.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
        }
    }

    struct Derived {
        base: Base,
    }

    impl DeclareEvents for Derived {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            class
                .inherit::<Base>(|d| &d.base)
                .slot("update", "update_slot", |d, event| {
                    let step = event.payload::<i32>()?.copied().unwrap_or(0);
                    d.base.count.fetch_add(step, Ordering::SeqCst);
                    Ok(())
                })
                .slot("extra", "extra_slot", |_, _| Ok(()));
        }
    }

    struct Sibling {
        base: Base,
    }

    impl DeclareEvents for Sibling {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            class
                .inherit::<Base>(|s| &s.base)
                .slot("update", "audit_slot", |_, _| Ok(()));
        }
    }

    fn fire(class: &EventClass, receiver: &dyn Any, name: &str, step: i32) {
        let event = Event::new(name, next_object_id(), "test", Some(crate::Payload::new(step)));
        for slot in class.slots(name) {
            (slot.call())(receiver, &event).unwrap();
        }
    }

    #[test]
    fn empty_class_has_nothing() {
        let class = EventClass::of::<Plain>();
        assert_eq!(class.hooks().count(), 0);
        assert_eq!(class.slot_names().count(), 0);
    }

    #[test]
    fn hooks_are_unioned_with_bases() {
        let base = EventClass::of::<Base>();
        let derived = EventClass::of::<Derived>();
        for hook in base.hooks() {
            assert!(derived.has_hook(hook));
        }
        assert_eq!(derived.hooks().collect::<Vec<_>>(), vec!["update", "update_before"]);
    }

    #[test]
    fn same_method_name_overrides() {
        let derived = EventClass::of::<Derived>();
        assert_eq!(derived.slot_methods("update"), vec!["update_slot"]);
        assert!(derived.slots("update")[0].declared_by().ends_with("Derived"));
        assert_eq!(
            derived.slot_names().collect::<Vec<_>>(),
            vec!["extra", "update", "update_before"]
        );

        let d = Derived {
            base: Base {
                count: AtomicI32::new(0),
            },
        };
        fire(&derived, &d, "update", 1);
        assert_eq!(d.base.count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn other_method_name_adds() {
        let sibling = EventClass::of::<Sibling>();
        assert_eq!(sibling.slot_methods("update"), vec!["update_slot", "audit_slot"]);

        let s = Sibling {
            base: Base {
                count: AtomicI32::new(0),
            },
        };
        fire(&sibling, &s, "update", 2);
        assert_eq!(s.base.count.load(Ordering::SeqCst), -2);
    }

    #[test]
    fn sibling_classes_are_independent() {
        let base = EventClass::of::<Base>();
        let _ = EventClass::of::<Derived>();
        let _ = EventClass::of::<Sibling>();
        assert_eq!(base.slot_methods("update"), vec!["update_slot"]);
        assert!(!base.has_slot("extra"));
        assert!(!EventClass::of::<Sibling>().has_slot("extra"));
    }

    #[test]
    fn classes_are_cached() {
        assert!(Arc::ptr_eq(&EventClass::of::<Base>(), &EventClass::of::<Base>()));
    }
}
