//! Models: thread-safe data owned by a controller.
//!
//! A model embeds a [`ModelBase`] holding its event bus, its data behind a
//! re-entrant lock and an [`Observable`] channel. Readers take snapshots; the
//! model's own mutation methods are the only writers and end by notifying,
//! either through the model's event bus or through
//! [`ModelBase::observed`], which tells every registered [`Observer`] that
//! the model changed.
//!
//! [`ModelExt::update`] asks the model to refresh itself and triggers
//! `model_update` once the refresh has run.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bus::{EventBus, EventObject};
use crate::error::{Error, Result};
use crate::event::Trigger;
use crate::meta::{DeclareEvents, EventClassBuilder};
use crate::observe::{Observable, Observer};
use crate::thread_safe::Guarded;

/// Event triggered after [`ModelExt::update`].
pub const MODEL_UPDATE: &str = "model_update";

/// Shared state of every model.
///
/// `S` is the subject observers receive, normally the model type itself.
pub struct ModelBase<T, S: ?Sized + 'static = dyn Model> {
    bus: EventBus,
    data: Guarded<T>,
    changes: Observable<S>,
}

impl<T: Send, S: ?Sized + 'static> ModelBase<T, S> {
    /// State for an instance of model type `M` holding `data`.
    pub fn new<M: DeclareEvents>(data: T) -> Self {
        Self {
            bus: EventBus::new::<M>(),
            data: Guarded::new(data),
            changes: Observable::new(),
        }
    }

    /// Declare the hooks every model has.
    pub fn declare<M: DeclareEvents>(class: &mut EventClassBuilder<M>) {
        class.hook(MODEL_UPDATE);
    }

    /// The model's change channel.
    pub fn changes(&self) -> &Observable<S> {
        &self.changes
    }

    /// Register `observer` to hear every change. Returns `false` if it is
    /// already registered.
    pub fn register_observer<O: Observer<S> + 'static>(&self, observer: &Arc<O>) -> bool {
        self.changes.register_observer(observer)
    }

    /// Stop telling `observer` about changes.
    pub fn unregister_observer<O: Observer<S> + 'static>(&self, observer: &Arc<O>) -> bool {
        self.changes.unregister_observer(observer)
    }

    /// Mutate the data with `body`, then notify observers with `subject`.
    ///
    /// The model lock is held throughout, so other threads see the change and
    /// its notification as one step. Observers run after the data borrow is
    /// released and may read the model. Nothing is notified if `body` fails.
    pub fn observed<R>(&self, subject: &S, body: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        self.data.locked(|| {
            let result = self.data.with(body)?;
            self.changes.notify_observers(subject)?;
            Ok(result)
        })
    }

    /// The model's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The guarded data.
    pub fn data(&self) -> &Guarded<T> {
        &self.data
    }

    /// Run `f` with the data borrowed under the model lock.
    ///
    /// # Panics
    ///
    /// Panics if `f` calls back into `with_data` (or anything else that
    /// borrows the data, such as [`snapshot`](Self::snapshot)) on the same
    /// model. Read what `f` needs before calling, or use
    /// [`data`](Self::data)`.locked` to hold the lock across several calls.
    pub fn with_data<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.data.with(f)
    }
}

impl<T: Clone + Send, S: ?Sized + 'static> ModelBase<T, S> {
    /// A snapshot of the data.
    pub fn snapshot(&self) -> T {
        self.data.get()
    }
}

impl<T: fmt::Debug, S: ?Sized + 'static> fmt::Debug for ModelBase<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBase")
            .field("bus", &self.bus)
            .field("data", &self.data)
            .field("changes", &self.changes)
            .finish()
    }
}

/// A model.
pub trait Model: EventObject {
    /// Refresh the model's data.
    fn on_update(&self) -> Result<()> {
        Err(Error::not_implemented::<Self>("update"))
    }
}

/// Model operations available on every model.
pub trait ModelExt: Model {
    /// Refresh the model and trigger `model_update`.
    fn update(&self) -> Result<()> {
        self.event_bus()
            .triggers(MODEL_UPDATE, Trigger::After, || self.on_update())
    }
}

impl<M: Model + ?Sized> ModelExt for M {}

/// A type-checked handle to a model held by a controller.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn Model>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ModelHandle {
    /// Wrap `model`.
    pub fn new<M: Model>(model: Arc<M>) -> Self {
        Self {
            any: model.clone(),
            model,
            type_name: std::any::type_name::<M>(),
        }
    }

    /// The model.
    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    /// The model's concrete type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the model is an `M`.
    pub fn is<M: Model>(&self) -> bool {
        self.any.is::<M>()
    }

    /// The model as an `M`.
    ///
    /// Fails with [`Error::InvalidCapability`] if it is another type.
    pub fn downcast<M: Model>(&self) -> Result<Arc<M>> {
        self.any
            .clone()
            .downcast::<M>()
            .map_err(|_| Error::InvalidCapability {
                slot: "model",
                expected: std::any::type_name::<M>(),
                found: self.type_name,
            })
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelHandle").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::bus::ObserverRef;

    struct Counter {
        base: ModelBase<Vec<u32>, Counter>,
    }

    impl Counter {
        fn record(&self, value: u32) -> Result<usize> {
            self.base.observed(self, |data| {
                if value == 0 {
                    return Err(Error::handler("zero is not a reading"));
                }
                data.push(value);
                Ok(data.len())
            })
        }
    }

    struct Refresher {
        seen: parking_lot::Mutex<Vec<usize>>,
    }

    impl Observer<Counter> for Refresher {
        fn update(&self, subject: &Counter) -> Result<()> {
            self.seen.lock().push(subject.base.snapshot().len());
            Ok(())
        }
    }

    impl DeclareEvents for Counter {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ModelBase::<Vec<u32>>::declare(class);
        }
    }

    impl EventObject for Counter {
        fn event_bus(&self) -> &EventBus {
            self.base.bus()
        }
    }

    impl Model for Counter {
        fn on_update(&self) -> Result<()> {
            self.base.with_data(|data| {
                let next = data.len() as u32;
                data.push(next);
            });
            Ok(())
        }
    }

    struct Abstract {
        base: ModelBase<()>,
    }

    impl DeclareEvents for Abstract {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ModelBase::<()>::declare(class);
        }
    }

    impl EventObject for Abstract {
        fn event_bus(&self) -> &EventBus {
            self.base.bus()
        }
    }

    impl Model for Abstract {}

    #[test]
    fn update_triggers_model_update() {
        let model = Arc::new(Counter {
            base: ModelBase::new::<Counter>(Vec::new()),
        });
        let updates = Arc::new(AtomicUsize::new(0));
        let updates_clone = updates.clone();
        model.base.bus().add_observer(ObserverRef::callback(move |event| {
            assert_eq!(event.name(), MODEL_UPDATE);
            updates_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        model.update().unwrap();
        model.update().unwrap();
        assert_eq!(model.base.snapshot(), vec![0, 1]);
        assert_eq!(updates.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn observers_hear_each_successful_mutation() {
        let model = Counter {
            base: ModelBase::new::<Counter>(Vec::new()),
        };
        let refresher = Arc::new(Refresher {
            seen: parking_lot::Mutex::new(Vec::new()),
        });
        assert!(model.base.register_observer(&refresher));
        assert!(!model.base.register_observer(&refresher));

        assert_eq!(model.record(4).unwrap(), 1);
        assert_eq!(model.record(9).unwrap(), 2);
        assert!(model.record(0).is_err());
        assert_eq!(*refresher.seen.lock(), vec![1, 2]);

        assert!(model.base.unregister_observer(&refresher));
        model.record(1).unwrap();
        assert_eq!(refresher.seen.lock().len(), 2);
    }

    #[test]
    #[should_panic]
    fn nested_data_access_panics() {
        let model = Counter {
            base: ModelBase::new::<Counter>(vec![1]),
        };
        model.base.with_data(|_| model.base.snapshot());
    }

    #[test]
    fn unimplemented_update_still_triggers() {
        let model = Abstract {
            base: ModelBase::new::<Abstract>(()),
        };
        let updates = Arc::new(AtomicUsize::new(0));
        let updates_clone = updates.clone();
        model.base.bus().add_observer(ObserverRef::callback(move |_| {
            updates_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));

        let err = model.update().unwrap_err();
        assert!(matches!(err, Error::NotImplemented { hook: "update", .. }));
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_checks_capability() {
        let model = Arc::new(Counter {
            base: ModelBase::new::<Counter>(Vec::new()),
        });
        let handle = ModelHandle::new(model);
        assert!(handle.is::<Counter>());
        assert!(handle.downcast::<Counter>().is_ok());
        assert!(matches!(
            handle.downcast::<Abstract>(),
            Err(Error::InvalidCapability { slot: "model", .. })
        ));
    }
}
