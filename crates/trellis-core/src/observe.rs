//! A single-purpose change notification channel.
//!
//! [`Observable`] is simpler than the [`EventBus`](crate::EventBus): there are
//! no event names and no payloads. An observable tells each registered
//! [`Observer`] that it changed by calling [`Observer::update`] with itself.
//! Models use it to tell their controllers to refresh.
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use trellis_core::{Observable, Observer, Result};
//!
//! struct Thermometer {
//!     changed: Observable<Thermometer>,
//! }
//!
//! struct Display {
//!     refreshes: AtomicUsize,
//! }
//!
//! impl Observer<Thermometer> for Display {
//!     fn update(&self, _subject: &Thermometer) -> Result<()> {
//!         self.refreshes.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     }
//! }
//!
//! let thermometer = Thermometer { changed: Observable::new() };
//! let display = Arc::new(Display { refreshes: AtomicUsize::new(0) });
//! thermometer.changed.register_observer(&display);
//! thermometer.changed.notify_observers(&thermometer).unwrap();
//! assert_eq!(display.refreshes.load(Ordering::SeqCst), 1);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;

/// Receives change notifications from an [`Observable`] over `S`.
pub trait Observer<S: ?Sized>: Send + Sync {
    /// `subject` changed.
    fn update(&self, subject: &S) -> Result<()>;
}

/// The observer list of a subject of type `S`.
///
/// Observers are held without ownership and notified in registration order.
pub struct Observable<S: ?Sized + 'static> {
    observers: Mutex<Vec<Weak<dyn Observer<S>>>>,
}

impl<S: ?Sized + 'static> Observable<S> {
    /// Create an observable with no observers.
    pub fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Register `observer`.
    ///
    /// Returns `false` if it is already registered.
    pub fn register_observer<O: Observer<S> + 'static>(&self, observer: &Arc<O>) -> bool {
        let weak: Weak<dyn Observer<S>> = Arc::downgrade(observer) as Weak<dyn Observer<S>>;
        let mut observers = self.observers.lock();
        if observers.iter().any(|o| Weak::ptr_eq(o, &weak)) {
            return false;
        }
        observers.push(weak);
        true
    }

    /// Unregister `observer`.
    ///
    /// Returns `false` if it was not registered.
    pub fn unregister_observer<O: Observer<S> + 'static>(&self, observer: &Arc<O>) -> bool {
        let weak: Weak<dyn Observer<S>> = Arc::downgrade(observer) as Weak<dyn Observer<S>>;
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|o| !Weak::ptr_eq(o, &weak));
        before != observers.len()
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .iter()
            .filter(|o| o.strong_count() > 0)
            .count()
    }

    /// Call [`Observer::update`] on every observer, in registration order.
    ///
    /// The first failing observer stops the pass and its error is returned.
    pub fn notify_observers(&self, subject: &S) -> Result<()> {
        let snapshot: Vec<_> = {
            let mut observers = self.observers.lock();
            observers.retain(|o| o.strong_count() > 0);
            observers.clone()
        };
        for observer in snapshot.iter().filter_map(Weak::upgrade) {
            observer.update(subject)?;
        }
        Ok(())
    }

    /// Run `body`, then notify observers if it succeeded.
    pub fn observed<R>(&self, subject: &S, body: impl FnOnce() -> Result<R>) -> Result<R> {
        let result = body()?;
        self.notify_observers(subject)?;
        Ok(result)
    }
}

impl<S: ?Sized + 'static> Default for Observable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ?Sized + 'static> fmt::Debug for Observable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Subject {
        value: i32,
    }

    struct Recorder {
        seen: Mutex<Vec<(&'static str, i32)>>,
        tag: &'static str,
        fail: bool,
    }

    impl Observer<Subject> for Recorder {
        fn update(&self, subject: &Subject) -> Result<()> {
            self.seen.lock().push((self.tag, subject.value));
            if self.fail {
                return Err(Error::handler("observer failed"));
            }
            Ok(())
        }
    }

    fn recorder(tag: &'static str, fail: bool) -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
            tag,
            fail,
        })
    }

    #[test]
    fn registers_at_most_once() {
        let subject = Subject { value: 1 };
        let channel = Observable::<Subject>::new();
        let a = recorder("a", false);
        assert!(channel.register_observer(&a));
        assert!(!channel.register_observer(&a));
        channel.notify_observers(&subject).unwrap();
        assert_eq!(*a.seen.lock(), vec![("a", 1)]);
    }

    #[test]
    fn failing_observer_aborts_the_pass() {
        let subject = Subject { value: 7 };
        let channel = Observable::<Subject>::new();
        let first = recorder("first", true);
        let second = recorder("second", false);
        channel.register_observer(&first);
        channel.register_observer(&second);

        assert!(channel.notify_observers(&subject).is_err());
        assert_eq!(first.seen.lock().len(), 1);
        assert!(second.seen.lock().is_empty());
    }

    #[test]
    fn unregister_and_drop() {
        let subject = Subject { value: 2 };
        let channel = Observable::<Subject>::new();
        let a = recorder("a", false);
        let b = recorder("b", false);
        channel.register_observer(&a);
        channel.register_observer(&b);
        assert!(channel.unregister_observer(&a));
        assert!(!channel.unregister_observer(&a));
        drop(b);
        assert_eq!(channel.observer_count(), 0);
        channel.notify_observers(&subject).unwrap();
        assert!(a.seen.lock().is_empty());
    }

    #[test]
    fn observed_notifies_after_success_only() {
        let subject = Subject { value: 3 };
        let channel = Observable::<Subject>::new();
        let a = recorder("a", false);
        channel.register_observer(&a);

        let value = channel.observed(&subject, || Ok(10)).unwrap();
        assert_eq!(value, 10);
        let failed: Result<()> = channel.observed(&subject, || Err(Error::Interrupted));
        assert!(failed.is_err());
        assert_eq!(a.seen.lock().len(), 1);
    }
}
