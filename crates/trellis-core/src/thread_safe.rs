//! Re-entrant per-object locking.
//!
//! Objects that are touched from worker threads and from the host loop carry
//! a [`ThreadSafe`] lock. Methods wrap their bodies in
//! [`ThreadSafe::thread_safe`]; a method holding the lock may call another
//! locked method of the same object on the same thread without deadlocking.
//!
//! [`Guarded`] combines the lock with the data it protects.

use std::cell::{RefCell, RefMut};
use std::fmt;

use parking_lot::ReentrantMutex;

/// A re-entrant lock owned by one object.
#[derive(Default)]
pub struct ThreadSafe {
    lock: ReentrantMutex<()>,
}

impl ThreadSafe {
    /// Create an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock.
    pub fn thread_safe<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.lock.lock();
        f()
    }

    /// Whether some thread currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl fmt::Debug for ThreadSafe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadSafe")
            .field("locked", &self.lock.is_locked())
            .finish()
    }
}

/// Data behind a re-entrant lock.
///
/// [`with`](Self::with) may nest on one thread. The data itself is borrowed
/// mutably per call, so nested calls must not hold a borrow across the inner
/// call.
pub struct Guarded<T> {
    inner: ReentrantMutex<RefCell<T>>,
}

impl<T> Guarded<T> {
    /// Wrap `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with the data borrowed mutably under the lock.
    ///
    /// # Panics
    ///
    /// Panics if `f` re-enters `with` on the same value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let guard = self.inner.lock();
        let mut value: RefMut<'_, T> = guard.borrow_mut();
        f(&mut value)
    }

    /// Run `f` while holding the lock without borrowing the data.
    ///
    /// Lets a caller keep other objects' updates atomic with respect to this
    /// one while still calling back into it.
    pub fn locked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        f()
    }

    /// Replace the data, returning the old value.
    pub fn replace(&self, value: T) -> T {
        self.with(|current| std::mem::replace(current, value))
    }

    /// Consume the wrapper.
    pub fn into_inner(self) -> T {
        self.inner.into_inner().into_inner()
    }
}

impl<T: Clone> Guarded<T> {
    /// A copy of the data.
    pub fn get(&self) -> T {
        self.with(|value| value.clone())
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.inner.lock();
        match guard.try_borrow() {
            Ok(value) => f.debug_tuple("Guarded").field(&*value).finish(),
            Err(_) => f.write_str("Guarded(<borrowed>)"),
        }
    }
}

static_assertions::assert_impl_all!(ThreadSafe: Send, Sync);
static_assertions::assert_impl_all!(Guarded<Vec<u8>>: Send, Sync);
