//! Event values delivered over the event bus.
//!
//! An [`Event`] is a named notification raised by one object (its source) and
//! delivered synchronously to every observer of that object. Events may carry
//! an optional, type-erased [`Payload`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

/// A unique identifier for an event bus participant.
///
/// Identity is what makes observer registration idempotent: an object is
/// registered at most once per bus, however many handles to it exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Get the raw u64 value of this object ID.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Global counter for generating unique object IDs.
static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_object_id() -> ObjectId {
    ObjectId(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
}

/// A type-erased, cheaply clonable event payload.
#[derive(Clone)]
pub struct Payload {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Payload {
    /// Wrap a value as a payload.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Borrow the payload as `T`, if it is one.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Whether the payload holds a `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// The type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Payload").field(&self.type_name).finish()
    }
}

/// When a [`triggers`](crate::EventBus::triggers)-wrapped body fires its event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Trigger {
    /// Fire before the body runs, without data.
    Before,
    /// Fire after the body, carrying its return value (also on failure).
    #[default]
    After,
}

/// A named notification raised by an event bus participant.
#[derive(Clone)]
pub struct Event {
    name: Arc<str>,
    source: ObjectId,
    source_type: &'static str,
    data: Option<Payload>,
}

impl Event {
    pub(crate) fn new(
        name: &str,
        source: ObjectId,
        source_type: &'static str,
        data: Option<Payload>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            source,
            source_type,
            data,
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object that triggered the event.
    pub fn source(&self) -> ObjectId {
        self.source
    }

    /// Type name of the object that triggered the event.
    pub fn source_type(&self) -> &'static str {
        self.source_type
    }

    /// The raw payload, if any.
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// The payload as `T`.
    ///
    /// Returns `Ok(None)` for an event without data and
    /// [`Error::PayloadMismatch`] when data of another type is attached.
    pub fn payload<T: Any>(&self) -> Result<Option<&T>> {
        match &self.data {
            None => Ok(None),
            Some(data) => data
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| self.mismatch::<T>()),
        }
    }

    /// The payload as `T`, treating a missing payload as a mismatch.
    pub fn require_payload<T: Any>(&self) -> Result<&T> {
        self.payload::<T>()?.ok_or_else(|| self.mismatch::<T>())
    }

    fn mismatch<T>(&self) -> Error {
        Error::PayloadMismatch {
            event: self.name.to_string(),
            expected: std::any::type_name::<T>(),
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("source_type", &self.source_type)
            .field("data", &self.data)
            .finish()
    }
}
