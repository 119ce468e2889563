//! Error types for Trellis.

use std::fmt;

/// A specialized Result type for Trellis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The named registries an object can hold.
///
/// Used to make registration errors say *what* kind of entry was duplicated
/// or missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryKind {
    /// Controllers registered with an application or a view set controller.
    Controller,
    /// Views registered with a view set.
    View,
    /// Variables registered with a view.
    Variable,
    /// Widgets registered with a view.
    Widget,
    /// Event hooks declared by an event class.
    Hook,
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Controller => "controller",
            Self::View => "view",
            Self::Variable => "variable",
            Self::Widget => "widget",
            Self::Hook => "hook",
        };
        f.write_str(name)
    }
}

/// The main error type for Trellis operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An observer or slot handler that cannot receive events.
    ///
    /// Raised when registering a reference to an object that has already been
    /// dropped, or a slot under an empty event name.
    #[error("invalid handler: {0}")]
    InvalidHandler(String),

    /// A name is already present in a registry.
    #[error("{kind} '{name}' is already registered")]
    DuplicateRegistration { kind: RegistryKind, name: String },

    /// A name is absent from a registry.
    #[error("no {kind} registered under '{name}'")]
    UnknownRegistration { kind: RegistryKind, name: String },

    /// A model, view or variable of the wrong type was offered to a typed slot.
    #[error("invalid {slot}: expected {expected}, found {found}")]
    InvalidCapability {
        slot: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// An abstract lifecycle hook was left unimplemented.
    #[error("{type_name} does not implement `{hook}`")]
    NotImplemented {
        hook: &'static str,
        type_name: &'static str,
    },

    /// An event carried a payload of a different type than the slot expects.
    ///
    /// Event dispatch swallows this error; it is the only one it swallows.
    #[error("event '{event}' carries no payload of type {expected}")]
    PayloadMismatch { event: String, expected: &'static str },

    /// Cooperative interruption of a repeated task.
    ///
    /// A poller whose tick returns this stops polling without failing.
    #[error("interrupted")]
    Interrupted,

    /// The object is no longer attached to a living application.
    #[error("{type_name} is not attached to an application")]
    Detached { type_name: &'static str },

    /// The host event loop has already exited.
    #[error("the event loop has already exited")]
    EventLoopExited,

    /// A background job was cancelled before it produced a result.
    #[error("the background job was cancelled")]
    Cancelled,

    /// An application-defined error raised by a handler or hook.
    #[error(transparent)]
    Handler(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Error for an abstract hook `hook` left unimplemented on `T`.
    pub fn not_implemented<T: ?Sized>(hook: &'static str) -> Self {
        Self::NotImplemented {
            hook,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Wrap an application error.
    pub fn handler(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Handler(err.into())
    }

    pub(crate) fn duplicate(kind: RegistryKind, name: impl Into<String>) -> Self {
        Self::DuplicateRegistration {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn unknown(kind: RegistryKind, name: impl Into<String>) -> Self {
        Self::UnknownRegistration {
            kind,
            name: name.into(),
        }
    }

    /// Whether this error is a cooperative interruption.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
