//! Lifecycle state machines for controllers and views.
//!
//! Both progress from `Initialized` through `Configured` into an active state
//! and end in a terminal state no transition leaves:
//!
//! ```text
//! controller: Initialized -> Configured -> Started -> Stopped
//! view:       Initialized -> Configured -> Showing <-> Hidden -> Closed
//! ```
//!
//! `Stopped` and `Closed` may be entered from any state. The state is only
//! changed through [`Lifecycle::transition`], which rejects moves the table
//! does not allow and logs the ones it performs.

use std::fmt;

use parking_lot::Mutex;

/// A lifecycle state enumeration.
pub trait LifecycleState: Copy + Eq + fmt::Debug + Send + 'static {
    /// The state every object starts in.
    const INITIAL: Self;

    /// Whether no transition may leave this state.
    fn is_terminal(self) -> bool;

    /// Whether `self -> next` is a legal transition.
    fn can_transition(self, next: Self) -> bool;
}

/// Lifecycle of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerState {
    /// Constructed, not yet prepared.
    Initialized,
    /// Prepared; ready to start.
    Configured,
    /// Running.
    Started,
    /// Stopped. Terminal.
    Stopped,
}

impl LifecycleState for ControllerState {
    const INITIAL: Self = Self::Initialized;

    fn is_terminal(self) -> bool {
        self == Self::Stopped
    }

    fn can_transition(self, next: Self) -> bool {
        use ControllerState::*;
        matches!(
            (self, next),
            (Initialized, Configured)
                | (Configured, Started)
                | (Initialized | Configured | Started, Stopped)
        )
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewState {
    /// Constructed, not yet prepared.
    Initialized,
    /// Widgets built; not yet shown.
    Configured,
    /// Visible.
    Showing,
    /// Hidden; may be shown again.
    Hidden,
    /// Closed. Terminal.
    Closed,
}

impl LifecycleState for ViewState {
    const INITIAL: Self = Self::Initialized;

    fn is_terminal(self) -> bool {
        self == Self::Closed
    }

    fn can_transition(self, next: Self) -> bool {
        use ViewState::*;
        matches!(
            (self, next),
            (Initialized, Configured)
                | (Configured | Hidden, Showing)
                | (Configured | Showing, Hidden)
                | (Initialized | Configured | Showing | Hidden, Closed)
        )
    }
}

impl fmt::Display for ViewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::Configured => "configured",
            Self::Showing => "showing",
            Self::Hidden => "hidden",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The current state of one controller or view.
pub struct Lifecycle<S: LifecycleState> {
    state: Mutex<S>,
}

impl<S: LifecycleState> Lifecycle<S> {
    /// A lifecycle in the initial state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(S::INITIAL),
        }
    }

    /// The current state.
    pub fn state(&self) -> S {
        *self.state.lock()
    }

    /// Whether the current state is `state`.
    pub fn is(&self, state: S) -> bool {
        self.state() == state
    }

    /// Whether the terminal state has been reached.
    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Move to `next` if the transition table allows it.
    ///
    /// Returns the previous state on success and `None` when the move is
    /// not allowed, including re-entering the current state.
    pub(crate) fn transition(&self, next: S, owner: &'static str) -> Option<S> {
        let mut state = self.state.lock();
        let previous = *state;
        if !previous.can_transition(next) {
            tracing::trace!(
                target: "trellis_core::lifecycle",
                owner,
                from = ?previous,
                to = ?next,
                "transition ignored"
            );
            return None;
        }
        *state = next;
        drop(state);
        tracing::debug!(
            target: "trellis_core::lifecycle",
            owner,
            from = ?previous,
            to = ?next,
            "state changed"
        );
        Some(previous)
    }
}

impl<S: LifecycleState> Default for Lifecycle<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: LifecycleState> fmt::Debug for Lifecycle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Lifecycle").field(&self.state()).finish()
    }
}

static_assertions::assert_impl_all!(Lifecycle<ControllerState>: Send, Sync);
static_assertions::assert_impl_all!(Lifecycle<ViewState>: Send, Sync);
