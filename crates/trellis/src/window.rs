//! Top-level windows and modal windows.
//!
//! A [`Window`] is a plain top-level view. A modal window embeds a
//! [`ModalWindow`] base and implements [`Modal`]; [`ModalExt::show_modal`]
//! shows it and pumps the host loop until it closes, then hands back its
//! response.
//!
//! ```
//! use std::sync::Arc;
//! use trellis::prelude::*;
//! use trellis::window::{Modal, ModalExt, ModalWindow};
//!
//! struct Confirm {
//!     modal: ModalWindow<bool>,
//! }
//!
//! impl DeclareEvents for Confirm {
//!     fn declare_events(class: &mut EventClassBuilder<Self>) {
//!         ModalWindow::<bool>::declare(class);
//!     }
//! }
//!
//! impl EventObject for Confirm {
//!     fn event_bus(&self) -> &EventBus {
//!         self.modal.view_base().bus()
//!     }
//! }
//!
//! impl View for Confirm {
//!     fn view_base(&self) -> &ViewBase {
//!         self.modal.view_base()
//!     }
//!
//!     fn on_prepare(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! impl Modal for Confirm {
//!     type Response = bool;
//!
//!     fn modal_base(&self) -> &ModalWindow<bool> {
//!         &self.modal
//!     }
//! }
//!
//! let app = Application::new();
//! let confirm = Arc::new(Confirm {
//!     modal: ModalWindow::new::<Confirm>("Sure?"),
//! });
//! let pending = confirm.clone();
//! app.host().invoke(move || pending.respond(true).map(|_| ()));
//! assert_eq!(confirm.show_modal(app.host().as_ref()).unwrap(), Some(true));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::{
    Controller, ControllerBase, ControllerExt, DeclareEvents, Error, EventBus, EventClassBuilder,
    EventObject, Host, ParentRef, Result, View, ViewBase, ViewExt, ViewHandle,
};

const TARGET: &str = trellis_core::logging::targets::WINDOW;

/// Triggered by a modal window once it is showing, before the caller
/// starts waiting. Carries a [`ViewHandle`] to the window.
pub const MODAL_SHOWN: &str = "modal_shown";

type Content = Box<dyn Fn(&Window) -> Result<()> + Send + Sync>;

/// A top-level window.
pub struct Window {
    base: ViewBase,
    title: Mutex<String>,
    content: Option<Content>,
}

impl Window {
    /// An empty window. It cannot be prepared until it has content.
    pub fn new(title: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            base: ViewBase::new::<Self>(),
            title: Mutex::new(title.into()),
            content: None,
        })
    }

    /// A window whose widgets are built by `content` when it is prepared.
    pub fn with_content<F>(title: impl Into<String>, content: F) -> Arc<Self>
    where
        F: Fn(&Window) -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            base: ViewBase::new::<Self>(),
            title: Mutex::new(title.into()),
            content: Some(Box::new(content)),
        })
    }

    /// The window title.
    pub fn title(&self) -> String {
        self.title.lock().clone()
    }

    /// Change the window title.
    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.lock() = title.into();
    }
}

impl DeclareEvents for Window {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ViewBase::declare(class);
    }
}

impl EventObject for Window {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl View for Window {
    fn view_base(&self) -> &ViewBase {
        &self.base
    }

    fn on_prepare(&self) -> Result<()> {
        match &self.content {
            Some(content) => content(self),
            None => Err(Error::not_implemented::<Self>("prepare")),
        }
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("title", &self.title())
            .field("state", &self.base.state())
            .finish()
    }
}

/// A controller whose view is a window, shown when the controller starts.
pub struct WindowController {
    base: ControllerBase,
    pending: Mutex<Option<ViewHandle>>,
}

impl WindowController {
    /// Create and attach a controller for `window`.
    pub fn new<V: View>(parent: impl Into<ParentRef>, window: Arc<V>) -> Result<Arc<Self>> {
        Arc::new(Self {
            base: ControllerBase::new::<Self>(parent),
            pending: Mutex::new(Some(ViewHandle::new(window))),
        })
        .attach()
    }

    /// The window, once the controller has been prepared.
    pub fn window(&self) -> Option<ViewHandle> {
        self.base.view()
    }
}

impl DeclareEvents for WindowController {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ControllerBase::declare(class);
    }
}

impl EventObject for WindowController {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl Controller for WindowController {
    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn load_view(&self) -> Result<Option<ViewHandle>> {
        Ok(self.pending.lock().take())
    }

    fn on_start(&self) -> Result<()> {
        if let Some(window) = self.base.view() {
            window.view().show()?;
        }
        Ok(())
    }
}

/// The state embedded in every modal window: its view base, title and
/// response.
pub struct ModalWindow<R> {
    base: ViewBase,
    title: Mutex<String>,
    response: Mutex<Option<R>>,
}

impl<R: Clone + Send + Sync + 'static> ModalWindow<R> {
    /// The base for a modal window of type `V`.
    pub fn new<V: DeclareEvents>(title: impl Into<String>) -> Self {
        Self {
            base: ViewBase::new::<V>(),
            title: Mutex::new(title.into()),
            response: Mutex::new(None),
        }
    }

    /// Declare the events of a modal window on `class`.
    pub fn declare<V: DeclareEvents>(class: &mut EventClassBuilder<V>) {
        ViewBase::declare(class);
        class.hook(MODAL_SHOWN);
    }

    /// The embedded view base.
    pub fn view_base(&self) -> &ViewBase {
        &self.base
    }

    /// The window title.
    pub fn title(&self) -> String {
        self.title.lock().clone()
    }

    /// Change the window title.
    pub fn set_title(&self, title: impl Into<String>) {
        *self.title.lock() = title.into();
    }

    /// The response given so far.
    pub fn response(&self) -> Option<R> {
        self.response.lock().clone()
    }

    /// Replace the response without closing.
    pub fn set_response(&self, response: Option<R>) {
        *self.response.lock() = response;
    }
}

impl<R> fmt::Debug for ModalWindow<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModalWindow")
            .field("title", &*self.title.lock())
            .field("state", &self.base.state())
            .field("answered", &self.response.lock().is_some())
            .finish()
    }
}

/// A view that blocks its caller until it is closed.
pub trait Modal: View {
    /// What the window hands back.
    type Response: Clone + Send + Sync + 'static;

    /// The embedded modal state.
    fn modal_base(&self) -> &ModalWindow<Self::Response>;
}

/// Operations available on every modal window.
pub trait ModalExt: Modal {
    /// The response given so far.
    fn response(&self) -> Option<Self::Response> {
        self.modal_base().response()
    }

    /// Set the response and close the window.
    fn respond(&self, response: Self::Response) -> Result<bool> {
        self.modal_base().set_response(Some(response));
        self.close()
    }

    /// Show the window and pump `host` until it is closed.
    ///
    /// Returns the response at the time of closing. If the loop is asked to
    /// quit first, the window is closed and the error is returned.
    fn show_modal(self: &Arc<Self>, host: &dyn Host) -> Result<Option<Self::Response>>
    where
        Self: Sized,
    {
        if self.view_base().is_closed() {
            return Ok(self.response());
        }
        self.show()?;
        tracing::debug!(
            target: TARGET,
            title = %self.modal_base().title(),
            "modal window shown"
        );
        self.event_bus()
            .emit(MODAL_SHOWN, ViewHandle::new(self.clone()))?;

        let window = self.clone();
        if let Err(err) = host.wait_until(&|| window.view_base().is_closed()) {
            self.close()?;
            return Err(err);
        }
        tracing::debug!(target: TARGET, "modal window closed");
        Ok(self.response())
    }
}

impl<M: Modal + ?Sized> ModalExt for M {}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use trellis_core::{Application, Event, ObserverRef};

    use super::*;

    struct Prompt {
        modal: ModalWindow<u32>,
    }

    impl Prompt {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                modal: ModalWindow::new::<Self>("Pick"),
            })
        }
    }

    impl DeclareEvents for Prompt {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ModalWindow::<u32>::declare(class);
        }
    }

    impl EventObject for Prompt {
        fn event_bus(&self) -> &EventBus {
            self.modal.view_base().bus()
        }
    }

    impl View for Prompt {
        fn view_base(&self) -> &ViewBase {
            self.modal.view_base()
        }

        fn on_prepare(&self) -> Result<()> {
            Ok(())
        }
    }

    impl Modal for Prompt {
        type Response = u32;

        fn modal_base(&self) -> &ModalWindow<u32> {
            &self.modal
        }
    }

    #[test]
    fn window_without_content_cannot_be_prepared() {
        let window = Window::new("Empty");
        assert!(matches!(
            window.show(),
            Err(Error::NotImplemented { hook: "prepare", .. })
        ));

        let built = Arc::new(AtomicBool::new(false));
        let flag = built.clone();
        let window = Window::with_content("Full", move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(window.show().unwrap());
        assert!(built.load(Ordering::SeqCst));
        window.set_title("Renamed");
        assert_eq!(window.title(), "Renamed");
    }

    #[test]
    fn window_controller_shows_its_window() {
        let app = Application::new();
        let window = Window::with_content("Main", |_| Ok(()));
        let controller = WindowController::new(&app, window.clone()).unwrap();

        controller.start().unwrap();
        assert!(window.view_base().is_showing());
        assert!(controller.window().unwrap().is::<Window>());

        window.close().unwrap();
        assert!(controller.base().is_stopped());
    }

    #[test]
    fn show_modal_waits_for_a_response() {
        let app = Application::new();
        let prompt = Prompt::new();
        let seen = Arc::new(AtomicBool::new(false));
        let flag = seen.clone();
        prompt.event_bus().add_observer(ObserverRef::callback(move |event: &Event| {
            if event.name() == MODAL_SHOWN {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        }));

        let pending = prompt.clone();
        app.host().invoke(move || pending.respond(7).map(|_| ()));
        assert_eq!(prompt.show_modal(app.host().as_ref()).unwrap(), Some(7));
        assert!(seen.load(Ordering::SeqCst));
        assert!(prompt.view_base().is_closed());
    }

    #[test]
    fn quitting_the_loop_closes_the_modal() {
        let app = Application::new();
        let prompt = Prompt::new();
        prompt.modal_base().set_response(Some(1));

        let host = app.host().clone();
        app.host().invoke(move || {
            host.quit();
            Ok(())
        });
        assert!(matches!(
            prompt.show_modal(app.host().as_ref()),
            Err(Error::EventLoopExited)
        ));
        assert!(prompt.view_base().is_closed());
        assert_eq!(prompt.response(), Some(1));
    }
}
