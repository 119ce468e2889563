//! Views and their lifecycle.
//!
//! A view embeds a [`ViewBase`] and implements [`View`]. The lifecycle
//! operations live on [`ViewExt`]:
//!
//! - [`prepare`](ViewExt::prepare) builds the view once.
//! - [`show`](ViewExt::show) prepares if needed, then shows.
//! - [`hide`](ViewExt::hide) hides; the view may be shown again.
//! - [`close`](ViewExt::close) triggers `view_close`, closes for good,
//!   destroys the registered widgets and stops the controller.
//!
//! Closing and stopping call into each other: a controller closes its view
//! when it stops and stops when its view closes. Each side checks its own
//! state first, so the pair settles after one round.
//!
//! Views talk to the widget toolkit only through [`Widget`].

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::bus::{EventBus, EventObject};
use crate::controller::{Controller, ControllerExt};
use crate::error::{Error, RegistryKind, Result};
use crate::lifecycle::{Lifecycle, ViewState};
use crate::meta::{DeclareEvents, EventClassBuilder};
use crate::registry::Registry;
use crate::thread_safe::ThreadSafe;

/// Event triggered when a view starts closing.
pub const VIEW_CLOSE: &str = "view_close";

/// A toolkit widget owned by a view.
pub trait Widget: Any + Send + Sync {
    /// Make the widget visible.
    fn show(&self) -> Result<()> {
        Ok(())
    }

    /// Hide the widget.
    fn hide(&self) -> Result<()> {
        Ok(())
    }

    /// Release the widget. Called once, when its view closes.
    fn destroy(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct Variable {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

/// Shared state of every view.
pub struct ViewBase {
    bus: EventBus,
    lifecycle: Lifecycle<ViewState>,
    lock: ThreadSafe,
    closing: AtomicBool,
    controller: RwLock<Option<Weak<dyn Controller>>>,
    variables: Mutex<Registry<Variable>>,
    widgets: Mutex<Registry<Arc<dyn Widget>>>,
}

impl ViewBase {
    /// State for an instance of view type `V`.
    pub fn new<V: DeclareEvents>() -> Self {
        Self {
            bus: EventBus::new::<V>(),
            lifecycle: Lifecycle::new(),
            lock: ThreadSafe::new(),
            closing: AtomicBool::new(false),
            controller: RwLock::new(None),
            variables: Mutex::new(Registry::new(RegistryKind::Variable)),
            widgets: Mutex::new(Registry::new(RegistryKind::Widget)),
        }
    }

    /// Declare the hooks every view has.
    pub fn declare<V: DeclareEvents>(class: &mut EventClassBuilder<V>) {
        class.hook(VIEW_CLOSE);
    }

    /// The view's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The view's lock.
    pub fn lock(&self) -> &ThreadSafe {
        &self.lock
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ViewState {
        self.lifecycle.state()
    }

    /// Whether the view is visible.
    pub fn is_showing(&self) -> bool {
        self.lifecycle.is(ViewState::Showing)
    }

    /// Whether the view has been closed.
    pub fn is_closed(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    /// The controller managing this view, if it is still alive.
    pub fn controller(&self) -> Option<Arc<dyn Controller>> {
        self.controller.read().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_controller(&self, controller: Option<Weak<dyn Controller>>) {
        *self.controller.write() = controller;
    }

    /// Register a variable under `name`.
    pub fn add_variable<T: Any + Send + Sync>(&self, name: &str, value: T) -> Result<Arc<T>> {
        let value = Arc::new(value);
        self.variables.lock().add(
            name,
            Variable {
                value: value.clone(),
                type_name: std::any::type_name::<T>(),
            },
        )?;
        Ok(value)
    }

    /// The variable under `name` as a `T`.
    ///
    /// Fails with [`Error::UnknownRegistration`] if absent and with
    /// [`Error::InvalidCapability`] if it holds another type.
    pub fn get_variable<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
        let variable = self.variables.lock().get(name)?.clone();
        variable
            .value
            .downcast::<T>()
            .map_err(|_| Error::InvalidCapability {
                slot: "variable",
                expected: std::any::type_name::<T>(),
                found: variable.type_name,
            })
    }

    /// Whether a variable is registered under `name`.
    pub fn has_variable(&self, name: &str) -> bool {
        self.variables.lock().contains(name)
    }

    /// Unregister the variable under `name`.
    pub fn remove_variable(&self, name: &str) -> Result<()> {
        self.variables.lock().remove(name).map(|_| ())
    }

    /// Names of the registered variables.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.lock().names().map(str::to_string).collect()
    }

    /// Register a widget under `name`.
    pub fn add_widget(&self, name: &str, widget: Arc<dyn Widget>) -> Result<Arc<dyn Widget>> {
        self.widgets.lock().add(name, widget.clone())?;
        Ok(widget)
    }

    /// The widget under `name`.
    pub fn get_widget(&self, name: &str) -> Result<Arc<dyn Widget>> {
        self.widgets.lock().get(name).cloned()
    }

    /// The widget under `name` as a `W`.
    ///
    /// Fails with [`Error::InvalidCapability`] if it is another kind of widget.
    pub fn widget_as<W: Widget>(&self, name: &str) -> Result<Arc<W>> {
        let widget: Arc<dyn Any + Send + Sync> = self.get_widget(name)?;
        widget.downcast::<W>().map_err(|_| Error::InvalidCapability {
            slot: "widget",
            expected: std::any::type_name::<W>(),
            found: "another widget",
        })
    }

    /// Whether a widget is registered under `name`.
    pub fn has_widget(&self, name: &str) -> bool {
        self.widgets.lock().contains(name)
    }

    /// Unregister the widget under `name` without destroying it.
    pub fn remove_widget(&self, name: &str) -> Result<Arc<dyn Widget>> {
        self.widgets.lock().remove(name)
    }

    /// Names of the registered widgets.
    pub fn widget_names(&self) -> Vec<String> {
        self.widgets.lock().names().map(str::to_string).collect()
    }

    fn widgets_snapshot(&self) -> Vec<Arc<dyn Widget>> {
        self.widgets.lock().values()
    }

    fn destroy_widgets(&self) -> Result<()> {
        let widgets = self.widgets.lock().drain();
        for (name, widget) in widgets {
            tracing::trace!(target: "trellis_core::lifecycle", widget = %name, "destroying widget");
            widget.destroy()?;
        }
        Ok(())
    }
}

impl fmt::Debug for ViewBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewBase")
            .field("bus", &self.bus)
            .field("state", &self.state())
            .field("widgets", &self.widget_names())
            .finish()
    }
}

/// A view.
///
/// Only [`on_prepare`](Self::on_prepare) has to be written; the other hooks
/// default to doing nothing.
pub trait View: EventObject {
    /// The shared view state.
    fn view_base(&self) -> &ViewBase;

    /// Build the view's widgets.
    fn on_prepare(&self) -> Result<()> {
        Err(Error::not_implemented::<Self>("prepare"))
    }

    /// Called after the view became visible.
    fn on_show(&self) -> Result<()> {
        Ok(())
    }

    /// Called after the view was hidden.
    fn on_hide(&self) -> Result<()> {
        Ok(())
    }

    /// Called once the view is closed, before its widgets are destroyed.
    fn on_close(&self) -> Result<()> {
        Ok(())
    }
}

/// Lifecycle operations available on every view.
pub trait ViewExt: View {
    /// Build the view. Does nothing once the view has been prepared.
    fn prepare(&self) -> Result<bool> {
        let base = self.view_base();
        base.lock.thread_safe(|| {
            if !base.lifecycle.is(ViewState::Initialized) {
                return Ok(false);
            }
            self.on_prepare()?;
            Ok(base
                .lifecycle
                .transition(ViewState::Configured, base.bus.type_name())
                .is_some())
        })
    }

    /// Show the view, preparing it first if needed.
    fn show(&self) -> Result<bool> {
        let base = self.view_base();
        base.lock.thread_safe(|| {
            if base.is_closed() {
                return Ok(false);
            }
            if base.lifecycle.is(ViewState::Initialized) {
                self.prepare()?;
            }
            if base
                .lifecycle
                .transition(ViewState::Showing, base.bus.type_name())
                .is_none()
            {
                return Ok(false);
            }
            for widget in base.widgets_snapshot() {
                widget.show()?;
            }
            self.on_show()?;
            Ok(true)
        })
    }

    /// Hide the view.
    fn hide(&self) -> Result<bool> {
        let base = self.view_base();
        base.lock.thread_safe(|| {
            if base
                .lifecycle
                .transition(ViewState::Hidden, base.bus.type_name())
                .is_none()
            {
                return Ok(false);
            }
            for widget in base.widgets_snapshot() {
                widget.hide()?;
            }
            self.on_hide()?;
            Ok(true)
        })
    }

    /// Close the view for good.
    ///
    /// `view_close` is triggered while the view is still open. Once closed,
    /// the view's widgets are destroyed and its controller is stopped if it
    /// is still running. Closing a closed view, or a view that is already
    /// closing, does nothing.
    fn close(&self) -> Result<bool> {
        let base = self.view_base();
        if base.is_closed() || base.closing.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        base.lock.thread_safe(|| {
            let result = (|| -> Result<()> {
                base.bus.trigger_event(VIEW_CLOSE, None)?;
                base.lifecycle
                    .transition(ViewState::Closed, base.bus.type_name());
                self.on_close()?;
                base.destroy_widgets()?;
                if let Some(controller) = base.controller()
                    && !controller.base().is_stopped()
                {
                    controller.stop()?;
                }
                Ok(())
            })();
            if result.is_err() && !base.is_closed() {
                base.closing.store(false, Ordering::SeqCst);
            }
            result.map(|()| true)
        })
    }
}

impl<V: View + ?Sized> ViewExt for V {}

/// A type-checked handle to a view held by a controller.
#[derive(Clone)]
pub struct ViewHandle {
    view: Arc<dyn View>,
    any: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ViewHandle {
    /// Wrap `view`.
    pub fn new<V: View>(view: Arc<V>) -> Self {
        Self {
            any: view.clone(),
            view,
            type_name: std::any::type_name::<V>(),
        }
    }

    /// The view.
    pub fn view(&self) -> &Arc<dyn View> {
        &self.view
    }

    /// The view's concrete type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the view is a `V`.
    pub fn is<V: View>(&self) -> bool {
        self.any.is::<V>()
    }

    /// The view as a `V`.
    ///
    /// Fails with [`Error::InvalidCapability`] if it is another type.
    pub fn downcast<V: View>(&self) -> Result<Arc<V>> {
        self.any
            .clone()
            .downcast::<V>()
            .map_err(|_| Error::InvalidCapability {
                slot: "view",
                expected: std::any::type_name::<V>(),
                found: self.type_name,
            })
    }
}

impl fmt::Debug for ViewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ViewHandle").field(&self.type_name).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::bus::ObserverRef;

    #[derive(Default)]
    struct Lamp {
        shown: AtomicUsize,
        hidden: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl Widget for Lamp {
        fn show(&self) -> Result<()> {
            self.shown.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn hide(&self) -> Result<()> {
            self.hidden.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn destroy(&self) -> Result<()> {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Panel {
        base: ViewBase,
        prepared: AtomicUsize,
        widget: Arc<Lamp>,
    }

    impl Panel {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: ViewBase::new::<Self>(),
                prepared: AtomicUsize::new(0),
                widget: Arc::new(Lamp::default()),
            })
        }
    }

    impl DeclareEvents for Panel {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ViewBase::declare(class);
        }
    }

    impl EventObject for Panel {
        fn event_bus(&self) -> &EventBus {
            self.base.bus()
        }
    }

    impl View for Panel {
        fn view_base(&self) -> &ViewBase {
            &self.base
        }

        fn on_prepare(&self) -> Result<()> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            self.base.add_widget("lamp", self.widget.clone())?;
            Ok(())
        }
    }

    struct Blank {
        base: ViewBase,
    }

    impl DeclareEvents for Blank {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ViewBase::declare(class);
        }
    }

    impl EventObject for Blank {
        fn event_bus(&self) -> &EventBus {
            &self.base.bus
        }
    }

    impl View for Blank {
        fn view_base(&self) -> &ViewBase {
            &self.base
        }
    }

    #[test]
    fn show_prepares_once() {
        let panel = Panel::new();
        assert!(panel.show().unwrap());
        assert!(!panel.show().unwrap());
        assert!(panel.hide().unwrap());
        assert!(panel.show().unwrap());
        assert_eq!(panel.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(panel.widget.shown.load(Ordering::SeqCst), 2);
        assert_eq!(panel.widget.hidden.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_is_terminal_and_destroys_widgets() {
        let panel = Panel::new();
        panel.show().unwrap();

        let closes = Arc::new(AtomicUsize::new(0));
        let closes_clone = closes.clone();
        panel.base.bus().add_observer(ObserverRef::callback(move |event| {
            if event.name() == VIEW_CLOSE {
                closes_clone.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }));

        assert!(panel.close().unwrap());
        assert!(!panel.close().unwrap());
        assert!(!panel.show().unwrap());
        assert_eq!(panel.base.state(), ViewState::Closed);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert_eq!(panel.widget.destroyed.load(Ordering::SeqCst), 1);
        assert!(panel.base.widget_names().is_empty());
    }

    #[test]
    fn view_close_fires_before_the_state_changes() {
        let panel = Panel::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let weak = Arc::downgrade(&panel);
        panel.base.bus().add_observer(ObserverRef::callback(move |_| {
            *seen_clone.lock() = weak.upgrade().map(|p| p.base.state());
            Ok(())
        }));
        panel.close().unwrap();
        assert_eq!(*seen.lock(), Some(ViewState::Initialized));
    }

    #[test]
    fn unimplemented_prepare_is_reported() {
        let blank = Blank {
            base: ViewBase::new::<Blank>(),
        };
        let err = blank.show().unwrap_err();
        assert!(matches!(err, Error::NotImplemented { hook: "prepare", .. }));
        assert_eq!(blank.base.state(), ViewState::Initialized);
    }

    #[test]
    fn variables_are_typed() {
        let panel = Panel::new();
        let name = panel.base.add_variable("name", String::from("trellis")).unwrap();
        assert_eq!(name.as_str(), "trellis");
        assert_eq!(*panel.base.get_variable::<String>("name").unwrap(), "trellis");
        assert!(matches!(
            panel.base.get_variable::<u32>("name"),
            Err(Error::InvalidCapability { slot: "variable", .. })
        ));
        assert!(matches!(
            panel.base.add_variable("name", 1_u8),
            Err(Error::DuplicateRegistration { .. })
        ));
        panel.base.remove_variable("name").unwrap();
        assert!(matches!(
            panel.base.remove_variable("name"),
            Err(Error::UnknownRegistration { .. })
        ));
    }

    #[test]
    fn widget_registry() {
        let panel = Panel::new();
        panel.prepare().unwrap();
        assert!(panel.base.has_widget("lamp"));
        assert!(panel.base.widget_as::<Lamp>("lamp").is_ok());
        assert!(panel.base.get_widget("missing").is_err());
        panel.base.remove_widget("lamp").unwrap();
        assert!(!panel.base.has_widget("lamp"));
    }

    #[test]
    fn handle_checks_capability() {
        let handle = ViewHandle::new(Panel::new());
        assert!(handle.is::<Panel>());
        assert!(handle.downcast::<Panel>().is_ok());
        assert!(matches!(
            handle.downcast::<Blank>(),
            Err(Error::InvalidCapability { slot: "view", .. })
        ));
    }
}
