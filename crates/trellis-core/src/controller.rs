//! Controllers and their lifecycle.
//!
//! A controller embeds a [`ControllerBase`] and implements [`Controller`].
//! Lifecycle operations live on [`ControllerExt`]:
//!
//! ```text
//! Initialized --prepare--> Configured --start--> Started --stop--> Stopped
//! ```
//!
//! # Parents and observers
//!
//! Every controller has a parent: the [`Application`] or another controller.
//! Once [attached](ControllerExt::attach), parent and child observe each
//! other, so the parent hears `controller_start`/`controller_stop` and the
//! child hears what the parent triggers (`application_stop` for top-level
//! controllers). Observer references never own their target; the parent's
//! registry (or whoever created the controller) does.
//!
//! # Views and models
//!
//! A controller may own one view and one model. Setting either wires the
//! same mutual observation. A controller stops when its view closes and
//! closes its view when it stops.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::prelude::*;
//!
//! struct Greeter {
//!     base: ControllerBase,
//! }
//!
//! impl DeclareEvents for Greeter {
//!     fn declare_events(class: &mut EventClassBuilder<Self>) {
//!         ControllerBase::declare(class);
//!     }
//! }
//!
//! impl EventObject for Greeter {
//!     fn event_bus(&self) -> &EventBus {
//!         self.base.bus()
//!     }
//! }
//!
//! impl Controller for Greeter {
//!     fn base(&self) -> &ControllerBase {
//!         &self.base
//!     }
//!
//!     fn on_prepare(&self) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let app = Application::new();
//! let greeter = Arc::new(Greeter {
//!     base: ControllerBase::new::<Greeter>(&app),
//! })
//! .attach()
//! .unwrap();
//!
//! assert!(greeter.start().unwrap());
//! assert!(greeter.stop().unwrap());
//! assert!(!greeter.stop().unwrap());
//! assert_eq!(greeter.base().state(), ControllerState::Stopped);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;

use crate::application::Application;
use crate::bus::{EventBus, EventObject, ObserverRef};
use crate::error::{Error, Result};
use crate::event::ObjectId;
use crate::event_loop::Host;
use crate::lifecycle::{ControllerState, Lifecycle};
use crate::meta::{DeclareEvents, EventClassBuilder};
use crate::model::{Model, ModelHandle};
use crate::thread_safe::ThreadSafe;
use crate::view::{VIEW_CLOSE, View, ViewExt, ViewHandle};

/// Event triggered when a controller starts.
pub const CONTROLLER_START: &str = "controller_start";
/// Event triggered when a controller stops.
pub const CONTROLLER_STOP: &str = "controller_stop";

/// The parent of a controller.
#[derive(Clone)]
pub enum ParentRef {
    /// A top-level controller, owned by the application.
    Application(Weak<Application>),
    /// A nested controller.
    Controller(Weak<dyn Controller>),
}

impl ParentRef {
    /// The parent as an event bus participant, if it is alive.
    pub fn upgrade(&self) -> Option<Arc<dyn EventObject>> {
        match self {
            Self::Application(app) => app.upgrade().map(|app| app as Arc<dyn EventObject>),
            Self::Controller(controller) => controller
                .upgrade()
                .map(|controller| controller as Arc<dyn EventObject>),
        }
    }

    /// The parent controller, if the parent is a living controller.
    pub fn controller(&self) -> Option<Arc<dyn Controller>> {
        match self {
            Self::Application(_) => None,
            Self::Controller(controller) => controller.upgrade(),
        }
    }

    /// The application at the root of the parent chain.
    pub fn application(&self) -> Option<Arc<Application>> {
        match self {
            Self::Application(app) => app.upgrade(),
            Self::Controller(controller) => controller.upgrade()?.base().parent().application(),
        }
    }
}

impl From<&Arc<Application>> for ParentRef {
    fn from(app: &Arc<Application>) -> Self {
        Self::Application(Arc::downgrade(app))
    }
}

impl<C: Controller> From<&Arc<C>> for ParentRef {
    fn from(controller: &Arc<C>) -> Self {
        let weak: Weak<C> = Arc::downgrade(controller);
        Self::Controller(weak)
    }
}

impl From<&Arc<dyn Controller>> for ParentRef {
    fn from(controller: &Arc<dyn Controller>) -> Self {
        Self::Controller(Arc::downgrade(controller))
    }
}

impl fmt::Debug for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application(_) => f.write_str("Application"),
            Self::Controller(c) => match c.upgrade() {
                Some(c) => write!(f, "Controller({})", c.base().bus().type_name()),
                None => f.write_str("Controller(<dropped>)"),
            },
        }
    }
}

/// Shared state of every controller.
pub struct ControllerBase {
    bus: EventBus,
    lifecycle: Lifecycle<ControllerState>,
    lock: ThreadSafe,
    parent: ParentRef,
    parent_id: Option<ObjectId>,
    this: OnceLock<Weak<dyn Controller>>,
    this_any: OnceLock<Weak<dyn Any + Send + Sync>>,
    view: RwLock<Option<ViewHandle>>,
    model: RwLock<Option<ModelHandle>>,
}

impl ControllerBase {
    /// State for an instance of controller type `C` under `parent`.
    pub fn new<C: DeclareEvents>(parent: impl Into<ParentRef>) -> Self {
        let parent = parent.into();
        let parent_id = parent.upgrade().map(|p| p.object_id());
        Self {
            bus: EventBus::new::<C>(),
            lifecycle: Lifecycle::new(),
            lock: ThreadSafe::new(),
            parent,
            parent_id,
            this: OnceLock::new(),
            this_any: OnceLock::new(),
            view: RwLock::new(None),
            model: RwLock::new(None),
        }
    }

    /// Declare the hooks and slots every controller has.
    ///
    /// Controllers emit `controller_start` and `controller_stop`, and stop
    /// on `application_stop` and on `view_close` from their own view.
    pub fn declare<C: Controller + DeclareEvents>(class: &mut EventClassBuilder<C>) {
        class
            .hook(CONTROLLER_START)
            .hook(CONTROLLER_STOP)
            .slot(
                crate::application::APPLICATION_STOP,
                "application_stop",
                |controller, _| controller.stop().map(|_| ()),
            )
            .slot(VIEW_CLOSE, "view_close", |controller, event| {
                if controller.base().view_id() != Some(event.source()) {
                    return Ok(());
                }
                controller.stop().map(|_| ())
            });
    }

    /// The controller's event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The controller's lock.
    pub fn lock(&self) -> &ThreadSafe {
        &self.lock
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ControllerState {
        self.lifecycle.state()
    }

    /// Whether the controller has not been prepared yet.
    pub fn is_initialized(&self) -> bool {
        self.lifecycle.is(ControllerState::Initialized)
    }

    /// Whether the controller is prepared but not started.
    pub fn is_configured(&self) -> bool {
        self.lifecycle.is(ControllerState::Configured)
    }

    /// Whether the controller is running.
    pub fn is_running(&self) -> bool {
        self.lifecycle.is(ControllerState::Started)
    }

    /// Whether the controller has stopped.
    pub fn is_stopped(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    /// The parent of this controller.
    pub fn parent(&self) -> &ParentRef {
        &self.parent
    }

    /// The application at the root of the controller tree.
    pub fn application(&self) -> Result<Arc<Application>> {
        self.parent.application().ok_or(Error::Detached {
            type_name: self.bus.type_name(),
        })
    }

    /// The host loop of the application.
    pub fn host(&self) -> Result<Arc<dyn Host>> {
        Ok(self.application()?.host().clone())
    }

    /// This controller, once attached.
    pub fn this(&self) -> Option<Arc<dyn Controller>> {
        self.this.get().and_then(Weak::upgrade)
    }

    /// This controller as a `C`.
    ///
    /// Fails with [`Error::InvalidCapability`] if it is another type and with
    /// [`Error::Detached`] if it was never attached.
    pub fn downcast<C: Controller>(&self) -> Result<Arc<C>> {
        let this = self
            .this_any
            .get()
            .and_then(Weak::upgrade)
            .ok_or(Error::Detached {
                type_name: self.bus.type_name(),
            })?;
        this.downcast::<C>().map_err(|_| Error::InvalidCapability {
            slot: "controller",
            expected: std::any::type_name::<C>(),
            found: self.bus.type_name(),
        })
    }

    fn attached(&self) -> Result<Arc<dyn Controller>> {
        self.this().ok_or(Error::Detached {
            type_name: self.bus.type_name(),
        })
    }

    /// Whether a view is set.
    pub fn has_view(&self) -> bool {
        self.view.read().is_some()
    }

    /// The view, if set.
    pub fn view(&self) -> Option<ViewHandle> {
        self.view.read().clone()
    }

    fn view_id(&self) -> Option<ObjectId> {
        self.view
            .read()
            .as_ref()
            .map(|handle| handle.view().event_bus().id())
    }

    /// The view as a `V`.
    ///
    /// Fails with [`Error::InvalidCapability`] if no view of that type is set.
    pub fn require_view<V: View>(&self) -> Result<Arc<V>> {
        match self.view() {
            Some(handle) => handle.downcast::<V>(),
            None => Err(Error::InvalidCapability {
                slot: "view",
                expected: std::any::type_name::<V>(),
                found: "nothing",
            }),
        }
    }

    /// Replace the view, rewiring observation and the view's controller.
    ///
    /// The controller must be attached.
    pub fn set_view(&self, view: Option<ViewHandle>) -> Result<()> {
        let this = self.attached()?;
        let previous = std::mem::replace(&mut *self.view.write(), view.clone());

        if let Some(old) = previous {
            let old = old.view();
            old.view_base().set_controller(None);
            old.event_bus().remove_observer_id(self.bus.id());
            self.bus.remove_observer_id(old.event_bus().id());
        }
        if let Some(new) = view {
            let new = new.view();
            new.view_base().set_controller(Some(Arc::downgrade(&this)));
            let controller_ref = Arc::downgrade(&this) as Weak<dyn EventObject>;
            new.event_bus().add_observer(ObserverRef::from_weak(controller_ref)?);
            let view_ref = Arc::downgrade(new) as Weak<dyn EventObject>;
            self.bus.add_observer(ObserverRef::from_weak(view_ref)?);
        }
        Ok(())
    }

    /// Whether a model is set.
    pub fn has_model(&self) -> bool {
        self.model.read().is_some()
    }

    /// The model, if set.
    pub fn model(&self) -> Option<ModelHandle> {
        self.model.read().clone()
    }

    /// The model as an `M`.
    ///
    /// Fails with [`Error::InvalidCapability`] if no model of that type is set.
    pub fn require_model<M: Model>(&self) -> Result<Arc<M>> {
        match self.model() {
            Some(handle) => handle.downcast::<M>(),
            None => Err(Error::InvalidCapability {
                slot: "model",
                expected: std::any::type_name::<M>(),
                found: "nothing",
            }),
        }
    }

    /// Replace the model, rewiring observation.
    ///
    /// The controller must be attached.
    pub fn set_model(&self, model: Option<ModelHandle>) -> Result<()> {
        let this = self.attached()?;
        let previous = std::mem::replace(&mut *self.model.write(), model.clone());

        if let Some(old) = previous {
            let old = old.model();
            old.event_bus().remove_observer_id(self.bus.id());
            self.bus.remove_observer_id(old.event_bus().id());
        }
        if let Some(new) = model {
            let new = new.model();
            let controller_ref = Arc::downgrade(&this) as Weak<dyn EventObject>;
            new.event_bus().add_observer(ObserverRef::from_weak(controller_ref)?);
            let model_ref = Arc::downgrade(new) as Weak<dyn EventObject>;
            self.bus.add_observer(ObserverRef::from_weak(model_ref)?);
        }
        Ok(())
    }

    /// Undo the mutual observation with the parent.
    fn detach_from_parent(&self) {
        if let Some(parent) = self.parent.upgrade() {
            parent.event_bus().remove_observer_id(self.bus.id());
        }
        if let Some(parent_id) = self.parent_id {
            self.bus.remove_observer_id(parent_id);
        }
    }
}

impl fmt::Debug for ControllerBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerBase")
            .field("bus", &self.bus)
            .field("state", &self.state())
            .field("parent", &self.parent)
            .field("view", &self.view.read())
            .field("model", &self.model.read())
            .finish()
    }
}

/// A controller.
pub trait Controller: EventObject {
    /// The shared controller state.
    fn base(&self) -> &ControllerBase;

    /// Create the view, if this controller loads its own.
    ///
    /// Called by [`prepare`](ControllerExt::prepare) when no view is set.
    fn load_view(&self) -> Result<Option<ViewHandle>> {
        Ok(None)
    }

    /// Configure the controller.
    ///
    /// Runs after the view (if any) has been loaded and prepared. The default
    /// accepts controllers with a view; controllers without one must
    /// implement it.
    fn on_prepare(&self) -> Result<()> {
        if self.base().has_view() {
            Ok(())
        } else {
            Err(Error::not_implemented::<Self>("prepare"))
        }
    }

    /// Called once the controller has started.
    fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called once the controller has stopped, before its view is closed.
    fn on_stop(&self) -> Result<()> {
        Ok(())
    }

    /// Named child controllers, for controllers that own some.
    fn children(&self) -> Vec<(String, Arc<dyn Controller>)> {
        Vec::new()
    }
}

/// Lifecycle operations available on every controller.
pub trait ControllerExt: Controller {
    /// Register this controller with its parent.
    ///
    /// Sets up the mutual observation between parent and child. Must be
    /// called once, right after construction.
    fn attach(self: Arc<Self>) -> Result<Arc<Self>>
    where
        Self: Sized,
    {
        let base = self.base();
        let as_dyn: Arc<dyn Controller> = self.clone();
        let _ = base.this.set(Arc::downgrade(&as_dyn));
        let as_any: Arc<dyn Any + Send + Sync> = self.clone();
        let _ = base.this_any.set(Arc::downgrade(&as_any));

        let parent = base.parent.upgrade().ok_or(Error::Detached {
            type_name: base.bus.type_name(),
        })?;
        base.bus
            .add_observer(ObserverRef::from_weak(Arc::downgrade(&parent))?);
        parent.event_bus().add_observer(ObserverRef::object(&self));
        tracing::debug!(
            target: "trellis_core::lifecycle",
            controller = base.bus.type_name(),
            parent = parent.event_bus().type_name(),
            "controller attached"
        );
        Ok(self)
    }

    /// Configure the controller. Runs once; later calls do nothing.
    fn prepare(&self) -> Result<bool> {
        let base = self.base();
        base.lock.thread_safe(|| {
            if !base.is_initialized() {
                return Ok(false);
            }
            if !base.has_view()
                && let Some(view) = self.load_view()?
            {
                base.set_view(Some(view))?;
            }
            if let Some(view) = base.view() {
                view.view().prepare()?;
            }
            self.on_prepare()?;
            Ok(base
                .lifecycle
                .transition(ControllerState::Configured, base.bus.type_name())
                .is_some())
        })
    }

    /// Start the controller, preparing it first if needed.
    ///
    /// Triggers `controller_start` once the state is `Started`, then runs
    /// [`Controller::on_start`]. Does nothing if already started or stopped.
    fn start(&self) -> Result<bool> {
        let base = self.base();
        base.lock.thread_safe(|| {
            if base.is_initialized() {
                self.prepare()?;
            }
            if base
                .lifecycle
                .transition(ControllerState::Started, base.bus.type_name())
                .is_none()
            {
                return Ok(false);
            }
            base.bus.trigger_event(CONTROLLER_START, None)?;
            self.on_start()?;
            Ok(true)
        })
    }

    /// Stop the controller for good.
    ///
    /// The state becomes `Stopped` first, so handlers of `controller_stop`
    /// and a closing view see a stopped controller. The view is closed and
    /// the controller is detached from its parent even if a step fails.
    fn stop(&self) -> Result<bool> {
        let base = self.base();
        base.lock.thread_safe(|| {
            if base
                .lifecycle
                .transition(ControllerState::Stopped, base.bus.type_name())
                .is_none()
            {
                return Ok(false);
            }
            let result = (|| -> Result<()> {
                base.bus.trigger_event(CONTROLLER_STOP, None)?;
                self.on_stop()?;
                if let Some(view) = base.view()
                    && !view.view().view_base().is_closed()
                {
                    view.view().close()?;
                }
                Ok(())
            })();
            base.detach_from_parent();
            result.map(|()| true)
        })
    }
}

impl<C: Controller + ?Sized> ControllerExt for C {}
