//! Views holding named child views, and controllers holding named child
//! controllers.
//!
//! A [`ViewSet`] closes its child views when it closes. A
//! [`ViewSetController`] stops its child controllers when it stops, before
//! its own view closes.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use trellis_core::{
    Controller, ControllerBase, ControllerExt, DeclareEvents, EventBus, EventClassBuilder,
    EventObject, ParentRef, Registry, RegistryKind, Result, View, ViewBase, ViewExt, ViewHandle,
};

const TARGET: &str = trellis_core::logging::targets::VIEWSET;

type Layout = Box<dyn Fn(&ViewSet) -> Result<()> + Send + Sync>;

/// A view made of named child views.
pub struct ViewSet {
    base: ViewBase,
    views: Mutex<Registry<ViewHandle>>,
    layout: Option<Layout>,
}

impl ViewSet {
    /// An empty view set. Child views are added by its controller.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: ViewBase::new::<Self>(),
            views: Mutex::new(Registry::new(RegistryKind::View)),
            layout: None,
        })
    }

    /// A view set whose children are built by `layout` when it is prepared.
    pub fn with_layout<F>(layout: F) -> Arc<Self>
    where
        F: Fn(&ViewSet) -> Result<()> + Send + Sync + 'static,
    {
        Arc::new(Self {
            base: ViewBase::new::<Self>(),
            views: Mutex::new(Registry::new(RegistryKind::View)),
            layout: Some(Box::new(layout)),
        })
    }

    /// Register `view` under `name`.
    pub fn add_view(&self, name: &str, view: ViewHandle) -> Result<()> {
        self.views.lock().add(name, view)
    }

    /// The view registered under `name`.
    pub fn get_view(&self, name: &str) -> Result<ViewHandle> {
        self.views.lock().get(name).cloned()
    }

    /// The view registered under `name`, as a `V`.
    pub fn get_view_as<V: View>(&self, name: &str) -> Result<Arc<V>> {
        self.get_view(name)?.downcast::<V>()
    }

    /// Whether a view is registered under `name`.
    pub fn has_view(&self, name: &str) -> bool {
        self.views.lock().contains(name)
    }

    /// Names of the child views, in registration order.
    pub fn view_names(&self) -> Vec<String> {
        self.views.lock().names().map(str::to_string).collect()
    }

    /// Close the view under `name` and unregister it.
    pub fn remove_view(&self, name: &str) -> Result<ViewHandle> {
        let view = self.views.lock().remove(name)?;
        view.view().close()?;
        Ok(view)
    }

    /// Show the view under `name`.
    pub fn show_view(&self, name: &str) -> Result<bool> {
        self.get_view(name)?.view().show()
    }

    /// Hide the view under `name`.
    pub fn hide_view(&self, name: &str) -> Result<bool> {
        self.get_view(name)?.view().hide()
    }

    /// Hide every child view.
    pub fn hide_views(&self) -> Result<()> {
        let views = self.views.lock().values();
        for view in views {
            view.view().hide()?;
        }
        Ok(())
    }

    /// Close the view under `name` and unregister it.
    pub fn close_view(&self, name: &str) -> Result<()> {
        self.remove_view(name).map(|_| ())
    }

    /// Close and unregister every child view.
    pub fn close_views(&self) -> Result<()> {
        let views = self.views.lock().drain();
        for (name, view) in views {
            tracing::trace!(target: TARGET, view = %name, "closing child view");
            view.view().close()?;
        }
        Ok(())
    }
}

impl DeclareEvents for ViewSet {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ViewBase::declare(class);
    }
}

impl EventObject for ViewSet {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl View for ViewSet {
    fn view_base(&self) -> &ViewBase {
        &self.base
    }

    fn on_prepare(&self) -> Result<()> {
        match &self.layout {
            Some(layout) => layout(self),
            None => Ok(()),
        }
    }

    fn on_close(&self) -> Result<()> {
        self.close_views()
    }
}

impl fmt::Debug for ViewSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSet")
            .field("state", &self.base.state())
            .field("views", &self.view_names())
            .finish()
    }
}

/// A controller owning named child controllers.
pub struct ViewSetController {
    base: ControllerBase,
    controllers: Mutex<Registry<Arc<dyn Controller>>>,
    view_set: Mutex<Option<Arc<ViewSet>>>,
}

impl ViewSetController {
    /// Create and attach a controller around `view_set`.
    pub fn new(parent: impl Into<ParentRef>, view_set: Arc<ViewSet>) -> Result<Arc<Self>> {
        Arc::new(Self {
            base: ControllerBase::new::<Self>(parent),
            controllers: Mutex::new(Registry::new(RegistryKind::Controller)),
            view_set: Mutex::new(Some(view_set)),
        })
        .attach()
    }

    /// The view set.
    pub fn view_set(&self) -> Result<Arc<ViewSet>> {
        self.base.require_view::<ViewSet>()
    }

    /// Register `controller` under `name`.
    ///
    /// Its view, if it has one, becomes a child view under the same name.
    /// Child views that only exist once the child is prepared are adopted
    /// when this controller starts.
    pub fn add_controller(&self, name: &str, controller: Arc<dyn Controller>) -> Result<()> {
        self.controllers.lock().add(name, controller.clone())?;
        self.adopt_view(name, &controller)
    }

    /// The controller registered under `name`.
    pub fn get_controller(&self, name: &str) -> Result<Arc<dyn Controller>> {
        self.controllers.lock().get(name).cloned()
    }

    /// The controller registered under `name`, as a `C`.
    pub fn get_controller_as<C: Controller>(&self, name: &str) -> Result<Arc<C>> {
        self.get_controller(name)?.base().downcast::<C>()
    }

    /// Whether a controller is registered under `name`.
    pub fn has_controller(&self, name: &str) -> bool {
        self.controllers.lock().contains(name)
    }

    /// Names of the child controllers, in registration order.
    pub fn controller_names(&self) -> Vec<String> {
        self.controllers.lock().names().map(str::to_string).collect()
    }

    /// Unregister the controller under `name` without stopping it.
    pub fn remove_controller(&self, name: &str) -> Result<Arc<dyn Controller>> {
        self.controllers.lock().remove(name)
    }

    fn adopt_view(&self, name: &str, controller: &Arc<dyn Controller>) -> Result<()> {
        if let (Some(view), Ok(view_set)) = (controller.base().view(), self.view_set())
            && !view_set.has_view(name)
        {
            view_set.add_view(name, view)?;
        }
        Ok(())
    }

    /// Unregister and stop every child controller.
    ///
    /// Every child is stopped even if an earlier one fails; the first error
    /// is returned afterwards.
    pub fn remove_controllers(&self) -> Result<()> {
        let controllers = self.controllers.lock().drain();
        let mut first_error = None;
        for (name, controller) in controllers {
            tracing::debug!(target: TARGET, controller = %name, "stopping child controller");
            if let Err(err) = controller.stop() {
                tracing::warn!(
                    target: TARGET,
                    controller = %name,
                    error = %err,
                    "child controller failed to stop"
                );
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl DeclareEvents for ViewSetController {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ControllerBase::declare(class);
    }
}

impl EventObject for ViewSetController {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl Controller for ViewSetController {
    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn load_view(&self) -> Result<Option<ViewHandle>> {
        Ok(self.view_set.lock().take().map(ViewHandle::new))
    }

    fn on_start(&self) -> Result<()> {
        self.view_set()?.show()?;
        for (name, child) in self.children() {
            child.start()?;
            self.adopt_view(&name, &child)?;
        }
        Ok(())
    }

    fn on_stop(&self) -> Result<()> {
        self.remove_controllers()
    }

    fn children(&self) -> Vec<(String, Arc<dyn Controller>)> {
        self.controllers
            .lock()
            .iter()
            .map(|(name, controller)| (name.to_string(), controller.clone()))
            .collect()
    }
}

impl fmt::Debug for ViewSetController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewSetController")
            .field("state", &self.base.state())
            .field("controllers", &self.controller_names())
            .finish()
    }
}
