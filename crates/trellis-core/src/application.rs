//! The application root.
//!
//! An [`Application`] owns the host loop, the background worker pool and the
//! registry of named top-level controllers. It is the root of every parent
//! chain: top-level controllers observe it, and it observes them.
//!
//! ```
//! use trellis_core::Application;
//!
//! let app = Application::builder().name("demo").build();
//! assert_eq!(app.name(), "demo");
//! assert!(app.controller_names().is_empty());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::{EventBus, EventObject};
use crate::controller::{Controller, ControllerExt};
use crate::error::{RegistryKind, Result};
use crate::event_loop::{EventLoop, EventLoopConfig, Host};
use crate::meta::{DeclareEvents, EventClassBuilder};
use crate::registry::Registry;
use crate::thread_safe::ThreadSafe;
use crate::worker::{WorkerPool, WorkerPoolConfig};

/// Event triggered when the application stops.
pub const APPLICATION_STOP: &str = "application_stop";

const TARGET: &str = "trellis_core::application";

/// Configuration for an [`Application`].
#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    /// Application name, used in logs.
    pub name: String,
    /// Tuning of the default host loop.
    pub event_loop: EventLoopConfig,
    /// Configuration of the background worker pool.
    pub worker: WorkerPoolConfig,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "trellis".to_string(),
            event_loop: EventLoopConfig::default(),
            worker: WorkerPoolConfig::default(),
        }
    }
}

/// Builder for [`Application`].
#[derive(Default)]
pub struct ApplicationBuilder {
    config: ApplicationConfig,
    host: Option<Arc<dyn Host>>,
}

impl ApplicationBuilder {
    /// A builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the maximum number of posted tasks the host loop runs per pump.
    pub fn task_batch_size(mut self, size: usize) -> Self {
        self.config.event_loop.task_batch_size = size.max(1);
        self
    }

    /// Set the longest time the host loop sleeps while idle.
    pub fn idle_wait(mut self, wait: Duration) -> Self {
        self.config.event_loop.idle_wait = wait;
        self
    }

    /// Set the number of background worker threads.
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker.num_threads = count.max(1);
        self
    }

    /// Use `host` instead of an in-crate [`EventLoop`].
    pub fn host(mut self, host: Arc<dyn Host>) -> Self {
        self.host = Some(host);
        self
    }

    /// Build the application.
    pub fn build(self) -> Arc<Application> {
        let host = self
            .host
            .unwrap_or_else(|| Arc::new(EventLoop::with_config(self.config.event_loop.clone())));
        tracing::debug!(target: TARGET, name = %self.config.name, "application created");
        Arc::new_cyclic(|this| Application {
            bus: EventBus::new::<Application>(),
            lock: ThreadSafe::new(),
            config: self.config,
            host,
            controllers: Mutex::new(Registry::new(RegistryKind::Controller)),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
            this: this.clone(),
        })
    }
}

/// The root of a controller tree.
pub struct Application {
    bus: EventBus,
    lock: ThreadSafe,
    config: ApplicationConfig,
    host: Arc<dyn Host>,
    controllers: Mutex<Registry<Arc<dyn Controller>>>,
    worker: Mutex<Option<Arc<WorkerPool>>>,
    stopped: AtomicBool,
    this: Weak<Application>,
}

impl Application {
    /// An application with the default configuration.
    pub fn new() -> Arc<Self> {
        ApplicationBuilder::new().build()
    }

    /// A builder for a configured application.
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    /// The application name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The application configuration.
    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// The host loop.
    pub fn host(&self) -> &Arc<dyn Host> {
        &self.host
    }

    /// The application lock.
    pub fn lock(&self) -> &ThreadSafe {
        &self.lock
    }

    /// This application, if it is still alive.
    pub fn this(&self) -> Option<Arc<Application>> {
        self.this.upgrade()
    }

    /// The background worker pool, created on first use.
    pub fn worker(&self) -> Result<Arc<WorkerPool>> {
        let mut worker = self.worker.lock();
        if let Some(pool) = worker.as_ref() {
            return Ok(pool.clone());
        }
        let pool = Arc::new(WorkerPool::new(self.config.worker.clone())?);
        *worker = Some(pool.clone());
        Ok(pool)
    }

    /// Register `controller` under `name`.
    ///
    /// Fails with [`Error::DuplicateRegistration`](crate::Error::DuplicateRegistration)
    /// if the name is taken.
    pub fn add_controller(&self, name: &str, controller: Arc<dyn Controller>) -> Result<()> {
        self.controllers.lock().add(name, controller)?;
        tracing::debug!(target: TARGET, name, "controller registered");
        Ok(())
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

    /// Unregister the controller under `name` and return it.
    ///
    /// The controller is not stopped.
    pub fn remove_controller(&self, name: &str) -> Result<Arc<dyn Controller>> {
        let controller = self.controllers.lock().remove(name)?;
        tracing::debug!(target: TARGET, name, "controller removed");
        Ok(controller)
    }

    /// Names of the registered controllers, in registration order.
    pub fn controller_names(&self) -> Vec<String> {
        self.controllers.lock().names().map(str::to_string).collect()
    }

    /// The registered controllers, in registration order.
    pub fn controllers(&self) -> Vec<(String, Arc<dyn Controller>)> {
        self.controllers
            .lock()
            .iter()
            .map(|(name, controller)| (name.to_string(), controller.clone()))
            .collect()
    }

    /// Start every registered controller, in registration order.
    pub fn start(&self) -> Result<()> {
        let controllers = self.controllers.lock().values();
        self.lock.thread_safe(|| {
            for controller in controllers {
                controller.start()?;
            }
            Ok(())
        })
    }

    /// Set up, start, run the host loop until it quits, then stop.
    ///
    /// `setup` registers the top-level controllers. Setup and start run under
    /// the application lock; the loop itself does not.
    pub fn run<F>(&self, setup: F) -> Result<()>
    where
        F: FnOnce(&Application) -> Result<()>,
    {
        tracing::info!(target: TARGET, name = %self.config.name, "application starting");
        self.lock.thread_safe(|| {
            setup(self)?;
            self.start()
        })?;
        self.host.run()?;
        self.lock.thread_safe(|| self.stop())?;
        tracing::info!(target: TARGET, name = %self.config.name, "application finished");
        Ok(())
    }

    /// Stop every controller and ask the host loop to quit.
    ///
    /// Triggers `application_stop`, then unregisters and stops the remaining
    /// controllers. Every controller is stopped even if an earlier one fails;
    /// the first error is returned afterwards. Returns `false` if the
    /// application already stopped.
    pub fn stop(&self) -> Result<bool> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        tracing::info!(target: TARGET, name = %self.config.name, "application stopping");
        let result = self.lock.thread_safe(|| {
            let mut first_error = self.bus.trigger_event(APPLICATION_STOP, None).err();
            let controllers = self.controllers.lock().drain();
            for (name, controller) in controllers {
                tracing::trace!(target: TARGET, %name, "stopping controller");
                if let Err(err) = controller.stop() {
                    tracing::warn!(
                        target: TARGET,
                        %name,
                        error = %err,
                        "controller failed to stop"
                    );
                    first_error.get_or_insert(err);
                }
            }
            first_error.map_or(Ok(()), Err)
        });
        self.host.quit();
        result.map(|()| true)
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl DeclareEvents for Application {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        class.hook(APPLICATION_STOP);
    }
}

impl EventObject for Application {
    fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("name", &self.config.name)
            .field("controllers", &self.controller_names())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

static_assertions::assert_impl_all!(Application: Send, Sync);
