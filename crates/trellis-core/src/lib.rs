//! Core systems for Trellis.
//!
//! This crate provides the substrate of the Trellis MVC framework:
//!
//! - **Event classes**: per-type tables of the events a type emits (hooks)
//!   and the handlers it runs when it hears them (slots)
//! - **Event bus**: per-object observers and synchronous event delivery
//! - **Observable**: a single-channel notification for models
//! - **Locks**: re-entrant locking for objects shared with a worker thread
//! - **Lifecycles**: table-checked controller and view state machines
//! - **Controllers, views and models**: the bases every component embeds
//! - **Poller**: a controller that re-arms itself on the host loop
//! - **Application**: the root of the controller tree
//! - **Host loop**: a cooperative, single-threaded event loop with one-shot
//!   timers, cross-thread task posting and nested waits
//! - **Worker pool**: background commands with cooperative cancellation
//!
//! # Event Bus Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use trellis_core::prelude::*;
//!
//! struct Thermometer {
//!     bus: EventBus,
//! }
//!
//! impl DeclareEvents for Thermometer {
//!     fn declare_events(class: &mut EventClassBuilder<Self>) {
//!         class.hook("reading");
//!     }
//! }
//!
//! impl EventObject for Thermometer {
//!     fn event_bus(&self) -> &EventBus {
//!         &self.bus
//!     }
//! }
//!
//! struct Display {
//!     bus: EventBus,
//!     last: AtomicI32,
//! }
//!
//! impl DeclareEvents for Display {
//!     fn declare_events(class: &mut EventClassBuilder<Self>) {
//!         class.slot("reading", "on_reading", |display: &Display, event| {
//!             let value = event.require_payload::<i32>()?;
//!             display.last.store(*value, Ordering::SeqCst);
//!             Ok(())
//!         });
//!     }
//! }
//!
//! impl EventObject for Display {
//!     fn event_bus(&self) -> &EventBus {
//!         &self.bus
//!     }
//! }
//!
//! let sensor = Thermometer { bus: EventBus::new::<Thermometer>() };
//! let display = Arc::new(Display {
//!     bus: EventBus::new::<Display>(),
//!     last: AtomicI32::new(0),
//! });
//!
//! sensor.event_bus().add_observer(&display);
//! sensor.event_bus().emit("reading", 21_i32).unwrap();
//! assert_eq!(display.last.load(Ordering::SeqCst), 21);
//! ```
//!
//! # Application Example
//!
//! ```no_run
//! use std::time::Duration;
//! use trellis_core::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let app = Application::builder().name("clock").build();
//!     let poller = Poller::new(&app, Duration::from_secs(1), || {
//!         println!("tick");
//!         Ok(())
//!     })?;
//!
//!     app.run(move |app| app.add_controller("clock", poller))
//! }
//! ```

mod application;
mod bus;
mod controller;
mod error;
mod event;
mod event_loop;
mod lifecycle;
pub mod logging;
mod meta;
mod model;
mod observe;
mod poller;
mod registry;
mod scheduler;
mod task;
mod thread_safe;
mod view;
pub mod worker;

pub use application::{APPLICATION_STOP, Application, ApplicationBuilder, ApplicationConfig};
pub use bus::{Callback, EventBus, EventObject, EventObjectExt, ObserverRef};
pub use controller::{
    CONTROLLER_START, CONTROLLER_STOP, Controller, ControllerBase, ControllerExt, ParentRef,
};
pub use error::{Error, RegistryKind, Result};
pub use event::{Event, ObjectId, Payload, Trigger};
pub use event_loop::{EventLoop, EventLoopConfig, Host, HostCallback};
pub use lifecycle::{ControllerState, Lifecycle, LifecycleState, ViewState};
pub use logging::ControllerTreeDebug;
pub use meta::{DeclareEvents, EventClass, EventClassBuilder, SlotMeta};
pub use model::{MODEL_UPDATE, Model, ModelBase, ModelExt, ModelHandle};
pub use observe::{Observable, Observer};
pub use poller::{PollTask, Poller};
pub use registry::Registry;
pub use scheduler::TimerId;
pub use task::TaskId;
pub use thread_safe::{Guarded, ThreadSafe};
pub use view::{VIEW_CLOSE, View, ViewBase, ViewExt, ViewHandle, Widget};
pub use worker::{CancellationToken, JobHandle, WorkerPool, WorkerPoolConfig};

/// The types and traits needed to write controllers, views and models.
pub mod prelude {
    pub use crate::{
        Application, Controller, ControllerBase, ControllerExt, ControllerState, DeclareEvents,
        Error, Event, EventBus, EventClassBuilder, EventObject, EventObjectExt, Host, Model,
        ModelBase, ModelExt, ModelHandle, Observable, Observer, ParentRef, Poller, Result,
        Trigger, View, ViewBase, ViewExt, ViewHandle, ViewState, Widget,
    };
}
