//! Controllers that run a task at a fixed interval.
//!
//! A [`Poller`] runs its [`PollTask`] when it starts, then re-arms itself on
//! the application's host loop every `interval`. No thread is involved; each
//! tick is an [`after`](crate::Host::after) callback on the loop thread.
//!
//! Stopping the poller clears its polling flag. A tick that was already
//! scheduled still fires once, sees the flag and does nothing. A task that
//! returns [`Error::Interrupted`] ends polling quietly; any other error
//! propagates out of the host loop and ends polling too.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::bus::{EventBus, EventObject};
use crate::controller::{Controller, ControllerBase, ControllerExt, ParentRef};
use crate::error::{Error, Result};
use crate::meta::{DeclareEvents, EventClassBuilder};
use crate::model::{Model, ModelExt, ModelHandle};

const TARGET: &str = "trellis_core::poller";

/// The work a [`Poller`] repeats.
pub trait PollTask: Send {
    /// Run one tick.
    ///
    /// Returning [`Error::Interrupted`] stops polling without failing.
    fn execute(&mut self) -> Result<()>;
}

impl<F> PollTask for F
where
    F: FnMut() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        self()
    }
}

/// A controller that runs a task at a fixed interval on the host loop.
pub struct Poller {
    base: ControllerBase,
    polling: AtomicBool,
    interval_ms: AtomicU64,
    ticks: AtomicU64,
    task: Mutex<Box<dyn PollTask>>,
    this: Weak<Poller>,
}

impl Poller {
    /// Interval used by [`Poller::with_default_interval`].
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    /// Create and attach a poller running `task` every `interval`.
    pub fn new(
        parent: impl Into<ParentRef>,
        interval: Duration,
        task: impl PollTask + 'static,
    ) -> Result<Arc<Self>> {
        let parent = parent.into();
        Arc::new_cyclic(|this| Self {
            base: ControllerBase::new::<Self>(parent),
            polling: AtomicBool::new(false),
            interval_ms: AtomicU64::new(duration_ms(interval)),
            ticks: AtomicU64::new(0),
            task: Mutex::new(Box::new(task)),
            this: this.clone(),
        })
        .attach()
    }

    /// Create and attach a poller running `task` every second.
    pub fn with_default_interval(
        parent: impl Into<ParentRef>,
        task: impl PollTask + 'static,
    ) -> Result<Arc<Self>> {
        Self::new(parent, Self::DEFAULT_INTERVAL, task)
    }

    /// A poller whose tick calls [`ModelExt::update`] on `model`.
    pub fn model_update<M: Model>(
        parent: impl Into<ParentRef>,
        interval: Duration,
        model: Arc<M>,
    ) -> Result<Arc<Self>> {
        let handle = ModelHandle::new(model.clone());
        let poller = Self::new(parent, interval, move || model.update())?;
        poller.base.set_model(Some(handle))?;
        Ok(poller)
    }

    /// The time between ticks.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Acquire))
    }

    /// Change the time between ticks. Takes effect when the next tick is
    /// scheduled.
    pub fn set_interval(&self, interval: Duration) {
        self.interval_ms.store(duration_ms(interval), Ordering::Release);
    }

    /// Whether the poller is polling.
    pub fn is_polling(&self) -> bool {
        self.polling.load(Ordering::Acquire)
    }

    /// Number of times the task has run.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    fn tick(&self) -> Result<()> {
        if !self.is_polling() {
            return Ok(());
        }
        self.ticks.fetch_add(1, Ordering::AcqRel);
        let outcome = self.task.lock().execute();
        match outcome {
            Ok(()) => {}
            Err(Error::Interrupted) => {
                tracing::debug!(target: TARGET, ticks = self.ticks(), "polling interrupted");
                self.polling.store(false, Ordering::Release);
                return Ok(());
            }
            Err(err) => {
                self.polling.store(false, Ordering::Release);
                return Err(err);
            }
        }
        if self.is_polling() {
            self.schedule_next()?;
        }
        Ok(())
    }

    fn schedule_next(&self) -> Result<()> {
        let host = self.base.host()?;
        let this = self.this.clone();
        host.schedule(self.interval(), move || match this.upgrade() {
            Some(poller) => poller.tick(),
            None => Ok(()),
        });
        Ok(())
    }
}

fn duration_ms(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

impl DeclareEvents for Poller {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ControllerBase::declare(class);
    }
}

impl EventObject for Poller {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl Controller for Poller {
    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn on_prepare(&self) -> Result<()> {
        Ok(())
    }

    fn on_start(&self) -> Result<()> {
        if self.polling.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(target: TARGET, interval = ?self.interval(), "polling started");
        self.tick()
    }

    fn on_stop(&self) -> Result<()> {
        if self.polling.swap(false, Ordering::AcqRel) {
            tracing::debug!(target: TARGET, ticks = self.ticks(), "polling stopped");
        }
        Ok(())
    }
}

impl fmt::Debug for Poller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Poller")
            .field("state", &self.base.state())
            .field("polling", &self.is_polling())
            .field("interval", &self.interval())
            .field("ticks", &self.ticks())
            .finish()
    }
}

static_assertions::assert_impl_all!(Poller: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::application::Application;
    use crate::event_loop::Host;
    use crate::model::ModelBase;

    #[test]
    fn start_runs_the_first_tick_immediately() {
        let app = Application::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let poller = Poller::new(&app, Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        poller.start().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(poller.is_polling());

        let check = calls.clone();
        app.host()
            .wait_until(&|| check.load(Ordering::SeqCst) >= 3)
            .unwrap();
        poller.stop().unwrap();
        assert!(!poller.is_polling());
    }

    #[test]
    fn stop_takes_effect_at_the_next_tick() {
        let app = Application::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let poller = Poller::new(&app, Duration::ZERO, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

        poller.start().unwrap();
        poller.stop().unwrap();
        app.host().pump().unwrap();
        app.host().pump().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn task_errors_propagate_and_end_polling() {
        let app = Application::new();
        let poller =
            Poller::new(&app, Duration::ZERO, || Err(Error::handler("sensor offline"))).unwrap();
        assert!(poller.start().is_err());
        assert!(!poller.is_polling());
        assert_eq!(poller.ticks(), 1);
    }

    #[test]
    fn interval_can_change_at_runtime() {
        let app = Application::new();
        let poller = Poller::with_default_interval(&app, || Ok(())).unwrap();
        assert_eq!(poller.interval(), Poller::DEFAULT_INTERVAL);
        poller.set_interval(Duration::from_millis(250));
        assert_eq!(poller.interval(), Duration::from_millis(250));
    }

    struct Clock {
        base: ModelBase<u32>,
    }

    impl DeclareEvents for Clock {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ModelBase::<u32>::declare(class);
        }
    }

    impl EventObject for Clock {
        fn event_bus(&self) -> &EventBus {
            self.base.bus()
        }
    }

    impl Model for Clock {
        fn on_update(&self) -> Result<()> {
            self.base.with_data(|ticks| *ticks += 1);
            Ok(())
        }
    }

    #[test]
    fn model_update_poller_updates_its_model() {
        let app = Application::new();
        let clock = Arc::new(Clock {
            base: ModelBase::new::<Clock>(0),
        });
        let poller = Poller::model_update(&app, Duration::from_millis(1), clock.clone()).unwrap();
        assert!(poller.base().require_model::<Clock>().is_ok());

        poller.start().unwrap();
        app.host()
            .wait_until(&|| clock.base.snapshot() >= 2)
            .unwrap();
        poller.stop().unwrap();
    }
}
