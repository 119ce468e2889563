//! The cooperative host event loop.
//!
//! Everything UI-side happens on one thread: the thread that calls
//! [`Host::run`], [`Host::pump`] or [`Host::wait_until`]. Timers scheduled with
//! [`Host::after`] and tasks posted with [`Host::post`] (from any thread) run
//! there, one at a time.
//!
//! [`Host`] is the seam to a real toolkit: a toolkit binding implements it on
//! top of its own main loop. [`EventLoop`] is the in-crate implementation used
//! by headless applications and tests.
//!
//! # Nested loops
//!
//! Callbacks run without any loop lock held, so a callback may itself block in
//! [`Host::wait_until`]. That is how a modal window keeps the application
//! responsive while its caller waits for it to close.
//!
//! # Errors
//!
//! A callback returning an error stops the current pump; the error propagates
//! out of `pump`, `wait_until` or `run`. Callbacks not yet run stay queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::scheduler::{Scheduler, TimerId};
use crate::task::{TaskId, TaskQueue};

/// A callback run by the host loop.
pub type HostCallback = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// The host loop primitives the framework depends on.
pub trait Host: Send + Sync {
    /// Run `callback` on the loop thread once `delay` has elapsed.
    fn after(&self, delay: Duration, callback: HostCallback) -> TimerId;

    /// Cancel a pending [`after`](Self::after) callback.
    fn cancel(&self, id: TimerId) -> bool;

    /// Run `task` on the loop thread at the next pump. Callable from any thread.
    fn post(&self, task: HostCallback) -> TaskId;

    /// Run everything that is due now. Returns the number of callbacks run.
    fn pump(&self) -> Result<usize>;

    /// Pump until `done` returns true.
    ///
    /// Fails with [`Error::EventLoopExited`] if the loop is asked to quit
    /// before `done` holds.
    fn wait_until(&self, done: &dyn Fn() -> bool) -> Result<()>;

    /// Pump until [`quit`](Self::quit) is called.
    fn run(&self) -> Result<()>;

    /// Ask the loop to exit.
    fn quit(&self);

    /// Whether [`quit`](Self::quit) has been called.
    fn is_quitting(&self) -> bool;
}

impl dyn Host {
    /// Schedule a closure with [`Host::after`].
    pub fn schedule<F>(&self, delay: Duration, f: F) -> TimerId
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.after(delay, Box::new(f))
    }

    /// Post a closure with [`Host::post`].
    pub fn invoke<F>(&self, f: F) -> TaskId
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.post(Box::new(f))
    }
}

/// Tuning for [`EventLoop`].
#[derive(Debug, Clone)]
pub struct EventLoopConfig {
    /// Maximum number of posted tasks run per pump.
    pub task_batch_size: usize,
    /// Longest time the loop sleeps between pumps while idle.
    pub idle_wait: Duration,
}

impl Default for EventLoopConfig {
    fn default() -> Self {
        Self {
            task_batch_size: 64,
            idle_wait: Duration::from_millis(10),
        }
    }
}

/// The in-crate cooperative [`Host`].
pub struct EventLoop {
    config: EventLoopConfig,
    scheduler: Mutex<Scheduler>,
    tasks: Mutex<TaskQueue>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    quitting: AtomicBool,
}

impl EventLoop {
    /// Create a loop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EventLoopConfig::default())
    }

    /// Create a loop with `config`.
    pub fn with_config(config: EventLoopConfig) -> Self {
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();
        Self {
            config,
            scheduler: Mutex::new(Scheduler::new()),
            tasks: Mutex::new(TaskQueue::new()),
            wake_tx,
            wake_rx,
            quitting: AtomicBool::new(false),
        }
    }

    /// The loop configuration.
    pub fn config(&self) -> &EventLoopConfig {
        &self.config
    }

    /// Cancel a posted task that has not run yet.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        self.tasks.lock().cancel(id)
    }

    /// Number of pending timers and tasks.
    pub fn pending_count(&self) -> usize {
        self.scheduler.lock().pending_count() + self.tasks.lock().pending_count()
    }

    /// Block until woken by a post or quit, a timer comes due, or the idle
    /// wait elapses.
    fn idle(&self) {
        let mut wait = self.config.idle_wait;
        if let Some(next) = self.scheduler.lock().time_until_next() {
            wait = wait.min(next);
        }
        if self.tasks.lock().pending_count() > 0 || wait.is_zero() {
            return;
        }
        let _ = self.wake_rx.recv_timeout(wait);
    }

    fn drain_wakeups(&self) {
        while self.wake_rx.try_recv().is_ok() {}
    }
}

impl Host for EventLoop {
    fn after(&self, delay: Duration, callback: HostCallback) -> TimerId {
        let id = self.scheduler.lock().schedule(delay, callback);
        tracing::trace!(target: "trellis_core::event_loop", ?id, ?delay, "timer scheduled");
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.scheduler.lock().cancel(id)
    }

    fn post(&self, task: HostCallback) -> TaskId {
        let id = self.tasks.lock().post(task);
        let _ = self.wake_tx.send(());
        id
    }

    #[tracing::instrument(skip(self), target = "trellis_core::event_loop", level = "trace")]
    fn pump(&self) -> Result<usize> {
        self.drain_wakeups();
        let now = Instant::now();
        let watermark = self.scheduler.lock().watermark();
        let mut count = 0;

        loop {
            let next = self.scheduler.lock().pop_ready(now, watermark);
            match next {
                Some(callback) => {
                    count += 1;
                    callback()?;
                }
                None => break,
            }
        }

        for _ in 0..self.config.task_batch_size {
            let next = self.tasks.lock().pop();
            match next {
                Some(task) => {
                    count += 1;
                    task()?;
                }
                None => break,
            }
        }

        Ok(count)
    }

    fn wait_until(&self, done: &dyn Fn() -> bool) -> Result<()> {
        loop {
            if done() {
                return Ok(());
            }
            if self.is_quitting() {
                return Err(Error::EventLoopExited);
            }
            self.pump()?;
            if done() {
                return Ok(());
            }
            self.idle();
        }
    }

    fn run(&self) -> Result<()> {
        tracing::info!(target: "trellis_core::event_loop", "event loop running");
        while !self.is_quitting() {
            self.pump()?;
            if self.is_quitting() {
                break;
            }
            self.idle();
        }
        tracing::info!(target: "trellis_core::event_loop", "event loop exited");
        Ok(())
    }

    fn quit(&self) {
        if !self.quitting.swap(true, Ordering::SeqCst) {
            tracing::info!(target: "trellis_core::event_loop", "quit requested");
        }
        let _ = self.wake_tx.send(());
    }

    fn is_quitting(&self) -> bool {
        self.quitting.load(Ordering::SeqCst)
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.pending_count())
            .field("quitting", &self.is_quitting())
            .finish()
    }
}

static_assertions::assert_impl_all!(EventLoop: Send, Sync);
