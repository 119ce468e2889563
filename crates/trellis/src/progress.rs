//! A dialog that runs a command on the worker pool and shows its progress.
//!
//! The command receives the dialog's [`Progress`] and a
//! [`CancellationToken`]. Its close button stays disabled until the command
//! returns. Closing the dialog early cancels the token; the command keeps
//! running until it notices, and its result is dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use trellis_core::{
    CancellationToken, DeclareEvents, Error, EventBus, EventClassBuilder, EventObject, Guarded,
    ParentRef, Result, View, ViewBase, ViewExt, Widget,
};

use crate::widget::{Button, ProgressBar, ProgressMode, TextField};

const TARGET: &str = trellis_core::logging::targets::PROGRESS;

/// The maximum a new [`Progress`] starts with.
pub const DEFAULT_MAXIMUM: f64 = 100.0;

#[derive(Debug)]
struct Counter {
    value: f64,
    maximum: f64,
}

/// Progress shared between a running command and its dialog.
pub struct Progress {
    counter: Guarded<Counter>,
    bar: Arc<ProgressBar>,
}

impl Progress {
    fn new(bar: Arc<ProgressBar>) -> Self {
        Self {
            counter: Guarded::new(Counter {
                value: 0.0,
                maximum: DEFAULT_MAXIMUM,
            }),
            bar,
        }
    }

    /// The current progress.
    pub fn value(&self) -> f64 {
        self.counter.with(|counter| counter.value)
    }

    /// Set the current progress.
    pub fn set_value(&self, value: f64) {
        self.counter.with(|counter| {
            counter.value = value;
            self.bar.set_value(value);
        });
    }

    /// The value at which the work is complete.
    pub fn maximum(&self) -> f64 {
        self.counter.with(|counter| counter.maximum)
    }

    /// Change the value at which the work is complete.
    pub fn set_maximum(&self, maximum: f64) {
        self.counter.with(|counter| counter.maximum = maximum);
    }

    /// Advance by `step`, stopping at the maximum. Returns the new value.
    pub fn increase(&self, step: f64) -> f64 {
        self.counter.with(|counter| {
            counter.value = (counter.value + step).min(counter.maximum);
            self.bar.set_value(counter.value);
            counter.value
        })
    }

    /// Jump to the maximum.
    pub fn complete(&self) {
        self.counter.with(|counter| {
            counter.value = counter.maximum;
            self.bar.set_value(counter.value);
        });
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.counter.with(|counter| {
            f.debug_struct("Progress")
                .field("value", &counter.value)
                .field("maximum", &counter.maximum)
                .finish()
        })
    }
}

/// A progress dialog running one command producing a `T`.
pub struct ProgressDialog<T> {
    base: ViewBase,
    title: Arc<TextField>,
    bar: Arc<ProgressBar>,
    progress: Arc<Progress>,
    close_button: Arc<Button>,
    auto_close: AtomicBool,
    running: AtomicBool,
    finished: AtomicBool,
    token: Mutex<Option<CancellationToken>>,
    result: Mutex<Option<T>>,
}

impl<T: Send + 'static> ProgressDialog<T> {
    /// A dialog titled `title` whose bar runs in `mode`.
    ///
    /// The close button stays disabled while a command runs.
    pub fn new(title: impl Into<String>, mode: ProgressMode) -> Arc<Self> {
        let title = title.into();
        Arc::new_cyclic(|this: &Weak<Self>| {
            let bar = Arc::new(ProgressBar::new(mode));
            let owner = this.clone();
            let close_button = Button::new("Close", move || match owner.upgrade() {
                Some(dialog) => dialog.close().map(|_| ()),
                None => Ok(()),
            })
            .with_default(true);
            Self {
                base: ViewBase::new::<Self>(),
                title: Arc::new(TextField::new(title)),
                progress: Arc::new(Progress::new(bar.clone())),
                bar,
                close_button: Arc::new(close_button),
                auto_close: AtomicBool::new(false),
                running: AtomicBool::new(false),
                finished: AtomicBool::new(false),
                token: Mutex::new(None),
                result: Mutex::new(None),
            }
        })
    }

    /// The progress the command reports into.
    pub fn progress(&self) -> &Arc<Progress> {
        &self.progress
    }

    /// How the bar displays progress.
    pub fn mode(&self) -> ProgressMode {
        self.bar.mode()
    }

    /// The bar widget.
    pub fn bar(&self) -> &Arc<ProgressBar> {
        &self.bar
    }

    /// The close button widget.
    pub fn close_button(&self) -> &Arc<Button> {
        &self.close_button
    }

    /// Whether the dialog closes itself once the command returns.
    pub fn auto_close(&self) -> bool {
        self.auto_close.load(Ordering::Acquire)
    }

    /// Change [`auto_close`](Self::auto_close). Ignored while running.
    pub fn set_auto_close(&self, auto_close: bool) {
        if !self.is_running() {
            self.auto_close.store(auto_close, Ordering::Release);
        }
    }

    /// Whether the command is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the command has returned.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Take the command's result, if it returned while the dialog was open.
    pub fn take_result(&self) -> Option<T> {
        self.result.lock().take()
    }

    /// Show the dialog and run `command` on the application's worker pool.
    ///
    /// With `block`, pumps the host loop until the command returns or the
    /// dialog is closed. Returns `false` if a command is already running or
    /// the dialog is closed.
    pub fn start<F>(
        self: &Arc<Self>,
        parent: impl Into<ParentRef>,
        command: F,
        block: bool,
    ) -> Result<bool>
    where
        F: FnOnce(&Progress, &CancellationToken) -> T + Send + 'static,
    {
        let app = parent.into().application().ok_or(Error::Detached {
            type_name: std::any::type_name::<Self>(),
        })?;
        if self.base.is_closed() || self.running.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        self.finished.store(false, Ordering::Release);
        self.close_button.set_enabled(false);
        self.show()?;

        let host = app.host().clone();
        let progress = self.progress.clone();
        let dialog = Arc::downgrade(self);
        let token = app.worker()?.spawn_with_callback(
            host.clone(),
            move |token| command(&progress, &token),
            move |value| match dialog.upgrade() {
                Some(dialog) => dialog.finish(value),
                None => Ok(()),
            },
        );
        *self.token.lock() = Some(token);
        tracing::debug!(target: TARGET, title = %self.title.text(), block, "command started");

        if block {
            host.wait_until(&|| self.is_finished() || self.base.is_closed())?;
        }
        Ok(true)
    }

    fn finish(&self, value: T) -> Result<()> {
        self.running.store(false, Ordering::Release);
        self.close_button.set_enabled(true);
        if self.base.is_closed() {
            tracing::debug!(target: TARGET, "dialog closed before the command returned");
        } else {
            *self.result.lock() = Some(value);
        }
        self.finished.store(true, Ordering::Release);
        if self.auto_close() && !self.base.is_closed() {
            self.close()?;
        }
        Ok(())
    }
}

impl<T: Send + 'static> DeclareEvents for ProgressDialog<T> {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ViewBase::declare(class);
    }
}

impl<T: Send + 'static> EventObject for ProgressDialog<T> {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl<T: Send + 'static> View for ProgressDialog<T> {
    fn view_base(&self) -> &ViewBase {
        &self.base
    }

    fn on_prepare(&self) -> Result<()> {
        self.base.add_widget("title", self.title.clone())?;
        self.base.add_widget("progress", self.bar.clone())?;
        self.base.add_widget("close", self.close_button.clone())?;
        Ok(())
    }

    fn on_close(&self) -> Result<()> {
        if let Some(token) = self.token.lock().as_ref() {
            token.cancel();
        }
        self.bar.hide()
    }
}

impl<T> fmt::Debug for ProgressDialog<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressDialog")
            .field("state", &self.base.state())
            .field("progress", &self.progress)
            .field("running", &self.running.load(Ordering::Acquire))
            .finish()
    }
}
