//! A widget collecting log output.
//!
//! [`LogView`] keeps the text written to it. [`LogView::make_writer`] hands
//! out a [`LogWriter`] that a `tracing-subscriber` formatting layer can write
//! to, so an application can show its own log:
//!
//! ```
//! use trellis::console::LogView;
//!
//! let log = LogView::new();
//! let subscriber = tracing_subscriber::fmt()
//!     .with_writer(log.make_writer())
//!     .with_ansi(false)
//!     .without_time()
//!     .finish();
//! tracing::subscriber::with_default(subscriber, || tracing::info!("cycle 0"));
//! assert!(log.text().contains("cycle 0"));
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing_subscriber::fmt::MakeWriter;
use trellis_core::{Result, Widget};

#[derive(Debug, Default)]
struct Buffer {
    text: Mutex<String>,
    visible: AtomicBool,
    destroyed: AtomicBool,
}

/// A read-only text area that log lines are appended to.
///
/// Writes after the widget is destroyed are dropped.
#[derive(Default)]
pub struct LogView {
    buffer: Arc<Buffer>,
}

impl LogView {
    /// An empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message`.
    pub fn write(&self, message: &str) {
        if self.buffer.destroyed.load(Ordering::Acquire) {
            return;
        }
        self.buffer.text.lock().push_str(message);
    }

    /// Remove every message.
    pub fn clear(&self) {
        self.buffer.text.lock().clear();
    }

    /// Everything written so far.
    pub fn text(&self) -> String {
        self.buffer.text.lock().clone()
    }

    /// The written text, split into lines.
    pub fn lines(&self) -> Vec<String> {
        self.buffer.text.lock().lines().map(str::to_owned).collect()
    }

    /// Whether the log is visible.
    pub fn is_visible(&self) -> bool {
        self.buffer.visible.load(Ordering::Acquire)
    }

    /// A writer appending to this log, for `tracing_subscriber::fmt`.
    pub fn make_writer(&self) -> LogWriter {
        LogWriter {
            view: LogView {
                buffer: self.buffer.clone(),
            },
        }
    }
}

impl Widget for LogView {
    fn show(&self) -> Result<()> {
        self.buffer.visible.store(true, Ordering::Release);
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.buffer.visible.store(false, Ordering::Release);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.buffer.visible.store(false, Ordering::Release);
        self.buffer.destroyed.store(true, Ordering::Release);
        Ok(())
    }
}

impl fmt::Debug for LogView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogView")
            .field("len", &self.buffer.text.lock().len())
            .field("visible", &self.is_visible())
            .finish()
    }
}

/// Writes into a [`LogView`]. Invalid UTF-8 is replaced.
#[derive(Debug)]
pub struct LogWriter {
    view: LogView,
}

impl Clone for LogWriter {
    fn clone(&self) -> Self {
        self.view.make_writer()
    }
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.view.write(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

static_assertions::assert_impl_all!(LogView: Send, Sync);
static_assertions::assert_impl_all!(LogWriter: Send, Sync);
