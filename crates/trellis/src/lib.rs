//! Trellis - a small MVC framework for desktop GUIs.
//!
//! This is the umbrella crate. It re-exports everything from
//! [`trellis_core`] and adds the stock components built on it: a list model
//! with its listbox, view sets, windows, modal dialogs, a progress dialog
//! for background commands, validated text entry and a log console.
//!
//! # Example
//!
//! ```no_run
//! use trellis::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let app = Application::new();
//!     app.run(|app| {
//!         let app = app.this().ok_or(Error::EventLoopExited)?;
//!         inform(&app, "Hello", "Hello, world!")?;
//!         app.stop().map(|_| ())
//!     })
//! }
//! ```

pub use trellis_core::*;

pub mod console;
pub mod dialog;
pub mod listbox;
pub mod prelude;
pub mod progress;
pub mod validation;
pub mod viewset;
pub mod widget;
pub mod window;
