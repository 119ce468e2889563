//! Prelude module for Trellis.
//!
//! ```
//! use trellis::prelude::*;
//! ```
//!
//! Brings in the core MVC types plus the stock components.

pub use trellis_core::prelude::*;

pub use crate::console::LogView;
pub use crate::dialog::{DialogButton, MessageBox, QuestionBox, ask_question, inform};
pub use crate::listbox::{ListItem, ListModel, Listbox, ListboxActions, ListboxController};
pub use crate::progress::{Progress, ProgressDialog};
pub use crate::validation::{
    DateValidator, FloatValidator, IntegerValidator, RangeValidator, Validator,
};
pub use crate::viewset::{ViewSet, ViewSetController};
pub use crate::widget::{Button, ProgressMode, TextField, ValidatingField};
pub use crate::window::{Modal, ModalExt, ModalWindow, Window, WindowController};
