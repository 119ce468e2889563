//! Headless widgets used by the built-in views.
//!
//! These hold the state a toolkit widget would display (a caption, a line of
//! text, a progress value) and track visibility. A toolkit binding mirrors
//! them onto real widgets; tests drive them directly, e.g. with
//! [`Button::click`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use trellis_core::{Result, Widget};

use crate::validation::{AcceptAll, Validator};

/// Visibility flags shared by the headless widgets.
#[derive(Debug, Default)]
struct Visibility {
    visible: AtomicBool,
    destroyed: AtomicBool,
}

impl Visibility {
    fn show(&self) {
        self.visible.store(true, Ordering::Release);
    }

    fn hide(&self) {
        self.visible.store(false, Ordering::Release);
    }

    fn destroy(&self) {
        self.visible.store(false, Ordering::Release);
        self.destroyed.store(true, Ordering::Release);
    }

    fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

type Command = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// A push button running a command when clicked.
pub struct Button {
    caption: String,
    is_default: bool,
    enabled: AtomicBool,
    command: Command,
    visibility: Visibility,
}

impl Button {
    /// A button labelled `caption` running `command`.
    pub fn new<F>(caption: impl Into<String>, command: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        Self {
            caption: caption.into(),
            is_default: false,
            enabled: AtomicBool::new(true),
            command: Box::new(command),
            visibility: Visibility::default(),
        }
    }

    /// Mark this button as the default action.
    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    /// The caption.
    pub fn caption(&self) -> &str {
        &self.caption
    }

    /// Whether this is the default action.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Whether the button accepts clicks.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable the button.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Whether the button is visible.
    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    /// Run the command. Returns `false` if the button is disabled or
    /// destroyed.
    pub fn click(&self) -> Result<bool> {
        if !self.is_enabled() || self.visibility.is_destroyed() {
            return Ok(false);
        }
        (self.command)()?;
        Ok(true)
    }
}

impl Widget for Button {
    fn show(&self) -> Result<()> {
        self.visibility.show();
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.visibility.hide();
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.visibility.destroy();
        Ok(())
    }
}

impl fmt::Debug for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Button")
            .field("caption", &self.caption)
            .field("default", &self.is_default)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

/// A line of text. Used both for read-only labels and editable entries.
#[derive(Debug, Default)]
pub struct TextField {
    text: Mutex<String>,
    visibility: Visibility,
}

impl TextField {
    /// A field holding `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            visibility: Visibility::default(),
        }
    }

    /// The current text.
    pub fn text(&self) -> String {
        self.text.lock().clone()
    }

    /// Replace the text.
    pub fn set_text(&self, text: impl Into<String>) {
        *self.text.lock() = text.into();
    }

    /// Whether the field is visible.
    pub fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }
}

impl Widget for TextField {
    fn show(&self) -> Result<()> {
        self.visibility.show();
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.visibility.hide();
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.visibility.destroy();
        Ok(())
    }
}

/// A text entry that only keeps input its validator accepts.
///
/// Every edit goes through the validator. Accepted input is stored in its
/// normalized form and becomes the field's [`value`](Self::value); rejected
/// input is discarded and the text reverts to the last accepted value.
pub struct ValidatingField {
    field: TextField,
    value: Mutex<String>,
    validator: Box<dyn Validator>,
}

impl ValidatingField {
    /// A field holding `value` that accepts any edit.
    ///
    /// The initial value is taken as is.
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            field: TextField::new(value.clone()),
            value: Mutex::new(value),
            validator: Box::new(AcceptAll),
        }
    }

    /// Check every edit with `validator`.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    /// The validator.
    pub fn validator(&self) -> &dyn Validator {
        self.validator.as_ref()
    }

    /// The last accepted value.
    pub fn value(&self) -> String {
        self.value.lock().clone()
    }

    /// The displayed text.
    pub fn text(&self) -> String {
        self.field.text()
    }

    /// Edit the text.
    ///
    /// Returns `false` if the validator rejected `text`, in which case the
    /// field shows the last accepted value again.
    pub fn set_text(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        let mut value = self.value.lock();
        match self.validator.validate(&text) {
            Some(accepted) => {
                self.field.set_text(accepted.clone());
                *value = accepted;
                true
            }
            None => {
                self.field.set_text(value.clone());
                false
            }
        }
    }

    /// Whether the field is visible.
    pub fn is_visible(&self) -> bool {
        self.field.is_visible()
    }
}

impl Widget for ValidatingField {
    fn show(&self) -> Result<()> {
        self.field.show()
    }

    fn hide(&self) -> Result<()> {
        self.field.hide()
    }

    fn destroy(&self) -> Result<()> {
        self.field.destroy()
    }
}

impl fmt::Debug for ValidatingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatingField")
            .field("value", &self.value())
            .field("text", &self.text())
            .finish()
    }
}

/// A list of text lines with an optional selection.
#[derive(Debug, Default)]
pub struct ListWidget {
    lines: Mutex<Vec<String>>,
    selection: Mutex<Option<usize>>,
    visibility: Visibility,
}

impl ListWidget {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line.
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Remove the line at `index`, if present.
    pub fn remove(&self, index: usize) -> Option<String> {
        let mut lines = self.lines.lock();
        if index >= lines.len() {
            return None;
        }
        let mut selection = self.selection.lock();
        match *selection {
            Some(selected) if selected == index => *selection = None,
            Some(selected) if selected > index => *selection = Some(selected - 1),
            _ => {}
        }
        Some(lines.remove(index))
    }

    /// Remove every line.
    pub fn clear(&self) {
        self.lines.lock().clear();
        *self.selection.lock() = None;
    }

    /// The lines, in order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Select the line at `index`. Returns `false` if there is no such line.
    pub fn select(&self, index: usize) -> bool {
        if index >= self.lines.lock().len() {
            return false;
        }
        *self.selection.lock() = Some(index);
        true
    }

    /// Clear the selection.
    pub fn deselect(&self) {
        *self.selection.lock() = None;
    }

    /// The selected index.
    pub fn selection(&self) -> Option<usize> {
        *self.selection.lock()
    }
}

impl Widget for ListWidget {
    fn show(&self) -> Result<()> {
        self.visibility.show();
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.visibility.hide();
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.visibility.destroy();
        Ok(())
    }
}

/// How a progress bar displays progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressMode {
    /// The bar tracks a value between zero and a maximum.
    Determinate,
    /// The bar only shows that work is going on.
    #[default]
    Indeterminate,
}

/// A progress bar.
#[derive(Debug)]
pub struct ProgressBar {
    mode: ProgressMode,
    value: Mutex<f64>,
    animating: AtomicBool,
    visibility: Visibility,
}

impl ProgressBar {
    /// A bar at zero.
    pub fn new(mode: ProgressMode) -> Self {
        Self {
            mode,
            value: Mutex::new(0.0),
            animating: AtomicBool::new(false),
            visibility: Visibility::default(),
        }
    }

    /// The display mode.
    pub fn mode(&self) -> ProgressMode {
        self.mode
    }

    /// The displayed value.
    pub fn value(&self) -> f64 {
        *self.value.lock()
    }

    /// Set the displayed value.
    pub fn set_value(&self, value: f64) {
        *self.value.lock() = value;
    }

    /// Whether an indeterminate bar is animating.
    pub fn is_animating(&self) -> bool {
        self.animating.load(Ordering::Acquire)
    }
}

impl Widget for ProgressBar {
    fn show(&self) -> Result<()> {
        self.visibility.show();
        if self.mode == ProgressMode::Indeterminate {
            self.animating.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn hide(&self) -> Result<()> {
        self.visibility.hide();
        self.animating.store(false, Ordering::Release);
        Ok(())
    }

    fn destroy(&self) -> Result<()> {
        self.visibility.destroy();
        self.animating.store(false, Ordering::Release);
        Ok(())
    }
}

static_assertions::assert_impl_all!(Button: Send, Sync);
static_assertions::assert_impl_all!(ValidatingField: Send, Sync);

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn disabled_and_destroyed_buttons_ignore_clicks() {
        let clicks = Arc::new(AtomicUsize::new(0));
        let counter = clicks.clone();
        let button = Button::new("Ok", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(button.click().unwrap());
        button.set_enabled(false);
        assert!(!button.click().unwrap());
        button.set_enabled(true);
        button.destroy().unwrap();
        assert!(!button.click().unwrap());
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rejected_edits_revert_to_the_last_valid_value() {
        use crate::validation::{IntegerValidator, RangeValidator};

        let port = ValidatingField::new("8080")
            .with_validator(RangeValidator::new().with_minimum(1u16, true));
        assert!(port.set_text(" 443"));
        assert_eq!(port.text(), "443");
        assert_eq!(port.value(), "443");

        assert!(!port.set_text("0"));
        assert_eq!(port.text(), "443");
        assert!(!port.set_text("http"));
        assert_eq!(port.value(), "443");

        let count = ValidatingField::new("").with_validator(IntegerValidator);
        assert!(!count.set_text("1e3"));
        assert_eq!(count.text(), "");
        assert!(count.set_text("-2"));
        assert_eq!(count.value(), "-2");
    }

    #[test]
    fn unvalidated_fields_accept_anything() {
        let note = ValidatingField::new("draft");
        assert!(note.set_text(""));
        assert_eq!(note.value(), "");
        note.show().unwrap();
        assert!(note.is_visible());
    }

    #[test]
    fn list_selection_follows_removals() {
        let list = ListWidget::new();
        for line in ["a", "b", "c"] {
            list.push(line);
        }
        assert!(list.select(2));
        list.remove(0);
        assert_eq!(list.selection(), Some(1));
        list.remove(1);
        assert_eq!(list.selection(), None);
        assert!(!list.select(5));
    }

    #[test]
    fn indeterminate_bar_animates_while_shown() {
        let bar = ProgressBar::new(ProgressMode::Indeterminate);
        bar.show().unwrap();
        assert!(bar.is_animating());
        bar.hide().unwrap();
        assert!(!bar.is_animating());

        let bar = ProgressBar::new(ProgressMode::Determinate);
        bar.show().unwrap();
        assert!(!bar.is_animating());
    }
}
