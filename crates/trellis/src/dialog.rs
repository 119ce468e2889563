//! Modal message and question dialogs.
//!
//! [`inform`] and [`ask_question`] build a dialog, show it modally on the
//! host loop of the parent's application, and return its response once it
//! closes. While a dialog is up it triggers
//! [`MODAL_SHOWN`](crate::window::MODAL_SHOWN) to its parent, which is how a
//! parent (or a test) can reach the dialog's widgets.

use std::fmt;
use std::sync::{Arc, Weak};

use trellis_core::{
    DeclareEvents, Error, EventBus, EventClassBuilder, EventObject, ObserverRef, ParentRef, Result,
    View, ViewBase, ViewExt, Widget,
};

use crate::widget::{Button, TextField};
use crate::window::{Modal, ModalExt, ModalWindow};

const TARGET: &str = trellis_core::logging::targets::DIALOG;

/// Shown under the answer of a [`QuestionBox`] left empty.
pub const EMPTY_ANSWER: &str = "Please provide an answer";

/// A button offered by a [`MessageBox`].
#[derive(Debug, Clone, PartialEq)]
pub struct DialogButton<V> {
    /// Widget name of the button.
    pub id: String,
    /// Text on the button.
    pub caption: String,
    /// Response given when the button is clicked.
    pub value: V,
    /// Whether `value` is the response if the dialog closes without a click.
    pub default: bool,
}

impl<V> DialogButton<V> {
    /// A button named `id`, labelled `caption`, answering `value`.
    pub fn new(id: impl Into<String>, caption: impl Into<String>, value: V) -> Self {
        Self {
            id: id.into(),
            caption: caption.into(),
            value,
            default: false,
        }
    }

    /// Make this the default button.
    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }
}

impl DialogButton<bool> {
    /// The single "Ok" button of an information box.
    pub fn ok() -> Self {
        Self::new("ok", "Ok", true)
    }
}

/// A modal box showing a message and a row of buttons.
///
/// Clicking a button sets the response to its value and closes the box.
/// Without buttons the box can only be closed directly.
pub struct MessageBox<V> {
    modal: ModalWindow<V>,
    message: Arc<TextField>,
    buttons: Vec<DialogButton<V>>,
    this: Weak<Self>,
}

impl<V: Clone + Send + Sync + 'static> MessageBox<V> {
    /// A box titled `title` showing `message` above `buttons`.
    ///
    /// The default button's value is the response until another button is
    /// clicked.
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        buttons: Vec<DialogButton<V>>,
    ) -> Arc<Self> {
        let title = title.into();
        let message = message.into();
        Arc::new_cyclic(|this| Self {
            modal: ModalWindow::new::<Self>(title),
            message: Arc::new(TextField::new(message)),
            buttons,
            this: this.clone(),
        })
    }

    /// The message text.
    pub fn message(&self) -> String {
        self.message.text()
    }

    /// Replace the message text.
    pub fn set_message(&self, message: impl Into<String>) {
        self.message.set_text(message);
    }

    /// The buttons offered.
    pub fn buttons(&self) -> &[DialogButton<V>] {
        &self.buttons
    }

    /// The button widget registered under `id`. Available once prepared.
    pub fn button(&self, id: &str) -> Result<Arc<Button>> {
        self.view_base().widget_as::<Button>(id)
    }

    /// Respond with `value` and close.
    pub fn process_click(&self, value: V) -> Result<bool> {
        self.respond(value)
    }

    fn make_button(&self, button: &DialogButton<V>) -> Button {
        let this = self.this.clone();
        let value = button.value.clone();
        Button::new(button.caption.clone(), move || match this.upgrade() {
            Some(dialog) => dialog.process_click(value.clone()).map(|_| ()),
            None => Ok(()),
        })
        .with_default(button.default)
    }
}

impl<V: Clone + Send + Sync + 'static> DeclareEvents for MessageBox<V> {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ModalWindow::<V>::declare(class);
    }
}

impl<V: Clone + Send + Sync + 'static> EventObject for MessageBox<V> {
    fn event_bus(&self) -> &EventBus {
        self.modal.view_base().bus()
    }
}

impl<V: Clone + Send + Sync + 'static> View for MessageBox<V> {
    fn view_base(&self) -> &ViewBase {
        self.modal.view_base()
    }

    fn on_prepare(&self) -> Result<()> {
        let base = self.view_base();
        base.add_widget("message", self.message.clone())?;
        for button in &self.buttons {
            if button.default {
                self.modal.set_response(Some(button.value.clone()));
            }
            base.add_widget(&button.id, Arc::new(self.make_button(button)))?;
        }
        Ok(())
    }
}

impl<V: Clone + Send + Sync + 'static> Modal for MessageBox<V> {
    type Response = V;

    fn modal_base(&self) -> &ModalWindow<V> {
        &self.modal
    }
}

impl<V> fmt::Debug for MessageBox<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBox")
            .field("modal", &self.modal)
            .field("message", &self.message.text())
            .field("buttons", &self.buttons.len())
            .finish()
    }
}

/// A modal box asking for a line of text.
///
/// "Ok" accepts a non-empty answer; an empty one shows [`EMPTY_ANSWER`]
/// and keeps the box open. "Cancel" closes the box and leaves the response
/// at its default.
pub struct QuestionBox {
    modal: ModalWindow<String>,
    question: Arc<TextField>,
    answer: Arc<TextField>,
    error: Arc<TextField>,
    this: Weak<Self>,
}

impl QuestionBox {
    /// A box asking `question`, with `default` as both the initial answer
    /// and the response if the box is cancelled.
    pub fn new(question: impl Into<String>, default: Option<&str>) -> Arc<Self> {
        let question = question.into();
        let dialog = Arc::new_cyclic(|this| Self {
            modal: ModalWindow::new::<Self>("Question"),
            question: Arc::new(TextField::new(question)),
            answer: Arc::new(TextField::new(default.unwrap_or_default())),
            error: Arc::new(TextField::default()),
            this: this.clone(),
        });
        dialog.modal.set_response(default.map(str::to_string));
        dialog
    }

    /// The question.
    pub fn question(&self) -> String {
        self.question.text()
    }

    /// Replace the question.
    pub fn set_question(&self, question: impl Into<String>) {
        self.question.set_text(question);
    }

    /// The answer typed so far.
    pub fn answer(&self) -> String {
        self.answer.text()
    }

    /// Type an answer.
    pub fn set_answer(&self, answer: impl Into<String>) {
        self.answer.set_text(answer);
    }

    /// The validation message, if one is showing.
    pub fn error(&self) -> Option<String> {
        self.error.is_visible().then(|| self.error.text())
    }

    /// Whether the current answer can be accepted. Shows the validation
    /// message if not.
    pub fn validate(&self) -> Result<bool> {
        if self.answer().is_empty() {
            self.error.set_text(EMPTY_ANSWER);
            self.error.show()?;
            return Ok(false);
        }
        self.error.hide()?;
        Ok(true)
    }

    /// Accept the answer and close, if it validates.
    pub fn ok(&self) -> Result<bool> {
        if !self.validate()? {
            tracing::debug!(target: TARGET, "empty answer rejected");
            return Ok(false);
        }
        self.respond(self.answer())
    }

    /// Close without changing the response.
    pub fn cancel(&self) -> Result<bool> {
        self.close()
    }

    fn make_button(&self, caption: &str, action: fn(&Self) -> Result<bool>) -> Button {
        let this = self.this.clone();
        Button::new(caption, move || match this.upgrade() {
            Some(dialog) => action(&dialog).map(|_| ()),
            None => Ok(()),
        })
    }
}

impl DeclareEvents for QuestionBox {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ModalWindow::<String>::declare(class);
    }
}

impl EventObject for QuestionBox {
    fn event_bus(&self) -> &EventBus {
        self.modal.view_base().bus()
    }
}

impl View for QuestionBox {
    fn view_base(&self) -> &ViewBase {
        self.modal.view_base()
    }

    fn on_prepare(&self) -> Result<()> {
        let base = self.view_base();
        base.add_widget("question", self.question.clone())?;
        base.add_widget("answer", self.answer.clone())?;
        base.add_widget("validate", self.error.clone())?;
        base.add_widget("cancel", Arc::new(self.make_button("Cancel", Self::cancel)))?;
        base.add_widget(
            "ok",
            Arc::new(self.make_button("Ok", Self::ok).with_default(true)),
        )?;
        Ok(())
    }

    fn on_show(&self) -> Result<()> {
        if self.error.text().is_empty() {
            self.error.hide()?;
        }
        Ok(())
    }
}

impl Modal for QuestionBox {
    type Response = String;

    fn modal_base(&self) -> &ModalWindow<String> {
        &self.modal
    }
}

impl fmt::Debug for QuestionBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestionBox")
            .field("modal", &self.modal)
            .field("question", &self.question.text())
            .finish()
    }
}

/// Show `dialog` modally on behalf of `parent` and return its response.
///
/// The parent observes the dialog while it is up, so it hears
/// [`MODAL_SHOWN`](crate::window::MODAL_SHOWN).
pub fn run_modal<M: Modal>(
    parent: impl Into<ParentRef>,
    dialog: &Arc<M>,
) -> Result<Option<M::Response>> {
    let parent = parent.into();
    let detached = || Error::Detached {
        type_name: std::any::type_name::<M>(),
    };
    let owner = parent.upgrade().ok_or_else(detached)?;
    let app = parent.application().ok_or_else(detached)?;
    dialog
        .event_bus()
        .add_observer(ObserverRef::from_weak(Arc::downgrade(&owner))?);
    dialog.show_modal(app.host().as_ref())
}

/// Show an information box with a single "Ok" button.
///
/// Returns `Some(true)` if "Ok" was clicked and `None` if the box was closed
/// another way.
pub fn inform(
    parent: impl Into<ParentRef>,
    title: &str,
    message: &str,
) -> Result<Option<bool>> {
    inform_with(parent, title, message, vec![DialogButton::ok()])
}

/// Show a message box with `buttons` and return the value of the one clicked.
pub fn inform_with<V: Clone + Send + Sync + 'static>(
    parent: impl Into<ParentRef>,
    title: &str,
    message: &str,
    buttons: Vec<DialogButton<V>>,
) -> Result<Option<V>> {
    let dialog = MessageBox::new(title, message, buttons);
    run_modal(parent, &dialog)
}

/// Ask `question` and return the answer.
///
/// Returns `default` if the box is cancelled.
pub fn ask_question(
    parent: impl Into<ParentRef>,
    question: &str,
    default: Option<&str>,
) -> Result<Option<String>> {
    let dialog = QuestionBox::new(question, default);
    run_modal(parent, &dialog)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_button_presets_the_response() {
        let dialog = MessageBox::new(
            "Save",
            "Save changes?",
            vec![
                DialogButton::new("yes", "Yes", 1),
                DialogButton::new("no", "No", 0).with_default(true),
            ],
        );
        dialog.prepare().unwrap();
        assert_eq!(dialog.response(), Some(0));
        assert!(dialog.button("yes").unwrap().click().unwrap());
        assert_eq!(dialog.response(), Some(1));
        assert!(dialog.view_base().is_closed());
    }

    #[test]
    fn duplicate_button_ids_are_rejected() {
        let dialog = MessageBox::new(
            "Oops",
            "Two of a kind",
            vec![DialogButton::ok(), DialogButton::ok()],
        );
        assert!(matches!(
            dialog.prepare(),
            Err(Error::DuplicateRegistration { .. })
        ));
    }

    #[test]
    fn empty_answers_are_rejected() {
        let dialog = QuestionBox::new("Name?", None);
        dialog.show().unwrap();
        assert_eq!(dialog.error(), None);

        assert!(!dialog.ok().unwrap());
        assert_eq!(dialog.error().as_deref(), Some(EMPTY_ANSWER));
        assert!(!dialog.view_base().is_closed());

        dialog.set_answer("Ada");
        assert!(dialog.ok().unwrap());
        assert_eq!(dialog.response().as_deref(), Some("Ada"));
        assert_eq!(dialog.error(), None);
    }

    #[test]
    fn cancel_keeps_the_default() {
        let dialog = QuestionBox::new("Colour?", Some("blue"));
        dialog.show().unwrap();
        assert_eq!(dialog.answer(), "blue");
        dialog.set_answer("red");
        assert!(dialog.cancel().unwrap());
        assert_eq!(dialog.response().as_deref(), Some("blue"));
    }
}
