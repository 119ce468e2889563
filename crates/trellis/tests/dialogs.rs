//! Integration tests for modal dialogs driven from the host loop.

use std::sync::Arc;

use parking_lot::Mutex;
use trellis::dialog::{
    DialogButton, EMPTY_ANSWER, MessageBox, QuestionBox, ask_question, inform_with,
};
use trellis::prelude::*;
use trellis::window::MODAL_SHOWN;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Run `action` on the host loop whenever the application sees a modal of
/// type `M` come up.
fn on_modal<M, F>(app: &Arc<Application>, action: F)
where
    M: View,
    F: Fn(Arc<M>) -> Result<()> + Clone + Send + Sync + 'static,
{
    let host = app.host().clone();
    app.event_bus()
        .add_event_slot(
            MODAL_SHOWN,
            Arc::new(move |event: &Event| {
                let dialog = event.require_payload::<ViewHandle>()?.downcast::<M>()?;
                let action = action.clone();
                host.invoke(move || action(dialog));
                Ok(())
            }),
        )
        .unwrap();
}

#[test]
fn message_box_returns_the_clicked_value() {
    init_tracing();
    let app = Application::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    let journal = order.clone();
    on_modal::<MessageBox<&'static str>, _>(&app, move |dialog| {
        journal.lock().push("clicked");
        assert!(!dialog.view_base().is_closed());
        dialog.button("retry")?.click().map(|_| ())
    });

    let buttons = vec![
        DialogButton::new("abort", "Abort", "abort").with_default(true),
        DialogButton::new("retry", "Retry", "retry"),
    ];
    let response = inform_with(&app, "Disk", "Disk not ready", buttons).unwrap();
    order.lock().push("returned");

    assert_eq!(response, Some("retry"));
    assert_eq!(*order.lock(), vec!["clicked", "returned"]);
}

#[test]
fn closing_a_message_box_keeps_the_default() {
    let app = Application::new();
    on_modal::<MessageBox<bool>, _>(&app, |dialog| dialog.close().map(|_| ()));

    let buttons = vec![
        DialogButton::new("yes", "Yes", true),
        DialogButton::new("no", "No", false).with_default(true),
    ];
    assert_eq!(inform_with(&app, "Quit", "Really quit?", buttons).unwrap(), Some(false));
}

#[test]
fn question_box_insists_on_an_answer() {
    init_tracing();
    let app = Application::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();
    on_modal::<QuestionBox, _>(&app, move |dialog| {
        let ok = dialog.view_base().widget_as::<Button>("ok")?;
        ok.click()?;
        seen.lock().push(dialog.error());
        dialog.set_answer("Grace");
        ok.click().map(|_| ())
    });

    let answer = ask_question(&app, "Who wrote the first compiler?", None).unwrap();
    assert_eq!(answer.as_deref(), Some("Grace"));
    assert_eq!(*errors.lock(), vec![Some(EMPTY_ANSWER.to_string())]);
}

#[test]
fn cancelled_question_returns_the_default() {
    let app = Application::new();
    on_modal::<QuestionBox, _>(&app, |dialog| {
        dialog.set_answer("ignored");
        dialog.view_base().widget_as::<Button>("cancel")?.click().map(|_| ())
    });

    let answer = ask_question(&app, "Port?", Some("8080")).unwrap();
    assert_eq!(answer.as_deref(), Some("8080"));
}

#[test]
fn dialogs_report_to_controller_parents() {
    init_tracing();
    let app = Application::new();
    let window = Window::with_content("Main", |_| Ok(()));
    let controller = WindowController::new(&app, window).unwrap();
    controller.start().unwrap();

    let host = app.host().clone();
    controller
        .event_bus()
        .add_event_slot(
            MODAL_SHOWN,
            Arc::new(move |event: &Event| {
                let dialog = event
                    .require_payload::<ViewHandle>()?
                    .downcast::<MessageBox<bool>>()?;
                host.invoke(move || dialog.button("ok")?.click().map(|_| ()));
                Ok(())
            }),
        )
        .unwrap();

    let dialog = MessageBox::new("Saved", "All changes saved", vec![DialogButton::ok()]);
    let response = trellis::dialog::run_modal(&controller, &dialog).unwrap();
    assert_eq!(response, Some(true));
    assert!(dialog.view_base().is_closed());
}
