//! Logging and debugging facilities.
//!
//! Trellis is instrumented with `tracing`. Nothing is printed unless the
//! application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("trellis_core::lifecycle=debug")
//!     .init();
//! ```
//!
//! Lifecycle transitions log at `debug`, event delivery at `trace` and the
//! host loop's start and quit at `info`. The targets are listed in
//! [`targets`].
//!
//! [`ControllerTreeDebug`] renders the controllers of an application:
//!
//! ```
//! use trellis_core::Application;
//! use trellis_core::logging::ControllerTreeDebug;
//!
//! let app = Application::new();
//! let tree = ControllerTreeDebug::new().format(&app);
//! assert!(tree.contains("(no controllers)"));
//! ```

use std::fmt::Write as _;
use std::sync::Arc;

use crate::application::Application;
use crate::controller::Controller;

/// Target names for log filtering.
pub mod targets {
    /// Event dispatch.
    pub const BUS: &str = "trellis_core::bus";
    /// Event class construction.
    pub const META: &str = "trellis_core::meta";
    /// Controller and view state transitions.
    pub const LIFECYCLE: &str = "trellis_core::lifecycle";
    /// One-shot timers.
    pub const SCHEDULER: &str = "trellis_core::scheduler";
    /// The host event loop.
    pub const EVENT_LOOP: &str = "trellis_core::event_loop";
    /// Pollers.
    pub const POLLER: &str = "trellis_core::poller";
    /// The background worker pool.
    pub const WORKER: &str = "trellis_core::worker";
    /// The application root.
    pub const APPLICATION: &str = "trellis_core::application";
    /// List models and listbox controllers.
    pub const LISTBOX: &str = "trellis::listbox";
    /// View sets.
    pub const VIEWSET: &str = "trellis::viewset";
    /// Windows and modal windows.
    pub const WINDOW: &str = "trellis::window";
    /// Message and question dialogs.
    pub const DIALOG: &str = "trellis::dialog";
    /// Progress dialogs and their commands.
    pub const PROGRESS: &str = "trellis::progress";
}

/// Renders the controller tree of an application.
#[derive(Debug, Clone)]
pub struct ControllerTreeDebug {
    indent_size: usize,
    max_depth: Option<usize>,
    show_types: bool,
}

impl ControllerTreeDebug {
    /// A renderer showing types and the full depth.
    pub fn new() -> Self {
        Self {
            indent_size: 2,
            max_depth: None,
            show_types: true,
        }
    }

    /// Stop descending below `depth`.
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Whether to print each controller's type.
    pub fn show_types(mut self, show: bool) -> Self {
        self.show_types = show;
        self
    }

    /// Render the controllers registered with `app`.
    pub fn format(&self, app: &Application) -> String {
        let mut output = String::new();
        let controllers = app.controllers();
        let _ = writeln!(output, "{} ({} controllers)", app.name(), controllers.len());
        if controllers.is_empty() {
            let _ = writeln!(output, "  (no controllers)");
        }
        for (name, controller) in controllers {
            self.format_into(&name, &controller, 1, &mut output);
        }
        output
    }

    /// Render `controller` and its children.
    pub fn format_controller(&self, name: &str, controller: &Arc<dyn Controller>) -> String {
        let mut output = String::new();
        self.format_into(name, controller, 0, &mut output);
        output
    }

    fn format_into(
        &self,
        name: &str,
        controller: &Arc<dyn Controller>,
        depth: usize,
        output: &mut String,
    ) {
        if self.max_depth.is_some_and(|max| depth > max) {
            return;
        }
        let base = controller.base();
        let _ = write!(output, "{:indent$}{name}", "", indent = depth * self.indent_size);
        if self.show_types {
            let type_name = base.bus().type_name();
            let short = type_name.rsplit("::").next().unwrap_or(type_name);
            let _ = write!(output, " ({short})");
        }
        let _ = write!(output, " [{}]", base.state());
        if let Some(view) = base.view() {
            let _ = write!(output, " view={}", view.view().view_base().state());
        }
        output.push('\n');

        for (child_name, child) in controller.children() {
            self.format_into(&child_name, &child, depth + 1, output);
        }
    }
}

impl Default for ControllerTreeDebug {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, EventObject};
    use crate::controller::{ControllerBase, ControllerExt};
    use crate::error::Result;
    use crate::meta::{DeclareEvents, EventClassBuilder};

    struct Node {
        base: ControllerBase,
        children: Vec<(String, Arc<dyn Controller>)>,
    }

    impl DeclareEvents for Node {
        fn declare_events(class: &mut EventClassBuilder<Self>) {
            ControllerBase::declare(class);
        }
    }

    impl EventObject for Node {
        fn event_bus(&self) -> &EventBus {
            self.base.bus()
        }
    }

    impl Controller for Node {
        fn base(&self) -> &ControllerBase {
            &self.base
        }

        fn on_prepare(&self) -> Result<()> {
            Ok(())
        }

        fn children(&self) -> Vec<(String, Arc<dyn Controller>)> {
            self.children.clone()
        }
    }

    #[test]
    fn renders_nested_controllers() {
        let app = Application::builder().name("tree").build();
        let leaf: Arc<dyn Controller> = Arc::new(Node {
            base: ControllerBase::new::<Node>(&app),
            children: Vec::new(),
        });
        let root = Arc::new(Node {
            base: ControllerBase::new::<Node>(&app),
            children: vec![("leaf".to_string(), leaf)],
        })
        .attach()
        .unwrap();
        root.start().unwrap();
        app.add_controller("root", root).unwrap();

        let tree = ControllerTreeDebug::new().format(&app);
        assert!(tree.starts_with("tree (1 controllers)"));
        assert!(tree.contains("  root (Node) [started]"));
        assert!(tree.contains("    leaf (Node) [initialized]"));

        let shallow = ControllerTreeDebug::new().max_depth(1).format(&app);
        assert!(!shallow.contains("leaf"));
    }
}
