//! A list model and the listbox that displays it.
//!
//! [`ListModel`] is an ordered set of items that announces changes on its
//! event bus. [`Listbox`] mirrors those changes into a [`ListWidget`] and
//! turns user requests into events for its controller.
//! [`ListboxController`] routes those requests to [`ListboxActions`].
//!
//! Event flow:
//!
//! ```text
//! Listbox --add_item / edit_item / delete_item / clear_list--> ListboxController
//! ListModel --item_added / item_removed / list_cleared--> Listbox
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use trellis_core::{
    Controller, ControllerBase, ControllerExt, DeclareEvents, Error, Event, EventBus,
    EventClassBuilder, EventObject, Guarded, Model, ModelBase, ModelHandle, Observer, ParentRef,
    Result, Trigger, View, ViewBase, ViewExt, ViewHandle,
};

use crate::widget::{Button, ListWidget, TextField};

const TARGET: &str = trellis_core::logging::targets::LISTBOX;

/// Triggered by [`ListModel::add`], carrying the item.
pub const ITEM_ADDED: &str = "item_added";
/// Triggered by [`ListModel::remove`], carrying the item.
pub const ITEM_REMOVED: &str = "item_removed";
/// Triggered after [`ListModel::clear`].
pub const LIST_CLEARED: &str = "list_cleared";
/// Requested by the listbox: add a new item.
pub const ADD_ITEM: &str = "add_item";
/// Requested by the listbox: edit the carried item.
pub const EDIT_ITEM: &str = "edit_item";
/// Requested by the listbox: delete the carried item.
pub const DELETE_ITEM: &str = "delete_item";
/// Requested by the listbox: remove every item.
pub const CLEAR_LIST: &str = "clear_list";

/// Items a [`ListModel`] can hold.
pub trait ListItem: Clone + PartialEq + fmt::Display + Send + Sync + 'static {}

impl<T> ListItem for T where T: Clone + PartialEq + fmt::Display + Send + Sync + 'static {}

/// An ordered list of distinct items.
///
/// Every change is announced twice: as a named event on the model's bus and
/// to the observers registered with [`register_observer`](Self::register_observer).
pub struct ListModel<T: ListItem> {
    base: ModelBase<Vec<T>, ListModel<T>>,
}

impl<T: ListItem> ListModel<T> {
    /// An empty list.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: ModelBase::new::<Self>(Vec::new()),
        })
    }

    /// Register `observer` to hear every change to the list.
    pub fn register_observer<O: Observer<Self> + 'static>(&self, observer: &Arc<O>) -> bool {
        self.base.register_observer(observer)
    }

    /// Stop telling `observer` about changes.
    pub fn unregister_observer<O: Observer<Self> + 'static>(&self, observer: &Arc<O>) -> bool {
        self.base.unregister_observer(observer)
    }

    /// Append `item` unless it is already present.
    ///
    /// Returns the item and triggers `item_added` if it was added; returns
    /// `None` and notifies nobody otherwise.
    pub fn add(&self, item: T) -> Result<Option<T>> {
        self.base.data().locked(|| {
            if self.contains(&item) {
                return Ok(None);
            }
            self.base.observed(self, |items| {
                items.push(item.clone());
                Ok(())
            })?;
            tracing::trace!(target: TARGET, %item, "item added");
            self.base.bus().emit(ITEM_ADDED, item.clone())?;
            Ok(Some(item))
        })
    }

    /// The item at `index`.
    pub fn get(&self, index: usize) -> Option<T> {
        self.base.with_data(|items| items.get(index).cloned())
    }

    /// The position of `item`.
    pub fn index(&self, item: &T) -> Option<usize> {
        self.base.with_data(|items| items.iter().position(|candidate| candidate == item))
    }

    /// Remove `item` and trigger `item_removed`.
    ///
    /// Event observers hear the event while the item is still listed, so they
    /// can look up its position. Returns `None` if the item was not present.
    pub fn remove(&self, item: &T) -> Result<Option<T>> {
        self.base.data().locked(|| {
            if self.index(item).is_none() {
                return Ok(None);
            }
            self.base.bus().emit(ITEM_REMOVED, item.clone())?;
            let removed = self.base.observed(self, |items| {
                Ok(items
                    .iter()
                    .position(|candidate| candidate == item)
                    .map(|index| items.remove(index)))
            })?;
            tracing::trace!(target: TARGET, %item, "item removed");
            Ok(removed)
        })
    }

    /// Remove the item at `index`.
    pub fn pop(&self, index: usize) -> Result<Option<T>> {
        match self.get(index) {
            Some(item) => self.remove(&item),
            None => Ok(None),
        }
    }

    /// Remove every item, then trigger `list_cleared`.
    pub fn clear(&self) -> Result<()> {
        self.base.bus().triggers(LIST_CLEARED, Trigger::After, || {
            self.base.observed(self, |items| {
                items.clear();
                Ok(())
            })
        })
    }

    /// Whether `item` is listed.
    pub fn contains(&self, item: &T) -> bool {
        self.index(item).is_some()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.base.with_data(|items| items.len())
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of the items.
    pub fn items(&self) -> Vec<T> {
        self.base.snapshot()
    }
}

impl<T: ListItem> DeclareEvents for ListModel<T> {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ModelBase::<Vec<T>, Self>::declare(class);
        class.hook(ITEM_ADDED).hook(ITEM_REMOVED).hook(LIST_CLEARED);
    }
}

impl<T: ListItem> EventObject for ListModel<T> {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl<T: ListItem> Model for ListModel<T> {
    fn on_update(&self) -> Result<()> {
        Ok(())
    }
}

impl<T: ListItem> fmt::Debug for ListModel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListModel")
            .field("len", &self.len())
            .finish()
    }
}

/// A view listing the items of a [`ListModel`].
pub struct Listbox<T: ListItem> {
    base: ViewBase,
    title: String,
    list: Arc<ListWidget>,
    items: Guarded<Vec<T>>,
    this: Weak<Self>,
}

impl<T: ListItem> Listbox<T> {
    /// A listbox headed `title`.
    pub fn new(title: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            base: ViewBase::new::<Self>(),
            title: title.into(),
            list: Arc::new(ListWidget::new()),
            items: Guarded::new(Vec::new()),
            this: this.clone(),
        })
    }

    /// A button running `request` on this listbox.
    fn button(&self, caption: &str, request: fn(&Self) -> Result<()>) -> Arc<Button> {
        let this = self.this.clone();
        Arc::new(Button::new(caption, move || match this.upgrade() {
            Some(listbox) => request(&listbox),
            None => Ok(()),
        }))
    }

    /// The list widget.
    pub fn list_widget(&self) -> &Arc<ListWidget> {
        &self.list
    }

    /// The displayed lines.
    pub fn lines(&self) -> Vec<String> {
        self.list.lines()
    }

    /// Select the line at `index`.
    pub fn select(&self, index: usize) -> bool {
        self.list.select(index)
    }

    /// The item behind the selected line.
    pub fn selected_item(&self) -> Option<T> {
        let index = self.list.selection()?;
        self.items.with(|items| items.get(index).cloned())
    }

    /// Ask the controller to add an item.
    pub fn request_add(&self) -> Result<()> {
        self.base.bus().trigger_event(ADD_ITEM, None)
    }

    /// Ask the controller to edit the selected item.
    ///
    /// Returns `false` if nothing is selected.
    pub fn request_edit(&self) -> Result<bool> {
        match self.selected_item() {
            Some(item) => self.base.bus().emit(EDIT_ITEM, item).map(|()| true),
            None => Ok(false),
        }
    }

    /// Ask the controller to delete the selected item.
    ///
    /// Returns `false` if nothing is selected.
    pub fn request_delete(&self) -> Result<bool> {
        match self.selected_item() {
            Some(item) => self.base.bus().emit(DELETE_ITEM, item).map(|()| true),
            None => {
                tracing::debug!(target: TARGET, "delete requested with nothing selected");
                Ok(false)
            }
        }
    }

    /// Ask the controller to clear the list.
    pub fn request_clear(&self) -> Result<()> {
        self.base.bus().trigger_event(CLEAR_LIST, None)
    }

    fn item_added(&self, item: &T) {
        self.items.with(|items| items.push(item.clone()));
        self.list.push(item.to_string());
    }

    fn item_removed(&self, item: &T) {
        let index = self.items.with(|items| {
            let index = items.iter().position(|candidate| candidate == item)?;
            items.remove(index);
            Some(index)
        });
        if let Some(index) = index {
            self.list.remove(index);
        }
    }

    fn list_cleared(&self) {
        self.items.with(Vec::clear);
        self.list.clear();
    }
}

impl<T: ListItem> DeclareEvents for Listbox<T> {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ViewBase::declare(class);
        class
            .hook(ADD_ITEM)
            .hook(EDIT_ITEM)
            .hook(DELETE_ITEM)
            .hook(CLEAR_LIST)
            .slot(ITEM_ADDED, "item_added", |listbox: &Self, event: &Event| {
                listbox.item_added(event.require_payload::<T>()?);
                Ok(())
            })
            .slot(ITEM_REMOVED, "item_removed", |listbox: &Self, event: &Event| {
                listbox.item_removed(event.require_payload::<T>()?);
                Ok(())
            })
            .slot(LIST_CLEARED, "list_cleared", |listbox: &Self, _| {
                listbox.list_cleared();
                Ok(())
            });
    }
}

impl<T: ListItem> EventObject for Listbox<T> {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl<T: ListItem> View for Listbox<T> {
    fn view_base(&self) -> &ViewBase {
        &self.base
    }

    fn on_prepare(&self) -> Result<()> {
        self.base
            .add_widget("title", Arc::new(TextField::new(self.title.clone())))?;
        self.base
            .add_widget("add", self.button("Add", Self::request_add))?;
        self.base.add_widget(
            "delete",
            self.button("Delete", |listbox| listbox.request_delete().map(|_| ())),
        )?;
        self.base
            .add_widget("clear", self.button("Clear", Self::request_clear))?;
        self.base.add_widget("list", self.list.clone())?;
        Ok(())
    }
}

/// What a [`ListboxController`] does with the listbox's requests.
///
/// Every action does nothing by default.
pub trait ListboxActions<T: ListItem>: Send + Sync {
    /// The user asked for a new item.
    fn add_item(&self, _model: &ListModel<T>) -> Result<()> {
        Ok(())
    }

    /// The user asked to edit `item`.
    fn edit_item(&self, _model: &ListModel<T>, _item: &T) -> Result<()> {
        Ok(())
    }

    /// The user asked to delete `item`.
    fn delete_item(&self, _model: &ListModel<T>, _item: &T) -> Result<()> {
        Ok(())
    }
}

/// Actions that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActions;

impl<T: ListItem> ListboxActions<T> for NoActions {}

/// A controller connecting a [`Listbox`] to a [`ListModel`].
pub struct ListboxController<T: ListItem> {
    base: ControllerBase,
    title: String,
    list_model: Arc<ListModel<T>>,
    actions: Box<dyn ListboxActions<T>>,
}

impl<T: ListItem> ListboxController<T> {
    /// Create and attach a controller listing `list_model`.
    pub fn new(
        parent: impl Into<ParentRef>,
        title: impl Into<String>,
        list_model: Arc<ListModel<T>>,
        actions: impl ListboxActions<T> + 'static,
    ) -> Result<Arc<Self>> {
        let controller = Arc::new(Self {
            base: ControllerBase::new::<Self>(parent),
            title: title.into(),
            list_model: list_model.clone(),
            actions: Box::new(actions),
        })
        .attach()?;
        controller
            .base
            .set_model(Some(ModelHandle::new(list_model)))?;
        Ok(controller)
    }

    /// The list model.
    pub fn list_model(&self) -> &Arc<ListModel<T>> {
        &self.list_model
    }

    /// The listbox, once prepared.
    pub fn listbox(&self) -> Result<Arc<Listbox<T>>> {
        self.base.require_view::<Listbox<T>>()
    }

    /// Remove every item from the list model.
    pub fn clear_list(&self) -> Result<()> {
        self.list_model.clear()
    }
}

impl<T: ListItem> DeclareEvents for ListboxController<T> {
    fn declare_events(class: &mut EventClassBuilder<Self>) {
        ControllerBase::declare(class);
        class
            .slot(CLEAR_LIST, "clear_list", |controller: &Self, _| {
                controller.clear_list()
            })
            .slot(ADD_ITEM, "add_item", |controller: &Self, _| {
                controller.actions.add_item(&controller.list_model)
            })
            .slot(EDIT_ITEM, "edit_item", |controller: &Self, event: &Event| {
                match event.payload::<T>()? {
                    Some(item) => controller.actions.edit_item(&controller.list_model, item),
                    None => Ok(()),
                }
            })
            .slot(DELETE_ITEM, "delete_item", |controller: &Self, event: &Event| {
                match event.payload::<T>()? {
                    Some(item) => controller.actions.delete_item(&controller.list_model, item),
                    None => Ok(()),
                }
            });
    }
}

impl<T: ListItem> EventObject for ListboxController<T> {
    fn event_bus(&self) -> &EventBus {
        self.base.bus()
    }
}

impl<T: ListItem> Controller for ListboxController<T> {
    fn base(&self) -> &ControllerBase {
        &self.base
    }

    fn load_view(&self) -> Result<Option<ViewHandle>> {
        Ok(Some(ViewHandle::new(Listbox::<T>::new(self.title.clone()))))
    }

    fn on_prepare(&self) -> Result<()> {
        let listbox = self.listbox()?;
        self.list_model.event_bus().add_observer(&listbox);
        Ok(())
    }

    fn on_start(&self) -> Result<()> {
        self.listbox()?.show().map(|_| ())
    }

    fn on_stop(&self) -> Result<()> {
        match self.listbox() {
            Ok(listbox) => {
                self.list_model.event_bus().remove_observer(&listbox);
                Ok(())
            }
            Err(Error::InvalidCapability { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl<T: ListItem> fmt::Debug for ListboxController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListboxController")
            .field("state", &self.base.state())
            .field("items", &self.list_model.len())
            .finish()
    }
}
