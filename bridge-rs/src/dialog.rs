//! Script-built dialogs.
//!
//! Guest code creates a dialog (`app.createDialog("settings")`), adds widgets
//! to it and returns.  Nothing is shown while the script runs: the dialog
//! listens for the end of the evaluation and only then packs its widgets into
//! rows, lays the rows out on a grid and shows the window.  A failed
//! evaluation leaves no window behind.
//!
//! ```text
//!  Empty ──add──▶ Building ──eval ok──▶ Built ──show──▶ Visible
//!                    │                                     │
//!                    └──eval failed──▶ Closing ◀──close────┘
//!                                        │ unlisted now, disposed next tick
//!                                        ▼
//!                                    Destroyed
//! ```
//!
//! Open dialogs with an id are listed in the bridge's [`DialogIndex`] so the
//! host can find them by id.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::bridge::{Bridge, BridgeError};
use crate::engine::{Engine, ListenerId};
use crate::gui::{Align, DisplayType, Grid, Placement, Widget, Window, WindowHandle};
use crate::object::{widget_registry_key, ScriptObject};
use crate::value::{arg, arg_int, arg_str, Value};

pub const DIALOG_KEY: &str = "DialogScriptObject";

// ── RowComposer ───────────────────────────────────────────────────────────────

/// Groups items into rows by their display hints.
///
/// The composer is in either block or inline mode, block initially.  Each
/// pushed item's hint updates the mode first (`Block` → block, `Inline` →
/// inline, `Inherit` → unchanged); the item then continues the last row in
/// inline mode and starts a new row otherwise.  So
/// `[Inline A, Inline B, Block C, Inline D]` packs as `[[A, B], [C, D]]`.
#[derive(Debug, Clone)]
pub struct RowComposer<T> {
    rows: Vec<Vec<T>>,
    inline: bool,
    pending_break: bool,
}

impl<T> Default for RowComposer<T> {
    fn default() -> Self {
        Self { rows: Vec::new(), inline: false, pending_break: false }
    }
}

impl<T> RowComposer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T, display: DisplayType) {
        match display {
            DisplayType::Inherit => {}
            DisplayType::Block => self.inline = false,
            DisplayType::Inline => self.inline = true,
        }
        let force_new = std::mem::take(&mut self.pending_break);
        match self.rows.last_mut() {
            Some(row) if self.inline && !force_new => row.push(item),
            _ => self.rows.push(vec![item]),
        }
    }

    /// The next item starts a new row whatever its hint; the mode drops back
    /// to block.
    pub fn add_break(&mut self) {
        self.inline = false;
        self.pending_break = true;
    }

    /// Remove the first item matching `pred`.  A row left empty disappears.
    pub fn remove(&mut self, mut pred: impl FnMut(&T) -> bool) -> Option<T> {
        let (r, i) = self
            .rows
            .iter()
            .enumerate()
            .find_map(|(r, row)| row.iter().position(&mut pred).map(|i| (r, i)))?;
        let item = self.rows[r].remove(i);
        if self.rows[r].is_empty() {
            self.rows.remove(r);
        }
        Some(item)
    }

    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Length of the longest row, at least 1.
    pub fn max_columns(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0).max(1)
    }

    /// Grid placement of every item, row by row.  All cells span one column
    /// except each row's last, which spans `1 + max_columns - row_len` so
    /// short rows fill the grid width.
    pub fn layout(&self) -> Vec<(&T, Placement)> {
        let max = self.max_columns();
        let mut out = Vec::with_capacity(self.len());
        for (r, row) in self.rows.iter().enumerate() {
            let last = row.len().saturating_sub(1);
            for (c, item) in row.iter().enumerate() {
                let span = if c == last { 1 + max - row.len() } else { 1 };
                out.push((item, Placement { row: r, column: c, span }));
            }
        }
        out
    }
}

// ── DialogIndex ───────────────────────────────────────────────────────────────

/// id → window of every open dialog that has an id.
#[derive(Debug, Default)]
pub struct DialogIndex {
    map: RefCell<HashMap<String, WindowHandle>>,
}

impl DialogIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: &str, handle: WindowHandle) {
        if let Some(old) = self.map.borrow_mut().insert(id.to_owned(), handle) {
            if old != handle {
                tracing::warn!(target: "dialog", id, "dialog id reused; lookup now finds the newer window");
            }
        }
    }

    /// Drop `id` if it still maps to `handle`.
    pub fn remove_if(&self, id: &str, handle: WindowHandle) -> bool {
        let mut map = self.map.borrow_mut();
        if map.get(id) == Some(&handle) {
            map.remove(id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<WindowHandle> {
        self.map.borrow().get(id).copied()
    }

    /// Snapshot of the listed ids, sorted.  Iterate this, not the index,
    /// when the loop body may close dialogs.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.map.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

/// The window of the open dialog listed under `id`.
pub fn get_dialog_by_id(bridge: &Bridge, id: &str) -> Option<Rc<Window>> {
    bridge.desktop().get(bridge.dialogs().get(id)?)
}

/// Ask every listed dialog to close, as if the user had closed it.
pub fn close_all_dialogs(bridge: &Bridge) -> usize {
    let mut closed = 0;
    for id in bridge.dialogs().ids() {
        if let Some(handle) = bridge.dialogs().get(&id) {
            if bridge.desktop().request_close(handle) {
                closed += 1;
            }
        }
    }
    closed
}

// ── Dialog ────────────────────────────────────────────────────────────────────

pub struct Dialog {
    this: Weak<Dialog>,
    bridge: Weak<Bridge>,
    engine: Option<Weak<dyn Engine>>,
    /// This dialog's `after_eval` registration on `engine`.
    listener: Cell<Option<ListenerId>>,
    window: WindowHandle,
    id: RefCell<String>,
    composer: RefCell<RowComposer<Weak<Widget>>>,
    /// Owns the widget script objects; the composer and grid only refer to
    /// the host widgets they wrap.
    widgets: RefCell<HashMap<String, Rc<ScriptObject>>>,
    next_widget_id: Cell<u32>,
    closing: Cell<bool>,
}

impl Dialog {
    /// A hidden, empty dialog bound to the calling engine.  It is built or
    /// closed at the end of that engine's current evaluation.
    pub fn new(bridge: &Bridge) -> Rc<Self> {
        let window = bridge.desktop().create("Script");
        let engine = bridge.calling_engine();
        let dialog = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            bridge: bridge.handle(),
            engine: engine.as_ref().map(Rc::downgrade),
            listener: Cell::new(None),
            window,
            id: RefCell::new(String::new()),
            composer: RefCell::new(RowComposer::new()),
            widgets: RefCell::new(HashMap::new()),
            next_widget_id: Cell::new(0),
            closing: Cell::new(false),
        });
        if let Some(engine) = engine {
            let w = Rc::downgrade(&dialog);
            let id = engine.after_eval(Box::new(move |success| {
                if let Some(d) = w.upgrade() {
                    d.on_after_eval(success);
                }
            }));
            dialog.listener.set(Some(id));
        }
        dialog
    }

    pub fn id(&self) -> String {
        self.id.borrow().clone()
    }

    pub fn set_id(&self, id: &str) {
        *self.id.borrow_mut() = id.to_owned();
    }

    pub fn handle(&self) -> WindowHandle {
        self.window
    }

    pub fn window(&self) -> Option<Rc<Window>> {
        self.bridge.upgrade()?.desktop().get(self.window)
    }

    pub fn is_alive(&self) -> bool {
        self.window().is_some()
    }

    pub fn is_visible(&self) -> bool {
        self.window().is_some_and(|w| w.is_visible())
    }

    pub fn is_built(&self) -> bool {
        self.window().is_some_and(|w| w.has_grid())
    }

    pub fn is_closing(&self) -> bool {
        self.closing.get()
    }

    pub fn title(&self) -> String {
        self.window().map(|w| w.title()).unwrap_or_default()
    }

    pub fn set_title(&self, title: &str) {
        if let Some(w) = self.window() {
            w.set_title(title);
        }
    }

    fn engine(&self) -> Option<Rc<dyn Engine>> {
        self.engine.as_ref()?.upgrade()
    }

    fn stop_listening(&self) {
        if let (Some(id), Some(engine)) = (self.listener.take(), self.engine()) {
            engine.remove_after_eval(id);
        }
    }

    // ── Children ──────────────────────────────────────────────────────────────

    /// Add a widget of guest type `tag` (`"label"`, `"Button"`, …) under `id`.
    ///
    /// An empty id is replaced by `<tag><n>`.  Declines (returns `None`) for an
    /// empty or unknown tag and for an id already in use.
    pub fn add(&self, tag: &str, id: &str, display: Option<DisplayType>) -> Option<Rc<ScriptObject>> {
        if tag.is_empty() || self.get(id).is_some() {
            return None;
        }
        let key = widget_registry_key(tag)?;
        let bridge = self.bridge.upgrade()?;
        let Some(object) = bridge.create_object(&key) else {
            tracing::debug!(target: "dialog", tag, "unknown widget type");
            return None;
        };
        let widget = object.get_wrapped::<Widget>()?;
        if let Some(display) = display {
            widget.set_display(display);
        }

        let id = if id.is_empty() { self.auto_id(&tag.to_lowercase()) } else { id.to_owned() };
        object.set("id", id.as_str());
        self.composer.borrow_mut().push(Rc::downgrade(&widget), widget.display());
        if self.is_built() {
            tracing::debug!(target: "dialog", id = %id, "dialog already laid out; widget stays hidden");
        }
        self.widgets.borrow_mut().insert(id, Rc::clone(&object));
        Some(object)
    }

    fn auto_id(&self, tag: &str) -> String {
        loop {
            let n = self.next_widget_id.get();
            self.next_widget_id.set(n + 1);
            let id = format!("{tag}{n}");
            if !self.widgets.borrow().contains_key(&id) {
                return id;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Rc<ScriptObject>> {
        self.widgets.borrow().get(id).cloned()
    }

    /// Remove widget `id` from the table, its row and (once laid out) the grid.
    pub fn remove(&self, id: &str) -> bool {
        let Some(object) = self.widgets.borrow_mut().remove(id) else { return false };
        if let Some(widget) = object.get_wrapped::<Widget>() {
            let target = Rc::downgrade(&widget);
            self.composer.borrow_mut().remove(|w| w.ptr_eq(&target));
            if let Some(window) = self.window() {
                window.with_grid(|g| g.remove(&widget));
            }
        }
        true
    }

    /// Widget ids in row order.
    pub fn widget_ids(&self) -> Vec<String> {
        self.composer
            .borrow()
            .rows()
            .iter()
            .flatten()
            .filter_map(Weak::upgrade)
            .map(|w| w.id())
            .collect()
    }

    pub fn add_break(&self) {
        self.composer.borrow_mut().add_break();
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Lay out the rows and show the window, centered.  Runs once; later
    /// calls and calls on a dead or closing dialog do nothing.
    pub fn build(&self) {
        let Some(bridge) = self.bridge.upgrade() else { return };
        let Some(window) = bridge.desktop().get(self.window) else { return };
        if window.has_grid() || self.closing.get() {
            return;
        }

        let weak = self.this.clone();
        window.connect_close(move || {
            if let Some(dialog) = weak.upgrade() {
                dialog.close_window(true, false);
            }
        });

        let id = self.id();
        if !id.is_empty() {
            bridge.dialogs().insert(&id, self.window);
        }

        let composer = self.composer.borrow();
        let mut grid = Grid::new(composer.max_columns());
        for (widget, placement) in composer.layout() {
            if let Some(widget) = widget.upgrade() {
                grid.add_child_in_cell(widget, placement, Align::FILL);
            }
        }
        window.set_grid(grid);
        bridge.desktop().center_and_show(self.window);
        tracing::debug!(
            target: "dialog",
            id = %id,
            rows = composer.rows().len(),
            columns = composer.max_columns(),
            "dialog shown"
        );
    }

    /// Start teardown.
    ///
    /// Raises the guest `<id>_close` event first when `raise_event` is set,
    /// hides the window when `notify_manager` is set, unlists the id
    /// immediately and disposes of the window on the scheduler's next turn.
    /// Only the first call has any effect.
    pub fn close_window(&self, raise_event: bool, notify_manager: bool) {
        if self.closing.replace(true) {
            return;
        }
        self.stop_listening();
        let id = self.id();
        if raise_event {
            if let Some(engine) = self.engine() {
                engine.raise_event(&format!("{id}_close"));
            }
        }

        let Some(bridge) = self.bridge.upgrade() else { return };
        if notify_manager {
            bridge.desktop().close(self.window);
        }
        self.unlist(&bridge);

        let desktop = Rc::clone(bridge.desktop());
        let handle = self.window;
        bridge.scheduler().delayed(move || {
            if desktop.dispose(handle) {
                tracing::debug!(target: "dialog", "dialog window disposed");
            }
        });
        tracing::debug!(target: "dialog", id = %id, raise_event, "dialog closing");
    }

    fn unlist(&self, bridge: &Bridge) {
        let id = self.id();
        if !id.is_empty() {
            bridge.dialogs().remove_if(&id, self.window);
        }
    }

    /// End-of-evaluation hook: build on success; close anything still hidden.
    /// Either way the dialog is done with its engine's evaluations.
    pub fn on_after_eval(&self, success: bool) {
        if self.closing.get() || !self.is_alive() {
            self.stop_listening();
            return;
        }
        if success {
            self.build();
        }
        if self.is_visible() {
            self.stop_listening();
        } else {
            self.close_window(false, true);
        }
    }
}

impl Drop for Dialog {
    fn drop(&mut self) {
        self.stop_listening();
        if !self.closing.get() && self.is_alive() && !self.is_visible() {
            self.close_window(false, false);
        }
    }
}

// ── Script object ─────────────────────────────────────────────────────────────

fn with_dialog(dialog: &Weak<Dialog>, f: impl FnOnce(&Dialog) -> Value) -> Value {
    match dialog.upgrade() {
        Some(d) => f(&d),
        None => Value::Undefined,
    }
}

fn object_value(object: Option<Rc<ScriptObject>>) -> Value {
    object.map(|o| Value::object(&o)).unwrap_or_default()
}

fn add_with_text(dialog: &Dialog, tag: &str, text: &str, id: &str) -> Option<Rc<ScriptObject>> {
    let widget = dialog.add(tag, id, None)?;
    widget.set("text", text);
    Some(widget)
}

/// Build the guest-facing object for a fresh dialog.
pub fn dialog_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let dialog = Dialog::new(bridge);
    let mut object = ScriptObject::new(bridge, "Dialog");

    let (g, s) = (Rc::downgrade(&dialog), Rc::downgrade(&dialog));
    object
        .add_property(
            "title",
            move || with_dialog(&g, |d| d.title().into()),
            move |v| {
                with_dialog(&s, |d| {
                    let title = v.to_string();
                    d.set_title(&title);
                    title.into()
                })
            },
        )
        .document("title", "read+write. Sets the title of the dialog window.");

    let w = Rc::downgrade(&dialog);
    object
        .add_read_only_property("id", move || with_dialog(&w, |d| d.id().into()))
        .document("id", "read-only. Id the dialog is listed under while open.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("add", move |args| {
            with_dialog(&w, |d| {
                let display = arg(args, 2).as_str().and_then(|s| s.parse().ok());
                object_value(d.add(&arg_str(args, 0), &arg_str(args, 1), display))
            })
        })
        .document("add", "add(type, id[, display]): adds a widget; returns it, or nothing if declined.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("get", move |args| {
            with_dialog(&w, |d| object_value(d.get(&arg_str(args, 0))))
        })
        .document("get", "get(id): the widget added under id.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("remove", move |args| with_dialog(&w, |d| d.remove(&arg_str(args, 0)).into()))
        .document("remove", "remove(id): removes the widget added under id; true if there was one.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("close", move |_| {
            with_dialog(&w, |d| {
                d.close_window(false, true);
                true.into()
            })
        })
        .document("close", "Closes the dialog without raising the close event.");

    for (name, tag) in [("addLabel", "label"), ("addButton", "button"), ("addEntry", "entry")] {
        let w = Rc::downgrade(&dialog);
        object.add_function(name, move |args| {
            with_dialog(&w, |d| {
                object_value(add_with_text(d, tag, &arg_str(args, 0), &arg_str(args, 1)))
            })
        });
    }
    object.document("addLabel", "addLabel(text, id)");
    object.document("addButton", "addButton(text, id): clicking raises <id>_click.");
    object.document("addEntry", "addEntry(text, id): a text entry holding text.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("addIntEntry", move |args| {
            with_dialog(&w, |d| {
                let (text, id) = (arg_str(args, 0), arg_str(args, 1));
                let label_id = if id.is_empty() { String::new() } else { format!("{id}-label") };
                add_with_text(d, "label", &text, &label_id);
                let entry = d.add("intentry", &id, None);
                if let Some(entry) = &entry {
                    entry.set("min", arg_int(args, 2, i32::MIN));
                    entry.set("max", arg_int(args, 3, i32::MAX));
                }
                object_value(entry)
            })
        })
        .document("addIntEntry", "addIntEntry(text, id, min, max): a label followed by an integer entry.");

    let w = Rc::downgrade(&dialog);
    object
        .add_function("addBreak", move |_| {
            with_dialog(&w, |d| {
                d.add_break();
                true.into()
            })
        })
        .document("addBreak", "addBreak(): the next widget starts a new row.");

    object.set_wrapped(dialog);
    Rc::new(object)
}

pub fn register(bridge: &Bridge) -> Result<(), BridgeError> {
    bridge.objects().register(DIALOG_KEY, &[], dialog_object)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
