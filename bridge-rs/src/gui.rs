//! Headless host GUI primitives.
//!
//! The dialog layer only needs a handful of operations from the host toolkit:
//! create a window, put widgets in grid cells, set title and visibility,
//! subscribe to the close notification, and destroy the window later.  This
//! module provides exactly that, without drawing anything, so the bridge runs
//! in a terminal and in tests.
//!
//! Windows live in a [`Desktop`] arena and are addressed by a
//! generation-checked [`WindowHandle`].  A handle to a disposed window never
//! resolves again, even if its slot is reused.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

// ── DisplayType ───────────────────────────────────────────────────────────────

/// Row-packing hint carried by every widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayType {
    /// Keep the dialog's current mode.
    #[default]
    Inherit,
    /// Start a new row.
    Block,
    /// Continue the current row.
    Inline,
}

impl DisplayType {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayType::Inherit => "inherit",
            DisplayType::Block => "block",
            DisplayType::Inline => "inline",
        }
    }
}

impl FromStr for DisplayType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "inherit" => Ok(DisplayType::Inherit),
            "block" => Ok(DisplayType::Block),
            "inline" => Ok(DisplayType::Inline),
            other => Err(format!("unknown display type {other:?}")),
        }
    }
}

impl fmt::Display for DisplayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Widget ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Label,
    Button,
    Entry,
    IntEntry,
}

impl WidgetKind {
    pub fn tag(self) -> &'static str {
        match self {
            WidgetKind::Label => "label",
            WidgetKind::Button => "button",
            WidgetKind::Entry => "entry",
            WidgetKind::IntEntry => "intentry",
        }
    }
}

type ClickHandler = Rc<dyn Fn()>;

pub struct Widget {
    kind: WidgetKind,
    id: RefCell<String>,
    text: RefCell<String>,
    display: Cell<DisplayType>,
    value: Cell<i32>,
    range: Cell<(i32, i32)>,
    on_click: RefCell<Vec<ClickHandler>>,
}

impl Widget {
    pub fn new(kind: WidgetKind) -> Rc<Self> {
        Rc::new(Self {
            kind,
            id: RefCell::new(String::new()),
            text: RefCell::new(String::new()),
            display: Cell::new(DisplayType::Inherit),
            value: Cell::new(0),
            range: Cell::new((i32::MIN, i32::MAX)),
            on_click: RefCell::new(Vec::new()),
        })
    }

    pub fn kind(&self) -> WidgetKind {
        self.kind
    }

    pub fn id(&self) -> String {
        self.id.borrow().clone()
    }

    pub fn set_id(&self, id: &str) {
        *self.id.borrow_mut() = id.to_owned();
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn set_text(&self, text: &str) {
        *self.text.borrow_mut() = text.to_owned();
    }

    pub fn display(&self) -> DisplayType {
        self.display.get()
    }

    pub fn set_display(&self, display: DisplayType) {
        self.display.set(display);
    }

    pub fn value(&self) -> i32 {
        self.value.get()
    }

    /// Store `value` clamped to the current range; returns what was stored.
    pub fn set_value(&self, value: i32) -> i32 {
        let (min, max) = self.range.get();
        let clamped = value.clamp(min, max);
        self.value.set(clamped);
        clamped
    }

    pub fn range(&self) -> (i32, i32) {
        self.range.get()
    }

    /// Set the accepted range.  Bounds given in the wrong order are swapped;
    /// the current value is re-clamped.
    pub fn set_range(&self, min: i32, max: i32) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.range.set((min, max));
        self.set_value(self.value.get());
    }

    pub fn on_click(&self, handler: impl Fn() + 'static) {
        self.on_click.borrow_mut().push(Rc::new(handler));
    }

    /// Simulate a user click.  Returns `false` for widgets that are not
    /// clickable.
    pub fn click(&self) -> bool {
        if self.kind != WidgetKind::Button {
            return false;
        }
        let handlers: Vec<ClickHandler> = self.on_click.borrow().clone();
        for handler in handlers {
            handler();
        }
        true
    }

    /// One-cell rendering used by the console host.
    pub fn render(&self) -> String {
        let id = self.id.borrow();
        let text = self.text.borrow();
        match self.kind {
            WidgetKind::Label => text.clone(),
            WidgetKind::Button => format!("[ {text} ]#{id}"),
            WidgetKind::Entry => format!("{id}: [{text}]"),
            WidgetKind::IntEntry => format!("{id}: [{}]", self.value.get()),
        }
    }
}

impl fmt::Debug for Widget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Widget")
            .field("kind", &self.kind)
            .field("id", &*self.id.borrow())
            .field("display", &self.display.get())
            .finish_non_exhaustive()
    }
}

// ── Grid ──────────────────────────────────────────────────────────────────────

/// Position of one cell in a [`Grid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub row: usize,
    pub column: usize,
    /// Horizontal span in columns.
    pub span: usize,
}

/// Cell alignment flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Align {
    pub horizontal: bool,
    pub vertical: bool,
}

impl Align {
    pub const FILL: Align = Align { horizontal: true, vertical: true };
}

#[derive(Debug)]
pub struct GridCell {
    pub widget: Rc<Widget>,
    pub placement: Placement,
    pub align: Align,
}

#[derive(Debug)]
pub struct Grid {
    columns: usize,
    cells: Vec<GridCell>,
}

impl Grid {
    pub fn new(columns: usize) -> Self {
        Self { columns: columns.max(1), cells: Vec::new() }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn add_child_in_cell(&mut self, widget: Rc<Widget>, placement: Placement, align: Align) {
        self.cells.push(GridCell { widget, placement, align });
    }

    pub fn remove(&mut self, widget: &Rc<Widget>) -> bool {
        let before = self.cells.len();
        self.cells.retain(|c| !Rc::ptr_eq(&c.widget, widget));
        self.cells.len() < before
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    pub fn find(&self, id: &str) -> Option<Rc<Widget>> {
        self.cells.iter().find(|c| *c.widget.id.borrow() == id).map(|c| Rc::clone(&c.widget))
    }
}

// ── Window ────────────────────────────────────────────────────────────────────

type CloseHandler = Rc<dyn Fn()>;

pub struct Window {
    title: RefCell<String>,
    visible: Cell<bool>,
    centered: Cell<bool>,
    grid: RefCell<Option<Grid>>,
    on_close: RefCell<Vec<CloseHandler>>,
}

impl Window {
    fn new(title: &str) -> Self {
        Self {
            title: RefCell::new(title.to_owned()),
            visible: Cell::new(false),
            centered: Cell::new(false),
            grid: RefCell::new(None),
            on_close: RefCell::new(Vec::new()),
        }
    }

    pub fn title(&self) -> String {
        self.title.borrow().clone()
    }

    pub fn set_title(&self, title: &str) {
        *self.title.borrow_mut() = title.to_owned();
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn is_centered(&self) -> bool {
        self.centered.get()
    }

    pub fn has_grid(&self) -> bool {
        self.grid.borrow().is_some()
    }

    /// Replace the window's content.
    pub fn set_grid(&self, grid: Grid) {
        *self.grid.borrow_mut() = Some(grid);
    }

    pub fn with_grid<R>(&self, f: impl FnOnce(&mut Grid) -> R) -> Option<R> {
        self.grid.borrow_mut().as_mut().map(f)
    }

    pub fn find_widget(&self, id: &str) -> Option<Rc<Widget>> {
        self.grid.borrow().as_ref()?.find(id)
    }

    /// Subscribe to the user-initiated close notification.
    pub fn connect_close(&self, handler: impl Fn() + 'static) {
        self.on_close.borrow_mut().push(Rc::new(handler));
    }

    /// Text rendering used by the console host: title line, then one line per
    /// grid row.
    pub fn render(&self) -> String {
        let mut out = format!("[{}]{}", self.title.borrow(), if self.is_visible() { "" } else { " (hidden)" });
        if let Some(grid) = self.grid.borrow().as_ref() {
            let mut row = usize::MAX;
            for cell in grid.cells() {
                if cell.placement.row != row {
                    row = cell.placement.row;
                    out.push_str("\n ");
                }
                out.push_str(&format!(" | {}", cell.widget.render()));
                if cell.placement.span > 1 {
                    out.push_str(&format!(" (span {})", cell.placement.span));
                }
            }
        }
        out
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("title", &*self.title.borrow())
            .field("visible", &self.visible.get())
            .finish_non_exhaustive()
    }
}

// ── Desktop ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    window: Option<Rc<Window>>,
}

/// Arena owning every host window.
#[derive(Default)]
pub struct Desktop {
    slots: RefCell<Vec<Slot>>,
    free: RefCell<Vec<usize>>,
}

impl Desktop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, title: &str) -> WindowHandle {
        let window = Rc::new(Window::new(title));
        let mut slots = self.slots.borrow_mut();
        if let Some(index) = self.free.borrow_mut().pop() {
            let slot = &mut slots[index];
            slot.window = Some(window);
            return WindowHandle { index, generation: slot.generation };
        }
        slots.push(Slot { generation: 0, window: Some(window) });
        WindowHandle { index: slots.len() - 1, generation: 0 }
    }

    pub fn get(&self, handle: WindowHandle) -> Option<Rc<Window>> {
        let slots = self.slots.borrow();
        let slot = slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.window.clone()
    }

    pub fn is_alive(&self, handle: WindowHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Center the window and make it visible.
    pub fn center_and_show(&self, handle: WindowHandle) -> bool {
        let Some(window) = self.get(handle) else { return false };
        window.centered.set(true);
        window.visible.set(true);
        true
    }

    /// Hide the window without notifying close subscribers.
    pub fn close(&self, handle: WindowHandle) -> bool {
        let Some(window) = self.get(handle) else { return false };
        window.visible.set(false);
        true
    }

    /// User-initiated close: notify subscribers, then hide.
    pub fn request_close(&self, handle: WindowHandle) -> bool {
        let Some(window) = self.get(handle) else { return false };
        if !window.is_visible() {
            return false;
        }
        let handlers: Vec<CloseHandler> = window.on_close.borrow().clone();
        for handler in handlers {
            handler();
        }
        window.visible.set(false);
        true
    }

    /// Destroy the window.  Its handle, and every copy of it, stops resolving.
    pub fn dispose(&self, handle: WindowHandle) -> bool {
        let removed = {
            let mut slots = self.slots.borrow_mut();
            match slots.get_mut(handle.index) {
                Some(slot) if slot.generation == handle.generation && slot.window.is_some() => {
                    slot.generation = slot.generation.wrapping_add(1);
                    slot.window.take()
                }
                _ => None,
            }
        };
        let Some(window) = removed else { return false };
        self.free.borrow_mut().push(handle.index);
        // Dropped outside the arena borrow: close handlers may hold state that
        // reaches back into the desktop.
        drop(window);
        true
    }

    /// Handles of all live windows.
    pub fn windows(&self) -> Vec<WindowHandle> {
        self.slots
            .borrow()
            .iter()
            .enumerate()
            .filter(|(_, s)| s.window.is_some())
            .map(|(index, s)| WindowHandle { index, generation: s.generation })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().iter().filter(|s| s.window.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_type_parses_case_insensitively() {
        assert_eq!("Inline".parse::<DisplayType>(), Ok(DisplayType::Inline));
        assert_eq!("BLOCK".parse::<DisplayType>(), Ok(DisplayType::Block));
        assert_eq!("".parse::<DisplayType>(), Ok(DisplayType::Inherit));
        assert!("float".parse::<DisplayType>().is_err());
    }

    #[test]
    fn intentry_value_is_clamped() {
        let w = Widget::new(WidgetKind::IntEntry);
        w.set_range(0, 10);
        assert_eq!(w.set_value(42), 10);
        assert_eq!(w.set_value(-3), 0);
        w.set_value(7);
        w.set_range(9, 1);
        assert_eq!(w.range(), (1, 9));
        assert_eq!(w.value(), 7);
        w.set_range(8, 9);
        assert_eq!(w.value(), 8);
    }

    #[test]
    fn only_buttons_click() {
        let hits = Rc::new(Cell::new(0));
        let b = Widget::new(WidgetKind::Button);
        let h = Rc::clone(&hits);
        b.on_click(move || h.set(h.get() + 1));
        assert!(b.click());
        assert!(!Widget::new(WidgetKind::Label).click());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn stale_handle_never_resolves() {
        let d = Desktop::new();
        let a = d.create("a");
        assert!(d.dispose(a));
        assert!(!d.dispose(a));
        let b = d.create("b");
        assert!(d.get(a).is_none());
        assert_eq!(d.get(b).map(|w| w.title()).as_deref(), Some("b"));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn request_close_notifies_then_hides() {
        let d = Desktop::new();
        let h = d.create("w");
        let window = d.get(h).unwrap();
        let seen_visible = Rc::new(Cell::new(None));
        let (s, w) = (Rc::clone(&seen_visible), Rc::downgrade(&window));
        window.connect_close(move || s.set(w.upgrade().map(|w| w.is_visible())));

        assert!(!d.request_close(h), "hidden windows ignore close requests");
        d.center_and_show(h);
        assert!(window.is_centered());
        assert!(d.request_close(h));
        assert_eq!(seen_visible.get(), Some(true));
        assert!(!window.is_visible());
    }

    #[test]
    fn grid_lookup_and_removal() {
        let mut g = Grid::new(0);
        assert_eq!(g.columns(), 1);
        let w = Widget::new(WidgetKind::Entry);
        w.set_id("name");
        g.add_child_in_cell(Rc::clone(&w), Placement { row: 0, column: 0, span: 1 }, Align::FILL);
        assert!(g.find("name").is_some());
        assert!(g.remove(&w));
        assert!(g.find("name").is_none());
    }
}
