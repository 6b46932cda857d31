//! Engine lifecycle contract shared by every backend.
//!
//! A backend implements [`Engine::execute`] (compile and run one chunk) and
//! [`Engine::event_snippet`]; the provided [`Engine::eval`] wraps that in the
//! lifecycle every backend must honour identically:
//!
//! 1. reject re-entrant evaluation on the same engine,
//! 2. run the chunk; report failures (and, in print mode, the last result) to
//!    the [`EngineDelegate`],
//! 3. run every `after_eval` listener once, in registration order, with the
//!    success flag,
//! 4. return to *Idle* and return the success flag.
//!
//! The engine counts as evaluating until the last listener returns, so an
//! `eval` started from a listener is rejected like any other nested call.
//! Guest failures never escape as errors past this boundary.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::bridge::{Bridge, BridgeError};
use crate::object::ScriptObject;

pub type AfterEvalListener = Box<dyn FnMut(bool)>;

/// Registration handle returned by [`Engine::after_eval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Guest failure inside a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(String),
    #[error("runtime error: {0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Globals installed, nothing evaluated yet.
    Constructed,
    Evaluating,
    Idle,
}

// ── EngineDelegate ────────────────────────────────────────────────────────────

/// Console/diagnostic sink.  Written to, never read from.
pub trait EngineDelegate {
    fn on_console_print(&self, text: &str);
}

/// Prints to stdout.
#[derive(Debug, Default)]
pub struct StdoutDelegate;

impl EngineDelegate for StdoutDelegate {
    fn on_console_print(&self, text: &str) {
        println!("{text}");
    }
}

/// Forwards to `tracing` under target `console`.
#[derive(Debug, Default)]
pub struct LogDelegate;

impl EngineDelegate for LogDelegate {
    fn on_console_print(&self, text: &str) {
        tracing::info!(target: "console", "{text}");
    }
}

/// Keeps every line; used by tests and embedding hosts that render their own
/// console.
#[derive(Debug, Default)]
pub struct BufferDelegate {
    lines: RefCell<Vec<String>>,
}

impl BufferDelegate {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.borrow_mut())
    }
}

impl EngineDelegate for BufferDelegate {
    fn on_console_print(&self, text: &str) {
        self.lines.borrow_mut().push(text.to_owned());
    }
}

// ── EngineCore ────────────────────────────────────────────────────────────────

/// Backend-independent engine state: globals, listeners, print mode, sink.
pub struct EngineCore {
    delegate: Rc<dyn EngineDelegate>,
    bridge: RefCell<Weak<Bridge>>,
    globals: RefCell<Vec<Rc<ScriptObject>>>,
    listeners: RefCell<Vec<(ListenerId, AfterEvalListener)>>,
    next_listener: Cell<u64>,
    /// Listeners taken out of `listeners` for the pass in progress.
    in_flight: RefCell<Vec<ListenerId>>,
    /// In-flight listeners unregistered during the pass.
    removed: RefCell<Vec<ListenerId>>,
    print_last_result: Cell<bool>,
    state: Cell<EngineState>,
}

impl EngineCore {
    /// Core using the bridge's default console sink (or [`LogDelegate`] when
    /// none is registered).
    pub fn new(bridge: &Bridge) -> Self {
        let delegate = bridge
            .delegates()
            .resolve(bridge, None)
            .unwrap_or_else(|| Rc::new(LogDelegate) as Rc<dyn EngineDelegate>);
        let core = Self::with_delegate(delegate);
        core.bind(bridge);
        core
    }

    pub fn with_delegate(delegate: Rc<dyn EngineDelegate>) -> Self {
        Self {
            delegate,
            bridge: RefCell::new(Weak::new()),
            globals: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            next_listener: Cell::new(0),
            in_flight: RefCell::new(Vec::new()),
            removed: RefCell::new(Vec::new()),
            print_last_result: Cell::new(false),
            state: Cell::new(EngineState::Constructed),
        }
    }

    /// Attach to the bridge whose objects this engine's guest code creates.
    pub fn bind(&self, bridge: &Bridge) {
        *self.bridge.borrow_mut() = bridge.handle();
    }

    pub fn bridge(&self) -> Option<Rc<Bridge>> {
        self.bridge.borrow().upgrade()
    }

    pub fn state(&self) -> EngineState {
        self.state.get()
    }

    pub fn report(&self, text: &str) {
        self.delegate.on_console_print(text);
    }

    pub fn prints_last_result(&self) -> bool {
        self.print_last_result.get()
    }

    pub fn globals(&self) -> Vec<Rc<ScriptObject>> {
        self.globals.borrow().clone()
    }

    /// Registered listeners, including those of a pass in progress.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len() + self.in_flight.borrow().len() - self.removed.borrow().len()
    }

    fn push_listener(&self, listener: AfterEvalListener) -> ListenerId {
        let id = ListenerId(self.next_listener.get());
        self.next_listener.set(id.0 + 1);
        self.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let found = {
            let mut listeners = self.listeners.borrow_mut();
            listeners.iter().position(|(l, _)| *l == id).map(|i| listeners.remove(i))
        };
        if found.is_some() {
            return true;
        }
        let pending = self.in_flight.borrow().contains(&id) && !self.removed.borrow().contains(&id);
        if pending {
            self.removed.borrow_mut().push(id);
        }
        pending
    }

    /// Enter *Evaluating*; `false` if an evaluation is already in flight.
    fn begin(&self) -> bool {
        if self.state.get() == EngineState::Evaluating {
            return false;
        }
        self.state.set(EngineState::Evaluating);
        true
    }

    /// Run listeners, then back to *Idle*.  Listeners registered while these
    /// run are kept, after the existing ones, for the next evaluation; a
    /// listener unregistered mid-pass does not run again.
    fn finish(&self, success: bool) {
        let mut running = std::mem::take(&mut *self.listeners.borrow_mut());
        *self.in_flight.borrow_mut() = running.iter().map(|(id, _)| *id).collect();
        for (id, listener) in running.iter_mut() {
            if !self.removed.borrow().contains(id) {
                listener(success);
            }
        }

        let removed = std::mem::take(&mut *self.removed.borrow_mut());
        self.in_flight.borrow_mut().clear();
        running.retain(|(id, _)| !removed.contains(id));
        {
            let mut slot = self.listeners.borrow_mut();
            let added = std::mem::take(&mut *slot);
            running.extend(added);
            *slot = running;
        }
        self.state.set(EngineState::Idle);
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub trait Engine: Any {
    /// Registry key of this backend (`"lua"`, `"js"`).
    fn name(&self) -> &'static str;

    fn core(&self) -> &EngineCore;

    /// Compile and run `code`.  `Ok` carries the printable last result, if the
    /// chunk produced one.
    fn execute(&self, code: &str) -> Result<Option<String>, ScriptError>;

    /// Guest snippet that calls `onEvent(event)` if the guest defined it.
    fn event_snippet(&self, event: &str) -> String;

    fn as_any(&self) -> &dyn Any;

    /// Instantiate every script object flagged `"global"` and install it under
    /// its first alias (or its key).
    fn init_globals(&self, bridge: &Bridge) -> Result<(), BridgeError> {
        let _active = bridge.enter(self.name());
        for (key, aliases) in bridge.objects().flagged("global") {
            let Some(object) = bridge.create_object(&key) else { continue };
            let name = aliases.first().cloned().unwrap_or_else(|| key.clone());
            object.make_global(&name)?;
            tracing::debug!(target: "engine", engine = self.name(), global = %name, "installed global");
            self.core().globals.borrow_mut().push(object);
        }
        Ok(())
    }

    fn eval(&self, code: &str) -> bool {
        let core = self.core();
        if !core.begin() {
            core.report("Error: re-entrant evaluation is not supported");
            return false;
        }
        let _active = core.bridge().map(|b| b.enter(self.name()));

        let success = match self.execute(code) {
            Ok(last) => {
                if core.prints_last_result() {
                    if let Some(text) = last {
                        core.report(&text);
                    }
                }
                true
            }
            Err(err) => {
                tracing::debug!(target: "engine", engine = self.name(), %err, "evaluation failed");
                core.report(&format!("Error: {err}"));
                false
            }
        };

        core.finish(success);
        success
    }

    /// Call guest `onEvent(event)` if it exists.  Absence is success.
    fn raise_event(&self, event: &str) -> bool {
        let snippet = self.event_snippet(event);
        self.eval(&snippet)
    }

    fn print_last_result(&self) {
        self.core().print_last_result.set(true);
    }

    /// Run `listener` after every evaluation from now on.
    fn after_eval(&self, listener: AfterEvalListener) -> ListenerId {
        self.core().push_listener(listener)
    }

    /// Unregister a listener; `false` if it was not registered.  May be called
    /// from inside a listener.
    fn remove_after_eval(&self, id: ListenerId) -> bool {
        self.core().remove_listener(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend whose "guest language" is a single keyword per chunk.
    struct EchoEngine {
        core: EngineCore,
    }

    impl Engine for EchoEngine {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn core(&self) -> &EngineCore {
            &self.core
        }
        fn execute(&self, code: &str) -> Result<Option<String>, ScriptError> {
            match code {
                "fail" => Err(ScriptError::Runtime("boom".into())),
                "bad syntax" => Err(ScriptError::Compile("unexpected symbol".into())),
                other => Ok(Some(other.to_owned())),
            }
        }
        fn event_snippet(&self, event: &str) -> String {
            format!("event {event}")
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn engine() -> (Rc<EchoEngine>, Rc<BufferDelegate>) {
        let sink = Rc::new(BufferDelegate::default());
        let engine = Rc::new(EchoEngine { core: EngineCore::with_delegate(sink.clone()) });
        (engine, sink)
    }

    #[test]
    fn failure_is_reported_and_returns_false() {
        let (e, sink) = engine();
        assert!(!e.eval("fail"));
        assert_eq!(sink.lines(), vec!["Error: runtime error: boom"]);
        assert!(!e.eval("bad syntax"));
        assert!(e.eval("ok"));
        assert_eq!(e.core().state(), EngineState::Idle);
    }

    #[test]
    fn print_last_result_mode() {
        let (e, sink) = engine();
        assert!(e.eval("quiet"));
        assert!(sink.lines().is_empty());
        e.print_last_result();
        assert!(e.eval("loud"));
        assert_eq!(sink.lines(), vec!["loud"]);
    }

    #[test]
    fn listeners_run_in_order_after_every_eval() {
        let (e, _) = engine();
        let log: Rc<RefCell<Vec<(u8, bool)>>> = Rc::default();
        for id in 0..3u8 {
            let log = Rc::clone(&log);
            e.after_eval(Box::new(move |ok| log.borrow_mut().push((id, ok))));
        }

        e.eval("ok");
        e.eval("fail");
        assert_eq!(
            *log.borrow(),
            vec![(0, true), (1, true), (2, true), (0, false), (1, false), (2, false)]
        );
    }

    #[test]
    fn listener_registered_during_listener_runs_next_time() {
        let (e, _) = engine();
        let hits = Rc::new(Cell::new(0));
        let weak = Rc::downgrade(&e);
        let h = Rc::clone(&hits);
        let mut armed = true;
        e.after_eval(Box::new(move |_| {
            if std::mem::take(&mut armed) {
                if let Some(e) = weak.upgrade() {
                    let h = Rc::clone(&h);
                    e.after_eval(Box::new(move |_| h.set(h.get() + 1)));
                }
            }
        }));

        e.eval("one");
        assert_eq!(hits.get(), 0);
        e.eval("two");
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn reentrant_eval_is_rejected() {
        let (e, sink) = engine();
        e.core().begin();
        assert!(!e.eval("nested"));
        assert_eq!(sink.lines(), vec!["Error: re-entrant evaluation is not supported"]);
    }

    #[test]
    fn eval_from_a_listener_is_rejected_and_every_listener_still_runs() {
        let (e, sink) = engine();
        let weak = Rc::downgrade(&e);
        let nested = Rc::new(Cell::new(None));
        let calls = Rc::new(Cell::new(0));

        let (n, c) = (Rc::clone(&nested), Rc::clone(&calls));
        e.after_eval(Box::new(move |_| {
            c.set(c.get() + 1);
            if let Some(e) = weak.upgrade() {
                n.set(Some(e.eval("inner")));
            }
        }));
        let c = Rc::clone(&calls);
        e.after_eval(Box::new(move |_| c.set(c.get() + 1)));

        assert!(e.eval("outer"));
        assert_eq!(nested.get(), Some(false));
        assert_eq!(calls.get(), 2);
        assert_eq!(e.core().state(), EngineState::Idle);
        assert!(sink.lines().iter().any(|l| l.contains("re-entrant")));

        assert!(e.eval("again"));
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn removed_listeners_stop_running() {
        let (e, _) = engine();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let id = e.after_eval(Box::new(move |_| h.set(h.get() + 1)));
        e.eval("one");
        assert!(e.remove_after_eval(id));
        assert!(!e.remove_after_eval(id));
        e.eval("two");
        assert_eq!(hits.get(), 1);
        assert_eq!(e.core().listener_count(), 0);
    }

    #[test]
    fn listener_can_remove_itself_and_later_ones() {
        let (e, _) = engine();
        let log: Rc<RefCell<Vec<&str>>> = Rc::default();
        let ids: Rc<RefCell<Vec<ListenerId>>> = Rc::default();

        let (weak, l, i) = (Rc::downgrade(&e), Rc::clone(&log), Rc::clone(&ids));
        let first = e.after_eval(Box::new(move |_| {
            l.borrow_mut().push("first");
            if let Some(e) = weak.upgrade() {
                for id in i.borrow().iter() {
                    e.remove_after_eval(*id);
                }
            }
        }));
        let l = Rc::clone(&log);
        let second = e.after_eval(Box::new(move |_| l.borrow_mut().push("second")));
        let l = Rc::clone(&log);
        e.after_eval(Box::new(move |_| l.borrow_mut().push("third")));
        ids.borrow_mut().extend([first, second]);

        e.eval("one");
        e.eval("two");
        assert_eq!(*log.borrow(), vec!["first", "third", "third"]);
        assert_eq!(e.core().listener_count(), 1);
    }

    #[test]
    fn raise_event_goes_through_eval() {
        let (e, sink) = engine();
        e.print_last_result();
        assert!(e.raise_event("close"));
        assert_eq!(sink.lines(), vec!["event close"]);
    }
}
