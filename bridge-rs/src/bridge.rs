//! The bridge hub: capability registries plus host services.
//!
//! A [`Bridge`] is created once per process (per thread, really: everything
//! here is single-threaded and `Rc`-based) and passed to whoever needs to
//! register or resolve capabilities.  It owns:
//!
//! | Registry      | Produces                         | Typical keys                 |
//! |---------------|----------------------------------|------------------------------|
//! | `engines`     | `Rc<dyn Engine>`                 | `lua`, `js`                  |
//! | `objects`     | `Rc<ScriptObject>`               | `DialogScriptObject`, `LabelWidgetScriptObject` |
//! | `internals`   | `Box<dyn InternalScriptObject>`  | `LuaScriptObject`, `JsScriptObject` |
//! | `delegates`   | `Rc<dyn EngineDelegate>`         | `log`, `stdout`, `buffer`    |
//!
//! and the host services the dialog layer consumes: the deferred-task
//! [`TaskScheduler`], the headless [`Desktop`] and the id → window
//! [`DialogIndex`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::dialog::DialogIndex;
use crate::engine::{BufferDelegate, Engine, EngineDelegate, LogDelegate, StdoutDelegate};
use crate::gui::Desktop;
use crate::object::{InternalScriptObject, ScriptObject};
use crate::registry::{Registry, RegistryError};
use crate::scheduler::TaskScheduler;

pub type EngineResult = Result<Rc<dyn Engine>, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("backend {backend:?} failed to initialise: {message}")]
    BackendInit { backend: String, message: String },
    #[error("{0} has no backend realisation")]
    NotRealised(String),
    #[error("binding failed: {0}")]
    Binding(String),
}

// ── Bridge ────────────────────────────────────────────────────────────────────

pub struct Bridge {
    this: Weak<Bridge>,
    engines: Registry<EngineResult>,
    objects: Registry<Rc<ScriptObject>>,
    internals: Registry<Box<dyn InternalScriptObject>>,
    delegates: Registry<Rc<dyn EngineDelegate>>,
    /// backend key → engine currently providing it
    current: RefCell<HashMap<String, Weak<dyn Engine>>>,
    /// Backends running guest code, innermost last.
    active: RefCell<Vec<&'static str>>,
    scheduler: TaskScheduler,
    desktop: Rc<Desktop>,
    dialogs: DialogIndex,
}

impl Bridge {
    /// An empty bridge: no registrations at all.
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            this: this.clone(),
            engines: Registry::new("Engine"),
            objects: Registry::new("ScriptObject"),
            internals: Registry::new("InternalScriptObject"),
            delegates: Registry::new("EngineDelegate"),
            current: RefCell::new(HashMap::new()),
            active: RefCell::new(Vec::new()),
            scheduler: TaskScheduler::new(),
            desktop: Rc::new(Desktop::new()),
            dialogs: DialogIndex::new(),
        })
    }

    /// A bridge with every built-in registration: console sinks, compiled-in
    /// backends, the global `app`/`console` objects, dialogs and widgets.
    pub fn with_builtins() -> Result<Rc<Self>, BridgeError> {
        let bridge = Self::new();
        bridge.register_builtins()?;
        Ok(bridge)
    }

    pub fn register_builtins(&self) -> Result<(), BridgeError> {
        self.delegates
            .register("log", &[], |_| Rc::new(LogDelegate) as Rc<dyn EngineDelegate>)?;
        self.delegates
            .register("stdout", &[], |_| Rc::new(StdoutDelegate) as Rc<dyn EngineDelegate>)?;
        self.delegates.register("buffer", &[], |_| {
            Rc::new(BufferDelegate::default()) as Rc<dyn EngineDelegate>
        })?;

        #[cfg(feature = "lua")]
        crate::lua::register(self)?;
        #[cfg(feature = "js")]
        crate::js::register(self)?;

        crate::api::register(self)?;
        crate::dialog::register(self)?;
        crate::widgets::register(self)?;
        Ok(())
    }

    /// Weak handle for closures that must not keep the bridge alive.
    pub fn handle(&self) -> Weak<Bridge> {
        self.this.clone()
    }

    pub fn engines(&self) -> &Registry<EngineResult> {
        &self.engines
    }

    pub fn objects(&self) -> &Registry<Rc<ScriptObject>> {
        &self.objects
    }

    pub fn internals(&self) -> &Registry<Box<dyn InternalScriptObject>> {
        &self.internals
    }

    pub fn delegates(&self) -> &Registry<Rc<dyn EngineDelegate>> {
        &self.delegates
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    pub fn desktop(&self) -> &Rc<Desktop> {
        &self.desktop
    }

    pub fn dialogs(&self) -> &DialogIndex {
        &self.dialogs
    }

    // ── Engines ───────────────────────────────────────────────────────────────

    /// Construct the engine registered under `key` (or the default key), make
    /// it current for its backend and install its globals.
    ///
    /// `Ok(None)` if no such backend is registered.  Initialisation failures
    /// are returned as errors; no other backend is tried.
    pub fn create_engine(&self, key: Option<&str>) -> Result<Option<Rc<dyn Engine>>, BridgeError> {
        let Some(engine) = self.engines.resolve(self, key).transpose()? else {
            tracing::warn!(target: "engine", key = ?key, "no engine registered");
            return Ok(None);
        };
        self.provide(&engine);
        engine.core().bind(self);
        engine.init_globals(self)?;
        tracing::info!(target: "engine", engine = engine.name(), "engine ready");
        Ok(Some(engine))
    }

    /// Make `engine` the current provider for its backend key, and its
    /// backend the default for unqualified engine and realisation requests
    /// made while no guest code is running.
    pub fn provide(&self, engine: &Rc<dyn Engine>) {
        let name = engine.name();
        self.current.borrow_mut().insert(name.to_owned(), Rc::downgrade(engine));
        self.engines.set_default(name);
        // Realisations are registered with the backend key as an alias.
        if self.internals.contains(name) {
            self.internals.set_default(name);
        }
    }

    /// The live engine currently providing `key` (or the default engine key).
    pub fn current_engine(&self, key: Option<&str>) -> Option<Rc<dyn Engine>> {
        let key = match key {
            Some(k) => self.engines.canonical(k).unwrap_or_else(|| k.to_owned()),
            None => self.engines.default_key()?,
        };
        self.current.borrow().get(&key)?.upgrade()
    }

    /// Mark `backend` as running guest code until the guard is dropped.
    pub fn enter(&self, backend: &'static str) -> ActiveBackend {
        self.active.borrow_mut().push(backend);
        ActiveBackend { bridge: self.handle() }
    }

    /// Backend key of the innermost engine running guest code.
    pub fn active_backend(&self) -> Option<&'static str> {
        self.active.borrow().last().copied()
    }

    /// The engine whose guest code is running, or the default engine when
    /// none is.  Objects created on a guest's behalf belong to this engine.
    pub fn calling_engine(&self) -> Option<Rc<dyn Engine>> {
        match self.active_backend() {
            Some(key) => self.current_engine(Some(key)),
            None => self.current_engine(None),
        }
    }

    /// Realisation for a new script object: the calling engine's backend if
    /// it has one, else the default.
    pub fn realisation(&self) -> Option<Box<dyn InternalScriptObject>> {
        let key = self.active_backend().filter(|k| self.internals.contains(k));
        self.internals.resolve(self, key)
    }

    // ── Objects ───────────────────────────────────────────────────────────────

    /// Instantiate the script object registered under `type_name`.
    pub fn create_object(&self, type_name: &str) -> Option<Rc<ScriptObject>> {
        self.objects.resolve(self, Some(type_name))
    }
}

/// Guard returned by [`Bridge::enter`].
pub struct ActiveBackend {
    bridge: Weak<Bridge>,
}

impl Drop for ActiveBackend {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.upgrade() {
            bridge.active.borrow_mut().pop();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineCore, ScriptError};
    use std::any::Any;

    struct NullEngine {
        core: EngineCore,
    }

    impl Engine for NullEngine {
        fn name(&self) -> &'static str {
            "null"
        }
        fn core(&self) -> &EngineCore {
            &self.core
        }
        fn execute(&self, _code: &str) -> Result<Option<String>, ScriptError> {
            Ok(None)
        }
        fn event_snippet(&self, event: &str) -> String {
            event.to_owned()
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn null_factory(bridge: &Bridge) -> EngineResult {
        Ok(Rc::new(NullEngine { core: EngineCore::new(bridge) }))
    }

    #[test]
    fn duplicate_engine_registration_is_rejected() {
        let bridge = Bridge::new();
        bridge.engines().register("null", &[], null_factory).unwrap();
        assert!(bridge.engines().register("null", &[], null_factory).is_err());
    }

    #[test]
    fn duplicate_object_registration_is_rejected() {
        let bridge = Bridge::new();
        let make = |b: &Bridge| Rc::new(ScriptObject::new(b, "Thing"));
        bridge.objects().register("ThingScriptObject", &[], make).unwrap();
        assert!(matches!(
            bridge.objects().register("ThingScriptObject", &[], make),
            Err(RegistryError::Duplicate { .. })
        ));
    }

    #[test]
    fn unknown_engine_is_absent() {
        let bridge = Bridge::new();
        assert!(bridge.create_engine(Some("cobol")).unwrap().is_none());
        assert!(bridge.current_engine(None).is_none());
    }

    #[test]
    fn created_engine_becomes_current_until_dropped() {
        let bridge = Bridge::new();
        bridge.engines().register("null", &["nil"], null_factory).unwrap();
        let engine = bridge.create_engine(None).unwrap().unwrap();

        let current = bridge.current_engine(Some("nil")).unwrap();
        assert!(Rc::ptr_eq(&engine, &current));
        drop(current);
        drop(engine);
        assert!(bridge.current_engine(None).is_none());
    }

    #[test]
    fn backend_init_failure_is_an_error() {
        let bridge = Bridge::new();
        bridge
            .engines()
            .register("broken", &[], |_| {
                Err(BridgeError::BackendInit { backend: "broken".into(), message: "no vm".into() })
            })
            .unwrap();
        assert!(matches!(bridge.create_engine(None), Err(BridgeError::BackendInit { .. })));
    }

    #[test]
    fn active_backend_nests_and_unwinds() {
        let bridge = Bridge::new();
        assert_eq!(bridge.active_backend(), None);
        {
            let _outer = bridge.enter("lua");
            {
                let _inner = bridge.enter("js");
                assert_eq!(bridge.active_backend(), Some("js"));
            }
            assert_eq!(bridge.active_backend(), Some("lua"));
        }
        assert_eq!(bridge.active_backend(), None);
    }

    #[test]
    fn calling_engine_wins_over_the_default() {
        let bridge = Bridge::new();
        bridge.engines().register("null", &[], null_factory).unwrap();
        bridge.engines().register("other", &[], null_factory).unwrap();
        let first = bridge.create_engine(Some("null")).unwrap().unwrap();
        // Same backend type, but "other" is now the default key.
        bridge.engines().set_default("other");
        assert!(bridge.calling_engine().is_none());

        let _active = bridge.enter("null");
        assert!(Rc::ptr_eq(&bridge.calling_engine().unwrap(), &first));
    }

    #[test]
    fn builtins_register_once() {
        let bridge = Bridge::with_builtins().unwrap();
        assert!(bridge.objects().contains("DialogScriptObject"));
        assert!(bridge.objects().contains("LabelWidgetScriptObject"));
        assert!(bridge.register_builtins().is_err());
    }
}
