//! Script objects: the backend-independent exposition surface.
//!
//! A [`ScriptObject`] is a bundle of named [`Function`]s, named
//! [`ObjectProperty`]s and an optional wrapped host value.  Alongside it lives
//! one [`InternalScriptObject`], the backend-specific realisation chosen from
//! the bridge's current default at construction time.  The realisation turns
//! the descriptor tables into guest-native bindings; the descriptors stay
//! owned by the script object.
//!
//! Backend trampolines hold only weak handles to the descriptors and go
//! through [`call_function`] / [`call_property`], so a binding that outlives
//! its object simply answers `Undefined`.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::bridge::{Bridge, BridgeError};
use crate::function::{Function, ObjectProperty};
use crate::value::Value;

/// Registry suffix of widget exposition types.
pub const WIDGET_SUFFIX: &str = "WidgetScriptObject";

// ── InternalScriptObject ──────────────────────────────────────────────────────

/// Backend realisation of a [`ScriptObject`].
///
/// `make_local` is backend-native (its return type is a guest value) and lives
/// on the concrete adapter types; this trait carries the backend-agnostic part.
pub trait InternalScriptObject: Any {
    /// Registry key of the engine backend this realisation belongs to.
    fn backend(&self) -> &'static str;

    /// Install the guest binding of `object` as global `name`.
    fn make_global(&self, name: &str, object: &ScriptObject) -> Result<(), BridgeError>;

    fn as_any(&self) -> &dyn Any;
}

// ── ScriptObject ──────────────────────────────────────────────────────────────

pub struct ScriptObject {
    type_name: String,
    functions: HashMap<String, Rc<RefCell<Function>>>,
    properties: HashMap<String, Rc<RefCell<ObjectProperty>>>,
    wrapped: Option<Rc<dyn Any>>,
    internal: Option<Box<dyn InternalScriptObject>>,
}

impl ScriptObject {
    /// Create an empty object realised by the backend of the engine running
    /// guest code (or the bridge's default backend), if any.
    pub fn new(bridge: &Bridge, type_name: impl Into<String>) -> Self {
        Self::with_internal(type_name, bridge.realisation())
    }

    /// Create an object with an explicit realisation (or none).
    pub fn with_internal(
        type_name: impl Into<String>,
        internal: Option<Box<dyn InternalScriptObject>>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            functions: HashMap::new(),
            properties: HashMap::new(),
            wrapped: None,
            internal,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Register method `name`.  A later registration under the same name
    /// replaces the earlier one.
    pub fn add_function(
        &mut self,
        name: &str,
        callable: impl FnMut(&[Value]) -> Value + 'static,
    ) -> &mut Self {
        if self.properties.contains_key(name) {
            tracing::warn!(target: "object", object = %self.type_name, name, "method shadows a property");
        }
        self.functions
            .insert(name.to_owned(), Rc::new(RefCell::new(Function::new(callable))));
        self
    }

    /// Register property `name`.
    pub fn add_property(
        &mut self,
        name: &str,
        getter: impl FnMut() -> Value + 'static,
        setter: impl FnMut(Value) -> Value + 'static,
    ) -> &mut Self {
        self.insert_property(name, ObjectProperty::new(getter, setter))
    }

    pub fn add_read_only_property(
        &mut self,
        name: &str,
        getter: impl FnMut() -> Value + 'static,
    ) -> &mut Self {
        self.insert_property(name, ObjectProperty::read_only(getter))
    }

    fn insert_property(&mut self, name: &str, property: ObjectProperty) -> &mut Self {
        if self.functions.contains_key(name) {
            tracing::warn!(target: "object", object = %self.type_name, name, "property shadows a method");
        }
        self.properties.insert(name.to_owned(), Rc::new(RefCell::new(property)));
        self
    }

    /// Attach a documentation string to method or property `name`.
    pub fn document(&mut self, name: &str, text: &str) -> &mut Self {
        if let Some(f) = self.functions.get(name) {
            f.borrow_mut().documentation(text);
        } else if let Some(p) = self.properties.get(name) {
            p.borrow_mut().documentation(text);
        }
        self
    }

    pub fn set_wrapped<T: Any>(&mut self, wrapped: Rc<T>) {
        self.wrapped = Some(wrapped);
    }

    /// The wrapped host value, if it is a `T`.
    pub fn get_wrapped<T: Any>(&self) -> Option<Rc<T>> {
        Rc::clone(self.wrapped.as_ref()?).downcast::<T>().ok()
    }

    pub fn internal(&self) -> Option<&dyn InternalScriptObject> {
        self.internal.as_deref()
    }

    /// Registry key of the backend realising this object.
    pub fn backend(&self) -> Option<&'static str> {
        self.internal.as_ref().map(|i| i.backend())
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &Rc<RefCell<Function>>)> {
        self.functions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &Rc<RefCell<ObjectProperty>>)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Call method `name` from the host side.  `None` if there is no such
    /// method or it is already running.
    pub fn call(&self, name: &str, args: impl IntoIterator<Item = Value>) -> Option<Value> {
        let f = self.functions.get(name)?;
        let mut f = f.try_borrow_mut().ok()?;
        Some(f.invoke(args))
    }

    /// Read property `name`; `Undefined` if absent.
    pub fn get(&self, name: &str) -> Value {
        self.properties
            .get(name)
            .and_then(|p| p.try_borrow_mut().ok().map(|mut p| p.get()))
            .unwrap_or_default()
    }

    /// Write property `name`; returns the setter's result.
    pub fn set(&self, name: &str, value: impl Into<Value>) -> Value {
        self.properties
            .get(name)
            .and_then(|p| p.try_borrow_mut().ok().map(|mut p| p.set(Some(value.into()))))
            .unwrap_or_default()
    }

    /// Install this object as guest global `name` through its realisation.
    pub fn make_global(&self, name: &str) -> Result<(), BridgeError> {
        let internal = self
            .internal
            .as_ref()
            .ok_or_else(|| BridgeError::NotRealised(self.type_name.clone()))?;
        internal.make_global(name, self)
    }

    /// `(name, kind, doc)` for every method and property, sorted by name.
    pub fn describe(&self) -> Vec<(String, &'static str, Option<String>)> {
        let mut out: Vec<_> = self
            .functions
            .iter()
            .map(|(n, f)| (n.clone(), "function", f.borrow().doc().map(str::to_owned)))
            .chain(self.properties.iter().map(|(n, p)| {
                (n.clone(), "property", p.borrow().doc().map(str::to_owned))
            }))
            .collect();
        out.sort();
        out
    }
}

impl fmt::Debug for ScriptObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptObject")
            .field("type_name", &self.type_name)
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

// ── Trampolines ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    #[error("host function is already running")]
    Busy,
}

/// Forward a guest call to the descriptor behind `desc`.
///
/// A descriptor whose object is gone answers `Undefined`.
pub fn call_function(
    desc: &Weak<RefCell<Function>>,
    args: impl IntoIterator<Item = Value>,
) -> Result<Value, CallError> {
    let Some(f) = desc.upgrade() else { return Ok(Value::Undefined) };
    let mut f = f.try_borrow_mut().map_err(|_| CallError::Busy)?;
    Ok(f.invoke(args))
}

/// Property call convention: no arguments reads, otherwise the first
/// argument is written.
pub fn call_property(desc: &Weak<RefCell<ObjectProperty>>, args: Vec<Value>) -> Result<Value, CallError> {
    let Some(p) = desc.upgrade() else { return Ok(Value::Undefined) };
    let mut p = p.try_borrow_mut().map_err(|_| CallError::Busy)?;
    if args.is_empty() {
        Ok(p.get())
    } else {
        Ok(p.set(args))
    }
}

/// Getter half of [`call_property`] for backends with real accessors.
pub fn get_property(desc: &Weak<RefCell<ObjectProperty>>) -> Result<Value, CallError> {
    call_property(desc, Vec::new())
}

/// Setter half of [`call_property`].  Anything but exactly one argument is
/// ignored.
pub fn set_property(desc: &Weak<RefCell<ObjectProperty>>, args: Vec<Value>) -> Result<Value, CallError> {
    if args.len() != 1 {
        return Ok(Value::Undefined);
    }
    call_property(desc, args)
}

// ── Naming ────────────────────────────────────────────────────────────────────

/// Registry key of the widget exposition type for guest tag `tag`:
/// `"lAbEl"` → `"LabelWidgetScriptObject"`.
pub fn widget_registry_key(tag: &str) -> Option<String> {
    let lower = tag.to_lowercase();
    let mut chars = lower.chars();
    let first = chars.next()?;
    let mut key: String = first.to_uppercase().collect();
    key.push_str(chars.as_str());
    key.push_str(WIDGET_SUFFIX);
    Some(key)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
