//! Native callable descriptors exposed to guest code.
//!
//! A [`Function`] owns its host callable plus an argument buffer and a result
//! slot.  Backend trampolines refill the buffer on every call, in guest call
//! order, run the callable, and marshal `result` back to the guest.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::value::Value;

type Callable = Box<dyn FnMut(&[Value]) -> Value>;

// ── Function ──────────────────────────────────────────────────────────────────

pub struct Function {
    /// Positional arguments of the call in flight.  Empty between calls.
    pub arguments: Vec<Value>,
    /// Result of the most recent call.
    pub result: Value,
    callable: Callable,
    doc: Option<String>,
}

impl Function {
    pub fn new(callable: impl FnMut(&[Value]) -> Value + 'static) -> Self {
        Self {
            arguments: Vec::new(),
            result: Value::Undefined,
            callable: Box::new(callable),
            doc: None,
        }
    }

    /// Run the host callable against the current `arguments`.
    pub fn call(&mut self) {
        self.result = (self.callable)(&self.arguments);
    }

    /// Clear the argument buffer, append `args` in order, call, and return the
    /// result.  The buffer is cleared again afterwards so it never outlives the
    /// call it belongs to.
    pub fn invoke(&mut self, args: impl IntoIterator<Item = Value>) -> Value {
        self.arguments.clear();
        self.arguments.extend(args);
        self.call();
        self.arguments.clear();
        self.result.clone()
    }

    pub fn documentation(&mut self, text: impl Into<String>) -> &mut Self {
        self.doc = Some(text.into());
        self
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("arguments", &self.arguments)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}

// ── ObjectProperty ────────────────────────────────────────────────────────────

/// A getter/setter pair.
///
/// The getter is always called with no arguments.  The setter is called with
/// exactly one argument; calling it with none does nothing.  By convention the
/// setter's result is the value just stored.
#[derive(Debug)]
pub struct ObjectProperty {
    pub getter: Function,
    pub setter: Function,
    doc: Option<String>,
}

impl ObjectProperty {
    pub fn new(
        mut getter: impl FnMut() -> Value + 'static,
        mut setter: impl FnMut(Value) -> Value + 'static,
    ) -> Self {
        Self {
            getter: Function::new(move |_| getter()),
            setter: Function::new(move |args| match args.first() {
                Some(v) => setter(v.clone()),
                None => Value::Undefined,
            }),
            doc: None,
        }
    }

    /// A property whose setter stores nothing and answers with the current
    /// value.
    pub fn read_only(getter: impl FnMut() -> Value + 'static) -> Self {
        let getter = Rc::new(RefCell::new(getter));
        let for_setter = Rc::clone(&getter);
        Self::new(
            move || (*getter.borrow_mut())(),
            move |_| (*for_setter.borrow_mut())(),
        )
    }

    pub fn get(&mut self) -> Value {
        self.getter.invoke(std::iter::empty())
    }

    /// Store the first of `args`.  No arguments means nothing to set.
    pub fn set(&mut self, args: impl IntoIterator<Item = Value>) -> Value {
        match args.into_iter().next() {
            Some(v) => self.setter.invoke(std::iter::once(v)),
            None => Value::Undefined,
        }
    }

    pub fn documentation(&mut self, text: impl Into<String>) -> &mut Self {
        self.doc = Some(text.into());
        self
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
