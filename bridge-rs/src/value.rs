//! Values carried across the host/guest boundary.
//!
//! Every backend adapter converts its native values to and from [`Value`].
//! Numeric kinds interconvert freely; strings never coerce to numbers here
//! (a backend may coerce before or after marshaling, the bridge does not).
//!
//! `Int` is 32-bit so every host integer fits a guest integer in each
//! backend.  A whole-number `Double` stays a `Double`; backends must keep
//! the float tag when marshaling it.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::object::ScriptObject;

// ── ObjectRef ─────────────────────────────────────────────────────────────────

/// Non-owning reference to a [`ScriptObject`].
///
/// The referent is owned elsewhere (an engine's globals, a dialog's widget
/// table, the `app` object's dialog list).  It must be resolved with
/// [`ObjectRef::upgrade`] before use; a dead reference marshals as
/// `Undefined`.
#[derive(Clone, Default)]
pub struct ObjectRef(Weak<ScriptObject>);

impl ObjectRef {
    pub fn new(object: &Rc<ScriptObject>) -> Self {
        Self(Rc::downgrade(object))
    }

    /// A reference that never resolves.
    pub fn dangling() -> Self {
        Self(Weak::new())
    }

    pub fn upgrade(&self) -> Option<Rc<ScriptObject>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(obj) => write!(f, "ObjectRef({})", obj.type_name()),
            None => f.write_str("ObjectRef(<dead>)"),
        }
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A value crossing the bridge.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Int(i32),
    Double(f64),
    Str(String),
    Object(ObjectRef),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Double(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Object(r) => match r.upgrade() {
                Some(obj) => write!(f, "[object {}]", obj.type_name()),
                None => f.write_str("undefined"),
            },
        }
    }
}

impl Value {
    /// An `Object` value referring to `object`.
    pub fn object(object: &Rc<ScriptObject>) -> Self {
        Value::Object(ObjectRef::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Integer view of a numeric value (doubles truncate toward zero and
    /// saturate at the `i32` bounds).
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Double(x) => Some(*x as i32),
            _ => None,
        }
    }

    /// Floating-point view of a numeric value.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(f64::from(*n)),
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Resolve an `Object` value to its live script object.
    pub fn as_object(&self) -> Option<Rc<ScriptObject>> {
        match self {
            Value::Object(r) => r.upgrade(),
            _ => None,
        }
    }

    /// Truthiness used by host callables: non-zero numbers, non-empty
    /// strings and live objects.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Int(n) => *n != 0,
            Value::Double(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Object(r) => r.is_alive(),
        }
    }

    /// Name of the kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
        }
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

/// Integers outside the `i32` range become doubles.
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        i32::try_from(n).map(Value::Int).unwrap_or(Value::Double(n as f64))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Int(if b { 1 } else { 0 })
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

// ── Argument helpers ──────────────────────────────────────────────────────────

/// Positional argument `index`, or `Undefined` when the guest passed fewer.
pub fn arg(args: &[Value], index: usize) -> &Value {
    const UNDEFINED: &Value = &Value::Undefined;
    args.get(index).unwrap_or(UNDEFINED)
}

/// Positional string argument; non-strings read as empty.
pub fn arg_str(args: &[Value], index: usize) -> String {
    arg(args, index).as_str().unwrap_or_default().to_owned()
}

/// Positional integer argument with a default for missing/non-numeric values.
pub fn arg_int(args: &[Value], index: usize, default: i32) -> i32 {
    arg(args, index).as_int().unwrap_or(default)
}

/// Quote `s` as a double-quoted string literal valid in both Lua and
/// JavaScript source.
pub fn quote_guest_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_kinds() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Double(1.0).to_string(), "1.0");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Str("hi".into()).to_string(), "hi");
        assert_eq!(Value::Undefined.to_string(), "undefined");
    }

    #[test]
    fn numeric_kinds_interconvert() {
        assert_eq!(Value::Int(3).as_double(), Some(3.0));
        assert_eq!(Value::Double(3.9).as_int(), Some(3));
        assert_eq!(Value::Double(1e12).as_int(), Some(i32::MAX));
    }

    #[test]
    fn wide_integers_become_doubles() {
        assert_eq!(Value::from(7_i64), Value::Int(7));
        assert_eq!(Value::from(1_i64 << 40), Value::Double((1_i64 << 40) as f64));
        assert_ne!(Value::Int(2), Value::Double(2.0));
    }

    #[test]
    fn no_string_number_coercion() {
        assert_eq!(Value::Str("42".into()).as_int(), None);
        assert_eq!(Value::Int(42).as_str(), None);
    }

    #[test]
    fn dead_object_ref() {
        let v = Value::Object(ObjectRef::dangling());
        assert!(v.as_object().is_none());
        assert!(!v.truthy());
        assert_eq!(v.to_string(), "undefined");
    }

    #[test]
    fn arg_helpers_default_missing() {
        let args = vec![Value::from("a"), Value::Int(7)];
        assert_eq!(arg_str(&args, 0), "a");
        assert_eq!(arg_int(&args, 1, 0), 7);
        assert_eq!(arg_int(&args, 5, -1), -1);
        assert!(arg(&args, 9).is_undefined());
    }

    #[test]
    fn from_impls() {
        assert_eq!(Value::from(true), Value::Int(1));
        assert_eq!(Value::from(None::<i32>), Value::Undefined);
        assert_eq!(Value::from(Some("x")), Value::Str("x".into()));
    }

    #[test]
    fn quoting_escapes_delimiters() {
        assert_eq!(quote_guest_string("close"), "\"close\"");
        assert_eq!(quote_guest_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
    }
}
