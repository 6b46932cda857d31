//! JavaScript backend via the `rquickjs` crate (QuickJS).
//!
//! Enabled with the `js` Cargo feature (on by default).  Registered as engine
//! `"js"` (alias `"javascript"`).
//!
//! # Guest view of script objects
//!
//! A script object becomes a plain JS object.  Methods are functions;
//! properties are real accessors defined with `Object.defineProperty`:
//!
//! ```js
//! const dlg = app.createDialog("settings");
//! dlg.title = "Settings";
//! dlg.addLabel("Name", "name");
//! ```
//!
//! The setter forwards only when assigned exactly one value; the getter is
//! always called with none.
//!
//! # Value mapping
//!
//! | JS                          | Host                 |
//! |-----------------------------|----------------------|
//! | `undefined`, `null`         | `Undefined`          |
//! | boolean                     | `Int(0 \| 1)`        |
//! | int                         | `Int`                |
//! | float                       | `Double`             |
//! | string                      | `Str`                |
//! | object, function, symbol …  | `Undefined`          |
//! | object built by `make_local`| ← `Object`           |
//!
//! QuickJS keeps an int/float tag on every number.  Host doubles are always
//! created float-tagged, so `Double(2.0)` comes back as `Double(2.0)`.

#[cfg(feature = "js")]
pub use js_impl::{make_local, register, to_guest_value, to_host_value, JsEngine, JsScriptObject};

#[cfg(feature = "js")]
mod js_impl {
    use std::any::Any;
    use std::rc::{Rc, Weak};

    use rquickjs::convert::Coerced;
    use rquickjs::function::Rest;
    use rquickjs::{qjs, CaughtError, Context, Ctx, Exception, Function, IntoJs, Object, Runtime};

    use crate::bridge::{Bridge, BridgeError};
    use crate::engine::{Engine, EngineCore, ScriptError};
    use crate::object::{call_function, get_property, set_property, CallError, InternalScriptObject, ScriptObject};
    use crate::value::{quote_guest_string, Value};

    pub const ENGINE_KEY: &str = "js";
    pub const INTERNAL_KEY: &str = "JsScriptObject";

    const DEFINE_ACCESSOR: &str = "(function (o, n, g, s) { \
        Object.defineProperty(o, n, { get: g, set: s, enumerable: true, configurable: true }); })";

    // ── Marshaling ────────────────────────────────────────────────────────

    pub fn to_host_value(value: &rquickjs::Value<'_>) -> Value {
        if value.is_undefined() || value.is_null() {
            return Value::Undefined;
        }
        if let Some(b) = value.as_bool() {
            return Value::from(b);
        }
        if let Some(n) = value.as_int() {
            return Value::Int(n);
        }
        if let Some(x) = value.as_float() {
            return Value::Double(x);
        }
        if let Some(s) = value.as_string() {
            return s.to_string().map(Value::Str).unwrap_or_default();
        }
        Value::Undefined
    }

    /// A float-tagged number.  `Value::new_float` folds whole numbers into
    /// ints, which would read back as `Int`.
    fn float<'js>(ctx: &Ctx<'js>, x: f64) -> rquickjs::Value<'js> {
        // SAFETY: a float64 JSValue carries no heap reference, so there is
        // no reference count to own.
        unsafe { rquickjs::Value::from_raw(ctx.clone(), qjs::__JS_NewFloat64(x)) }
    }

    pub fn to_guest_value<'js>(ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<rquickjs::Value<'js>> {
        match value {
            Value::Undefined => Ok(rquickjs::Value::new_undefined(ctx.clone())),
            Value::Int(n) => Ok(rquickjs::Value::new_int(ctx.clone(), *n)),
            Value::Double(x) => Ok(float(ctx, *x)),
            Value::Str(s) => s.as_str().into_js(ctx),
            Value::Object(r) => match r.upgrade() {
                Some(object) if object.backend() == Some(ENGINE_KEY) => {
                    Ok(make_local(ctx, &object)?.into_value())
                }
                _ => Ok(rquickjs::Value::new_undefined(ctx.clone())),
            },
        }
    }

    fn host_args(args: Rest<rquickjs::Value<'_>>) -> Vec<Value> {
        args.0.iter().map(to_host_value).collect()
    }

    fn throw(ctx: &Ctx<'_>, err: CallError) -> rquickjs::Error {
        Exception::throw_message(ctx, &err.to_string())
    }

    fn coerce(value: &rquickjs::Value<'_>) -> String {
        value.get::<Coerced<String>>().map(|c| c.0).unwrap_or_default()
    }

    /// Convert a failed evaluation into the pending exception it raised.
    fn caught(ctx: &Ctx<'_>, err: rquickjs::Error) -> ScriptError {
        match CaughtError::from_error(ctx, err) {
            CaughtError::Exception(ex) => {
                let name: String = ex.as_object().get("name").unwrap_or_default();
                let text = match ex.message() {
                    Some(msg) if !name.is_empty() => format!("{name}: {msg}"),
                    Some(msg) => msg,
                    None => name.clone(),
                };
                if name == "SyntaxError" {
                    ScriptError::Compile(text)
                } else {
                    ScriptError::Runtime(text)
                }
            }
            CaughtError::Value(v) => ScriptError::Runtime(coerce(&v)),
            CaughtError::Error(e) => ScriptError::Runtime(e.to_string()),
        }
    }

    // ── JsScriptObject ────────────────────────────────────────────────────

    /// Guest object exposing every method and property of `object`.
    pub fn make_local<'js>(ctx: &Ctx<'js>, object: &ScriptObject) -> rquickjs::Result<Object<'js>> {
        let local = Object::new(ctx.clone())?;

        for (name, function) in object.functions() {
            let desc = Rc::downgrade(function);
            let trampoline = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<rquickjs::Value<'js>>| -> rquickjs::Result<rquickjs::Value<'js>> {
                    let result = call_function(&desc, host_args(args)).map_err(|e| throw(&ctx, e))?;
                    to_guest_value(&ctx, &result)
                },
            )?;
            local.set(name, trampoline)?;
        }

        if object.properties().next().is_none() {
            return Ok(local);
        }
        let define: Function = ctx.eval(DEFINE_ACCESSOR)?;
        for (name, property) in object.properties() {
            let desc = Rc::downgrade(property);
            let getter = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>| -> rquickjs::Result<rquickjs::Value<'js>> {
                    let result = get_property(&desc).map_err(|e| throw(&ctx, e))?;
                    to_guest_value(&ctx, &result)
                },
            )?;
            let desc = Rc::downgrade(property);
            let setter = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, args: Rest<rquickjs::Value<'js>>| -> rquickjs::Result<rquickjs::Value<'js>> {
                    let result = set_property(&desc, host_args(args)).map_err(|e| throw(&ctx, e))?;
                    to_guest_value(&ctx, &result)
                },
            )?;
            define.call::<_, ()>((local.clone(), name, getter, setter))?;
        }
        Ok(local)
    }

    /// JS realisation of a script object.
    pub struct JsScriptObject {
        context: Weak<Context>,
    }

    impl JsScriptObject {
        pub fn new(context: Weak<Context>) -> Self {
            Self { context }
        }

        /// Realisation bound to the bridge's current JS engine, if any.
        pub fn current(bridge: &Bridge) -> Self {
            let context = bridge
                .current_engine(Some(ENGINE_KEY))
                .and_then(|e| e.as_any().downcast_ref::<JsEngine>().map(|j| Rc::downgrade(&j.context)))
                .unwrap_or_default();
            Self { context }
        }
    }

    impl InternalScriptObject for JsScriptObject {
        fn backend(&self) -> &'static str {
            ENGINE_KEY
        }

        fn make_global(&self, name: &str, object: &ScriptObject) -> Result<(), BridgeError> {
            let context = self
                .context
                .upgrade()
                .ok_or_else(|| BridgeError::Binding(format!("{name}: no JS context")))?;
            context
                .with(|ctx| -> rquickjs::Result<()> {
                    let local = make_local(&ctx, object)?;
                    ctx.globals().set(name, local)
                })
                .map_err(|e| BridgeError::Binding(format!("{name}: {e}")))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    // ── JsEngine ──────────────────────────────────────────────────────────

    /// A QuickJS runtime with one full context.
    pub struct JsEngine {
        core: EngineCore,
        // Dropped before the runtime.
        context: Rc<Context>,
        _runtime: Runtime,
    }

    impl JsEngine {
        pub fn new(bridge: &Bridge) -> Result<Self, BridgeError> {
            let init = |e: rquickjs::Error| BridgeError::BackendInit {
                backend: ENGINE_KEY.to_owned(),
                message: e.to_string(),
            };
            let runtime = Runtime::new().map_err(init)?;
            let context = Context::full(&runtime).map_err(init)?;
            Ok(Self { core: EngineCore::new(bridge), context: Rc::new(context), _runtime: runtime })
        }

        pub fn context(&self) -> &Context {
            &self.context
        }
    }

    impl Engine for JsEngine {
        fn name(&self) -> &'static str {
            ENGINE_KEY
        }

        fn core(&self) -> &EngineCore {
            &self.core
        }

        fn execute(&self, code: &str) -> Result<Option<String>, ScriptError> {
            let print = self.core.prints_last_result();
            self.context.with(|ctx| match ctx.eval::<rquickjs::Value, _>(code) {
                Ok(v) if print && !v.is_undefined() => Ok(Some(coerce(&v))),
                Ok(_) => Ok(None),
                Err(e) => Err(caught(&ctx, e)),
            })
        }

        fn event_snippet(&self, event: &str) -> String {
            format!("if (typeof onEvent === \"function\") {{ onEvent({}); }}", quote_guest_string(event))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub fn register(bridge: &Bridge) -> Result<(), BridgeError> {
        bridge.engines().register(ENGINE_KEY, &["javascript"], |b| {
            JsEngine::new(b).map(|e| Rc::new(e) as Rc<dyn Engine>)
        })?;
        bridge.internals().register(INTERNAL_KEY, &[ENGINE_KEY], |b| {
            Box::new(JsScriptObject::current(b)) as Box<dyn InternalScriptObject>
        })?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
