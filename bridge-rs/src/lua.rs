//! Lua 5.4 backend via the `mlua` crate.
//!
//! Enabled with the `lua` Cargo feature (on by default):
//! ```text
//! cargo build --features lua
//! cargo test  --features lua
//! ```
//!
//! # Guest view of script objects
//!
//! A script object becomes a plain Lua table.  Methods are functions;
//! properties are getter/setter functions following the property call
//! convention (no argument reads, one argument writes):
//!
//! ```lua
//! local dlg = app.createDialog("settings")
//! dlg.title("Settings")          -- write
//! print(dlg.title())             -- read
//! dlg:addLabel("Name", "name")   -- method syntax works too
//! ```
//!
//! A `:` call passes the receiver table first.  It is dropped only when it is
//! the very table the method was read from; any other leading table is an
//! ordinary argument and reaches the host as `Undefined`.
//!
//! # Value mapping
//!
//! | Lua                         | Host                 |
//! |-----------------------------|----------------------|
//! | `nil`                       | `Undefined`          |
//! | boolean                     | `Int(0 \| 1)`        |
//! | integer                     | `Int`                |
//! | float                       | `Double`             |
//! | string                      | `Str` (lossy UTF-8)  |
//! | table, function, userdata … | `Undefined`          |
//! | table built by `make_local` | ← `Object`           |

#[cfg(feature = "lua")]
pub use lua_impl::{make_local, register, to_guest_value, to_host_value, LuaEngine, LuaScriptObject};

#[cfg(feature = "lua")]
mod lua_impl {
    use std::any::Any;
    use std::rc::{Rc, Weak};
    use std::sync::atomic::{AtomicI64, Ordering};

    use mlua::prelude::*;

    use crate::bridge::{Bridge, BridgeError};
    use crate::engine::{Engine, EngineCore, ScriptError};
    use crate::object::{call_function, call_property, InternalScriptObject, ScriptObject};
    use crate::value::{quote_guest_string, Value};

    pub const ENGINE_KEY: &str = "lua";
    pub const INTERNAL_KEY: &str = "LuaScriptObject";

    /// Registry key of the weak-keyed table mapping each `make_local` table
    /// to its receiver id.
    const RECEIVERS: &str = "scriptbridge.receivers";

    static NEXT_RECEIVER: AtomicI64 = AtomicI64::new(1);

    // ── Marshaling ────────────────────────────────────────────────────────

    pub fn to_host_value(value: &LuaValue) -> Value {
        match value {
            LuaValue::Nil => Value::Undefined,
            LuaValue::Boolean(b) => Value::from(*b),
            LuaValue::Integer(n) => Value::from(*n),
            LuaValue::Number(x) => Value::Double(*x),
            LuaValue::String(s) => Value::Str(s.to_string_lossy().to_string()),
            _ => Value::Undefined,
        }
    }

    pub fn to_guest_value(lua: &Lua, value: &Value) -> LuaResult<LuaValue> {
        Ok(match value {
            Value::Undefined => LuaValue::Nil,
            Value::Int(n) => LuaValue::Integer((*n).into()),
            Value::Double(x) => LuaValue::Number(*x),
            Value::Str(s) => LuaValue::String(lua.create_string(s)?),
            Value::Object(r) => match r.upgrade() {
                Some(object) if object.backend() == Some(ENGINE_KEY) => {
                    LuaValue::Table(make_local(lua, &object)?)
                }
                _ => LuaValue::Nil,
            },
        })
    }

    fn receivers(lua: &Lua) -> LuaResult<LuaTable> {
        if let Some(table) = lua.named_registry_value::<Option<LuaTable>>(RECEIVERS)? {
            return Ok(table);
        }
        let table = lua.create_table()?;
        let mode = lua.create_table()?;
        mode.set("__mode", "k")?;
        table.set_metatable(Some(mode));
        lua.set_named_registry_value(RECEIVERS, table.clone())?;
        Ok(table)
    }

    /// Guest call arguments in order, minus the receiver of a `:` call on the
    /// table identified by `receiver`.
    fn host_args(lua: &Lua, receiver: i64, args: LuaMultiValue) -> LuaResult<Vec<Value>> {
        let mut args = args.into_iter().peekable();
        let is_receiver = match args.peek() {
            Some(LuaValue::Table(first)) => {
                receivers(lua)?.raw_get::<Option<i64>>(first.clone())? == Some(receiver)
            }
            _ => false,
        };
        if is_receiver {
            args.next();
        }
        Ok(args.map(|v| to_host_value(&v)).collect())
    }

    /// Text used by print-last-result mode.
    fn display(value: &LuaValue) -> Option<String> {
        match value {
            LuaValue::Nil => None,
            LuaValue::Boolean(b) => Some(b.to_string()),
            LuaValue::Integer(_) | LuaValue::Number(_) | LuaValue::String(_) => {
                Some(to_host_value(value).to_string())
            }
            other => Some(format!("<{}>", other.type_name())),
        }
    }

    /// First line of the innermost error message.
    fn message(err: &LuaError) -> String {
        let text = match err {
            LuaError::SyntaxError { message, .. } => message.clone(),
            LuaError::RuntimeError(message) => message.clone(),
            LuaError::CallbackError { cause, .. } => return message(cause),
            other => other.to_string(),
        };
        text.lines().next().unwrap_or_default().to_owned()
    }

    // ── LuaScriptObject ───────────────────────────────────────────────────

    /// Guest table exposing every method and property of `object`.
    ///
    /// Each call builds a new table; all tables share the object's
    /// descriptors.
    pub fn make_local(lua: &Lua, object: &ScriptObject) -> LuaResult<LuaTable> {
        let table = lua.create_table()?;
        let receiver = NEXT_RECEIVER.fetch_add(1, Ordering::Relaxed);
        receivers(lua)?.raw_set(table.clone(), receiver)?;

        for (name, function) in object.functions() {
            let desc = Rc::downgrade(function);
            let trampoline = lua.create_function(move |lua, args: LuaMultiValue| {
                let result = call_function(&desc, host_args(lua, receiver, args)?)
                    .map_err(|e| LuaError::RuntimeError(e.to_string()))?;
                to_guest_value(lua, &result)
            })?;
            table.set(name, trampoline)?;
        }

        for (name, property) in object.properties() {
            let desc = Rc::downgrade(property);
            let getset = lua.create_function(move |lua, args: LuaMultiValue| {
                let result = call_property(&desc, host_args(lua, receiver, args)?)
                    .map_err(|e| LuaError::RuntimeError(e.to_string()))?;
                to_guest_value(lua, &result)
            })?;
            table.set(name, getset)?;
        }

        Ok(table)
    }

    /// Lua realisation of a script object.
    pub struct LuaScriptObject {
        lua: Weak<Lua>,
    }

    impl LuaScriptObject {
        pub fn new(lua: Weak<Lua>) -> Self {
            Self { lua }
        }

        /// Realisation bound to the bridge's current Lua engine, if any.
        pub fn current(bridge: &Bridge) -> Self {
            let lua = bridge
                .current_engine(Some(ENGINE_KEY))
                .and_then(|e| e.as_any().downcast_ref::<LuaEngine>().map(|l| Rc::downgrade(&l.lua)))
                .unwrap_or_default();
            Self { lua }
        }
    }

    impl InternalScriptObject for LuaScriptObject {
        fn backend(&self) -> &'static str {
            ENGINE_KEY
        }

        fn make_global(&self, name: &str, object: &ScriptObject) -> Result<(), BridgeError> {
            let lua = self
                .lua
                .upgrade()
                .ok_or_else(|| BridgeError::Binding(format!("{name}: no Lua runtime")))?;
            let table = make_local(&lua, object).map_err(|e| BridgeError::Binding(message(&e)))?;
            lua.globals()
                .set(name, table)
                .map_err(|e| BridgeError::Binding(message(&e)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    // ── LuaEngine ─────────────────────────────────────────────────────────

    /// A Lua 5.4 interpreter with the safe standard library loaded.
    pub struct LuaEngine {
        core: EngineCore,
        lua: Rc<Lua>,
    }

    impl LuaEngine {
        pub fn new(bridge: &Bridge) -> Self {
            Self { core: EngineCore::new(bridge), lua: Rc::new(Lua::new()) }
        }

        pub fn lua(&self) -> &Lua {
            &self.lua
        }

        fn run(&self, chunk: LuaFunction) -> Result<Option<String>, ScriptError> {
            let results: LuaMultiValue =
                chunk.call(()).map_err(|e| ScriptError::Runtime(message(&e)))?;
            Ok(results.into_iter().next().as_ref().and_then(display))
        }
    }

    impl Engine for LuaEngine {
        fn name(&self) -> &'static str {
            ENGINE_KEY
        }

        fn core(&self) -> &EngineCore {
            &self.core
        }

        fn execute(&self, code: &str) -> Result<Option<String>, ScriptError> {
            // Expressions only yield a result when compiled as `return <expr>`.
            if self.core.prints_last_result() {
                let as_expr = self.lua.load(format!("return {code}")).set_name("=eval").into_function();
                if let Ok(chunk) = as_expr {
                    return self.run(chunk);
                }
            }
            let chunk = self
                .lua
                .load(code)
                .set_name("=eval")
                .into_function()
                .map_err(|e| ScriptError::Compile(message(&e)))?;
            self.run(chunk)
        }

        fn event_snippet(&self, event: &str) -> String {
            format!("if onEvent ~= nil then onEvent({}) end", quote_guest_string(event))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub fn register(bridge: &Bridge) -> Result<(), BridgeError> {
        bridge
            .engines()
            .register(ENGINE_KEY, &[], |b| Ok(Rc::new(LuaEngine::new(b)) as Rc<dyn Engine>))?;
        bridge.internals().register(INTERNAL_KEY, &[ENGINE_KEY], |b| {
            Box::new(LuaScriptObject::current(b)) as Box<dyn InternalScriptObject>
        })?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
