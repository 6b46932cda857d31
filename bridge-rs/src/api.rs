//! Global script objects installed in every engine: `app` and `console`.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bridge::{Bridge, BridgeError};
use crate::dialog::{Dialog, DIALOG_KEY};
use crate::object::ScriptObject;
use crate::value::{arg_str, Value};

pub const APP_KEY: &str = "AppScriptObject";
pub const CONSOLE_KEY: &str = "ConsoleScriptObject";

// ── app ───────────────────────────────────────────────────────────────────────

pub fn app_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let mut object = ScriptObject::new(bridge, "App");
    // Dialogs stay owned here until their window is gone.
    let dialogs: Rc<RefCell<Vec<Rc<ScriptObject>>>> = Rc::default();

    let (b, list) = (bridge.handle(), Rc::clone(&dialogs));
    object
        .add_function("createDialog", move |args| {
            let Some(bridge) = b.upgrade() else { return Value::Undefined };
            let Some(dialog) = bridge.create_object(DIALOG_KEY) else { return Value::Undefined };
            if let Some(d) = dialog.get_wrapped::<Dialog>() {
                d.set_id(&arg_str(args, 0));
            }
            let mut list = list.borrow_mut();
            list.retain(|o| o.get_wrapped::<Dialog>().is_some_and(|d| d.is_alive()));
            list.push(Rc::clone(&dialog));
            Value::object(&dialog)
        })
        .document("createDialog", "createDialog(id): a new, empty dialog shown when the script finishes.");

    let b = bridge.handle();
    object
        .add_function("dialogIds", move |_| match b.upgrade() {
            Some(bridge) => bridge.dialogs().ids().join(",").into(),
            None => Value::Undefined,
        })
        .document("dialogIds", "Comma-separated ids of the open dialogs.");

    object.add_read_only_property("version", || env!("CARGO_PKG_VERSION").into());

    Rc::new(object)
}

// ── console ───────────────────────────────────────────────────────────────────

pub fn console_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let mut object = ScriptObject::new(bridge, "Console");
    let engine = bridge.calling_engine().map(|e| Rc::downgrade(&e));

    object
        .add_function("log", move |args| {
            let text = args.iter().map(Value::to_string).collect::<Vec<_>>().join(" ");
            match engine.as_ref().and_then(|e| e.upgrade()) {
                Some(engine) => engine.core().report(&text),
                None => tracing::info!(target: "console", "{text}"),
            }
            Value::Undefined
        })
        .document("log", "log(...): prints its arguments, space separated, to the console.");

    Rc::new(object)
}

pub fn register(bridge: &Bridge) -> Result<(), BridgeError> {
    let objects = bridge.objects();
    objects.register(APP_KEY, &["app"], app_object)?;
    objects.add_flag(APP_KEY, "global")?;
    objects.register(CONSOLE_KEY, &["console"], console_object)?;
    objects.add_flag(CONSOLE_KEY, "global")?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
