//! One bridge hosting a Lua and a JavaScript engine side by side.
#![cfg(all(feature = "lua", feature = "js"))]

use std::rc::Rc;

use scriptbridge::dialog::get_dialog_by_id;
use scriptbridge::engine::BufferDelegate;
use scriptbridge::{Bridge, Engine, EngineDelegate};

struct Both {
    bridge: Rc<Bridge>,
    lua: Rc<dyn Engine>,
    js: Rc<dyn Engine>,
    sink: Rc<BufferDelegate>,
}

/// Lua first, so JavaScript ends up the default backend.
fn both() -> Both {
    let bridge = Bridge::with_builtins().unwrap();
    let sink = Rc::new(BufferDelegate::default());
    let s = Rc::clone(&sink);
    bridge
        .delegates()
        .register("capture", &[], move |_| Rc::clone(&s) as Rc<dyn EngineDelegate>)
        .unwrap();
    bridge.delegates().set_default("capture");
    let lua = bridge.create_engine(Some("lua")).unwrap().unwrap();
    let js = bridge.create_engine(Some("js")).unwrap().unwrap();
    Both { bridge, lua, js, sink }
}

#[test]
fn lua_objects_stay_lua_after_js_starts() {
    let b = both();
    assert_eq!(b.bridge.current_engine(None).unwrap().name(), "js");

    assert!(
        b.lua.eval(
            r#"
            local d = app.createDialog("from-lua")
            if d == nil then error("dialog did not reach Lua") end
            d.addButton("Go", "go")
            function onEvent(name) console.log("lua " .. name) end
            "#
        ),
        "{:?}",
        b.sink.lines()
    );

    // Built by the Lua evaluation's own listener; JS never ran.
    let window = get_dialog_by_id(&b.bridge, "from-lua").expect("built after the Lua evaluation");
    assert!(window.find_widget("go").unwrap().click());
    assert_eq!(b.sink.take(), vec!["lua go_click"]);
}

#[test]
fn each_engine_builds_its_own_dialogs() {
    let b = both();
    let (lua_before, js_before) = (b.lua.core().listener_count(), b.js.core().listener_count());

    assert!(b.js.eval(
        r#"var d = app.createDialog("from-js"); d.addLabel("x", "x");
           if (app.dialogIds() !== "") throw new Error("built before the evaluation ended");"#
    ));
    assert!(b.lua.eval(r#"local d = app.createDialog("from-lua"); d:addLabel("y", "y")"#));
    assert_eq!(b.js.core().listener_count(), js_before);
    assert_eq!(b.lua.core().listener_count(), lua_before);

    assert!(get_dialog_by_id(&b.bridge, "from-js").is_some());
    assert!(get_dialog_by_id(&b.bridge, "from-lua").is_some());
    assert_eq!(b.bridge.active_backend(), None);
}
