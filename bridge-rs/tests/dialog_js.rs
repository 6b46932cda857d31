//! Dialogs composed from JavaScript, end to end.
#![cfg(feature = "js")]

use std::rc::Rc;

use scriptbridge::dialog::get_dialog_by_id;
use scriptbridge::engine::BufferDelegate;
use scriptbridge::{Bridge, Engine, EngineDelegate};

fn js() -> (Rc<Bridge>, Rc<dyn Engine>, Rc<BufferDelegate>) {
    let bridge = Bridge::with_builtins().unwrap();
    let sink = Rc::new(BufferDelegate::default());
    let s = Rc::clone(&sink);
    bridge
        .delegates()
        .register("capture", &[], move |_| Rc::clone(&s) as Rc<dyn EngineDelegate>)
        .unwrap();
    bridge.delegates().set_default("capture");
    let engine = bridge.create_engine(Some("javascript")).unwrap().unwrap();
    (bridge, engine, sink)
}

const LOGIN: &str = r#"
    var d = app.createDialog("login");
    d.title = "Log in";
    d.addLabel("User", "user-label");
    d.add("entry", "user", "inline");
    d.addBreak();
    d.addButton("OK", "ok");
    d.add("button", "cancel", "inline");
    function onEvent(name) { console.log("event " + name); }
"#;

#[test]
fn dialog_is_laid_out_after_eval() {
    let (bridge, engine, sink) = js();
    assert!(engine.eval(LOGIN), "{:?}", sink.lines());

    let window = get_dialog_by_id(&bridge, "login").unwrap();
    assert!(window.is_visible() && window.is_centered());
    assert_eq!(window.title(), "Log in");

    let rows = window
        .with_grid(|g| {
            g.cells()
                .iter()
                .map(|c| (c.widget.id(), c.placement.row, c.placement.span))
                .collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("user-label".to_owned(), 0, 1),
            ("user".to_owned(), 0, 1),
            ("ok".to_owned(), 1, 1),
            ("cancel".to_owned(), 1, 1),
        ]
    );
}

#[test]
fn accessors_reach_the_widgets() {
    let (bridge, engine, sink) = js();
    assert!(engine.eval(
        r#"
        const d = app.createDialog("acc");
        const n = d.addIntEntry("Age", "age", 18, 99);
        n.value = 7;
        const l = d.get("age-label");
        l.text = "Your age";
        console.log(d.id, n.value, n.min, n.max, l.text, l.display);
        "#
    ));
    assert_eq!(sink.take(), vec!["acc 18 18 99 Your age inherit"]);
    let window = get_dialog_by_id(&bridge, "acc").unwrap();
    assert_eq!(window.find_widget("age-label").unwrap().text(), "Your age");
}

#[test]
fn failed_eval_leaves_no_window() {
    let (bridge, engine, sink) = js();
    assert!(!engine.eval(r#"app.createDialog("broken").addLabel("x", "x"); throw new Error("nope");"#));
    assert!(sink.take()[0].contains("nope"));
    assert!(get_dialog_by_id(&bridge, "broken").is_none());

    bridge.scheduler().run_pending();
    assert!(bridge.desktop().is_empty());
}

#[test]
fn syntax_error_is_a_compile_error() {
    let (bridge, engine, sink) = js();
    assert!(!engine.eval(r#"app.createDialog("x"); function ("#));
    assert!(sink.take()[0].starts_with("Error: compile error:"));
    assert!(bridge.dialogs().is_empty());
}

#[test]
fn events_from_the_host() {
    let (bridge, engine, sink) = js();
    engine.eval(LOGIN);
    let window = get_dialog_by_id(&bridge, "login").unwrap();
    assert!(window.find_widget("cancel").unwrap().click());

    let handle = bridge.dialogs().get("login").unwrap();
    assert!(bridge.desktop().request_close(handle));
    // A second request finds the window hidden.
    assert!(!bridge.desktop().request_close(handle));
    assert_eq!(sink.take(), vec!["event cancel_click", "event login_close"]);

    bridge.scheduler().run_pending();
    assert!(bridge.desktop().is_empty());
}

#[test]
fn guest_close_is_silent() {
    let (bridge, engine, sink) = js();
    engine.eval(LOGIN);
    assert!(engine.eval(r#"console.log(app.dialogIds()); d.close(); console.log(app.dialogIds());"#));
    assert_eq!(sink.take(), vec!["login", ""]);
    assert!(get_dialog_by_id(&bridge, "login").is_none());
}
