//! Widget script objects: `label`, `button`, `entry`, `intentry`.
//!
//! Each factory creates a fresh host [`Widget`] and wraps it in a
//! [`ScriptObject`] registered as `<Tag>WidgetScriptObject`, which is how
//! `dialog.add("label", …)` finds it.

use std::rc::{Rc, Weak};

use crate::bridge::{Bridge, BridgeError};
use crate::gui::{DisplayType, Widget, WidgetKind};
use crate::object::{widget_registry_key, ScriptObject};
use crate::value::Value;

fn with_widget(widget: &Weak<Widget>, f: impl FnOnce(&Widget) -> Value) -> Value {
    widget.upgrade().map(|w| f(&w)).unwrap_or_default()
}

/// Script object for `widget` with the properties every widget has.
fn widget_object(bridge: &Bridge, widget: &Rc<Widget>, type_name: &str) -> ScriptObject {
    let mut object = ScriptObject::new(bridge, type_name);

    let (g, s) = (Rc::downgrade(widget), Rc::downgrade(widget));
    object.add_property(
        "id",
        move || with_widget(&g, |w| w.id().into()),
        move |v| {
            with_widget(&s, |w| {
                w.set_id(&v.to_string());
                w.id().into()
            })
        },
    );

    let (g, s) = (Rc::downgrade(widget), Rc::downgrade(widget));
    object.add_property(
        "text",
        move || with_widget(&g, |w| w.text().into()),
        move |v| {
            with_widget(&s, |w| {
                w.set_text(&v.to_string());
                w.text().into()
            })
        },
    );

    let (g, s) = (Rc::downgrade(widget), Rc::downgrade(widget));
    object
        .add_property(
            "display",
            move || with_widget(&g, |w| w.display().as_str().into()),
            move |v| {
                with_widget(&s, |w| {
                    match v.as_str().map(str::parse::<DisplayType>) {
                        Some(Ok(display)) => w.set_display(display),
                        _ => tracing::debug!(target: "dialog", value = %v, "ignored display type"),
                    }
                    w.display().as_str().into()
                })
            },
        )
        .document("display", "\"inherit\", \"block\" or \"inline\". Read when the widget is added.");

    object
}

fn finish(mut object: ScriptObject, widget: Rc<Widget>) -> Rc<ScriptObject> {
    object.set_wrapped(widget);
    Rc::new(object)
}

pub fn label_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let widget = Widget::new(WidgetKind::Label);
    let object = widget_object(bridge, &widget, "Label");
    finish(object, widget)
}

pub fn entry_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let widget = Widget::new(WidgetKind::Entry);
    let object = widget_object(bridge, &widget, "Entry");
    finish(object, widget)
}

/// A button.  Clicking it raises `<id>_click` on the engine current when it
/// was created.
pub fn button_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let widget = Widget::new(WidgetKind::Button);
    let object = widget_object(bridge, &widget, "Button");

    if let Some(engine) = bridge.calling_engine() {
        let (engine, w) = (Rc::downgrade(&engine), Rc::downgrade(&widget));
        widget.on_click(move || {
            let (Some(engine), Some(w)) = (engine.upgrade(), w.upgrade()) else { return };
            engine.raise_event(&format!("{}_click", w.id()));
        });
    }
    finish(object, widget)
}

/// An integer entry.  `value` is clamped to `[min, max]`.
pub fn intentry_object(bridge: &Bridge) -> Rc<ScriptObject> {
    let widget = Widget::new(WidgetKind::IntEntry);
    let mut object = widget_object(bridge, &widget, "IntEntry");

    let (g, s) = (Rc::downgrade(&widget), Rc::downgrade(&widget));
    object
        .add_property(
            "value",
            move || with_widget(&g, |w| w.value().into()),
            move |v| with_widget(&s, |w| v.as_int().map(|n| w.set_value(n)).unwrap_or(w.value()).into()),
        )
        .document("value", "read+write. Clamped to [min, max].");

    let (g, s) = (Rc::downgrade(&widget), Rc::downgrade(&widget));
    object.add_property(
        "min",
        move || with_widget(&g, |w| w.range().0.into()),
        move |v| {
            with_widget(&s, |w| {
                if let Some(min) = v.as_int() {
                    w.set_range(min, w.range().1.max(min));
                }
                w.range().0.into()
            })
        },
    );

    let (g, s) = (Rc::downgrade(&widget), Rc::downgrade(&widget));
    object.add_property(
        "max",
        move || with_widget(&g, |w| w.range().1.into()),
        move |v| {
            with_widget(&s, |w| {
                if let Some(max) = v.as_int() {
                    w.set_range(w.range().0.min(max), max);
                }
                w.range().1.into()
            })
        },
    );

    finish(object, widget)
}

pub fn register(bridge: &Bridge) -> Result<(), BridgeError> {
    let factories: [(&str, fn(&Bridge) -> Rc<ScriptObject>); 4] = [
        ("label", label_object),
        ("button", button_object),
        ("entry", entry_object),
        ("intentry", intentry_object),
    ];
    for (tag, factory) in factories {
        let key = widget_registry_key(tag).ok_or_else(|| BridgeError::Binding(tag.to_owned()))?;
        bridge.objects().register(&key, &[], factory)?;
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
