//! scriptbridge: a host/guest scripting bridge.
//!
//! Host code describes objects once, as [`object::ScriptObject`]s made of
//! [`function::Function`]s and [`function::ObjectProperty`]s, and any
//! registered backend ([`lua`], [`js`]) exposes them to its guest language.
//! The [`bridge::Bridge`] holds the capability registries every piece is
//! resolved through; [`dialog`] and [`widgets`] build small GUI dialogs on
//! top of the headless [`gui`] toolkit.

pub mod api;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod dialog;
pub mod engine;
pub mod event_loop;
pub mod function;
pub mod gui;
pub mod js;
pub mod lua;
pub mod object;
pub mod registry;
pub mod scheduler;
pub mod value;
pub mod widgets;

pub use bridge::{Bridge, BridgeError};
pub use engine::{Engine, EngineDelegate, ScriptError};
pub use object::ScriptObject;
pub use value::Value;
