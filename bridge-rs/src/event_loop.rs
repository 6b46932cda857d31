//! Host event loop for the `scriptbridge` binary.
//!
//! ```text
//!   ┌──────────────────────────┐
//!   │  EventLoop::run()        │
//!   │  tokio::select! over:    │
//!   │  • stdin lines           │◄── reader thread
//!   │  • Ctrl-C                │
//!   └──────────────────────────┘
//! ```
//!
//! A stdin line is either guest code, handed to the engine, or a host command
//! starting with `:`.  Deferred host tasks (dialog disposal) run after every
//! line.

use std::io;
use std::path::Path;
use std::rc::Rc;

use tokio::sync::mpsc;

use crate::bridge::Bridge;
use crate::dialog::{close_all_dialogs, get_dialog_by_id};
use crate::engine::Engine;

const HELP: &str = "\
:dialogs                  list open dialogs
:show <id>                render a dialog
:close <id>               close a dialog as the user would
:click <dialog> <widget>  click a button
:event <name>             raise a guest event
:quit                     leave";

/// What the caller should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct EventLoop {
    bridge: Rc<Bridge>,
    engine: Rc<dyn Engine>,
    /// Host command output not yet shown.
    pub output: Vec<String>,
    quit: bool,
}

impl EventLoop {
    pub fn new(bridge: Rc<Bridge>, engine: Rc<dyn Engine>) -> Self {
        Self { bridge, engine, output: Vec::new(), quit: false }
    }

    pub fn engine(&self) -> &Rc<dyn Engine> {
        &self.engine
    }

    pub fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }

    // ── Evaluation ────────────────────────────────────────────────────────

    /// Evaluate a script file.  `false` if it could not be read or failed.
    pub fn run_file(&mut self, path: &Path) -> bool {
        match std::fs::read_to_string(path) {
            Ok(src) => self.eval(&src),
            Err(e) => {
                self.output.push(format!("Error: {}: {e}", path.display()));
                false
            }
        }
    }

    /// Evaluate `code`, then run whatever host work it queued.
    pub fn eval(&mut self, code: &str) -> bool {
        let ok = self.engine.eval(code);
        self.tick();
        ok
    }

    /// Run deferred host tasks.
    pub fn tick(&self) -> usize {
        self.bridge.scheduler().run_pending()
    }

    // ── Input dispatch ────────────────────────────────────────────────────

    pub fn dispatch_line(&mut self, line: &str) -> Flow {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(cmd) = line.strip_prefix(':') {
            let flow = self.run_command(cmd.trim());
            self.tick();
            return flow;
        }
        if !line.trim().is_empty() {
            self.eval(line);
        }
        Flow::Continue
    }

    fn run_command(&mut self, cmd: &str) -> Flow {
        let mut words = cmd.split_whitespace();
        let name = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match (name, args.as_slice()) {
            ("quit" | "q", []) => return Flow::Quit,
            ("help" | "?", []) => self.output.extend(HELP.lines().map(str::to_owned)),
            ("dialogs", []) => {
                let ids = self.bridge.dialogs().ids();
                if ids.is_empty() {
                    self.output.push("no open dialogs".to_owned());
                }
                self.output.extend(ids);
            }
            ("show", [id]) => match get_dialog_by_id(&self.bridge, id) {
                Some(window) => self.output.extend(window.render().lines().map(str::to_owned)),
                None => self.output.push(format!("no dialog {id:?}")),
            },
            ("close", [id]) => {
                let closed = self
                    .bridge
                    .dialogs()
                    .get(id)
                    .is_some_and(|h| self.bridge.desktop().request_close(h));
                if !closed {
                    self.output.push(format!("no dialog {id:?}"));
                }
            }
            ("click", [dialog, widget]) => {
                let clicked = get_dialog_by_id(&self.bridge, dialog)
                    .and_then(|w| w.find_widget(widget))
                    .is_some_and(|w| w.click());
                if !clicked {
                    self.output.push(format!("no button {widget:?} in dialog {dialog:?}"));
                }
            }
            ("event", [event]) => {
                self.engine.raise_event(event);
            }
            _ => self.output.push(format!("unknown command :{cmd} (try :help)")),
        }
        Flow::Continue
    }

    // ── Main loop ─────────────────────────────────────────────────────────

    /// Read stdin until EOF, `:quit` or Ctrl-C.
    pub async fn run(&mut self) -> io::Result<()> {
        // A dedicated thread owns stdin; dropping a blocking read inside
        // select! would lose input.
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<Option<String>>(16);
        std::thread::spawn(move || {
            use std::io::BufRead;
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if stdin_tx.blocking_send(Some(line)).is_err() {
                    return;
                }
            }
            let _ = stdin_tx.blocking_send(None);
        });

        self.flush_output();
        while !self.quit {
            tokio::select! {
                line = stdin_rx.recv() => match line.flatten() {
                    Some(line) => {
                        if self.dispatch_line(&line) == Flow::Quit {
                            self.quit = true;
                        }
                    }
                    None => self.quit = true,
                },

                res = tokio::signal::ctrl_c() => {
                    res?;
                    tracing::info!(target: "engine", "interrupted");
                    self.quit = true;
                }
            }
            self.flush_output();
        }

        self.shutdown();
        Ok(())
    }

    fn flush_output(&mut self) {
        for line in self.output.drain(..) {
            println!("{line}");
        }
    }

    /// Close every open dialog as the user would, then dispose of the windows.
    pub fn shutdown(&mut self) {
        let closed = close_all_dialogs(&self.bridge);
        self.tick();
        tracing::debug!(target: "dialog", closed, "shut down");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
