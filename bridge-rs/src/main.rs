use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use scriptbridge::cli::{self, CliArgs};
use scriptbridge::config::{self, Config};
use scriptbridge::event_loop::EventLoop;
use scriptbridge::Bridge;

const USAGE: &str = "Usage: scriptbridge [-e<engine>] [-p] [-f[<file>]] [-c<code>] [-i] [<script>]";

fn init_tracing() {
    let filter = EnvFilter::try_from_env("SCRIPTBRIDGE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Read the rc file, reporting (but not failing on) bad lines.
fn load_config(args: &CliArgs) -> Config {
    let Some(path) = config::find_rc(&args.config) else { return Config::new() };
    match Config::load_file(&path) {
        Ok((config, errors)) => {
            for e in errors {
                eprintln!("scriptbridge: {}: {e}", path.display());
            }
            config
        }
        Err(e) => {
            eprintln!("scriptbridge: warning: {}: {e}", path.display());
            Config::new()
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("scriptbridge: {e}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    let config = load_config(&args);

    let bridge = match Bridge::with_builtins() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("scriptbridge: {e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Console sink ──────────────────────────────────────────────────────────
    let delegate = config.delegate.as_deref().unwrap_or("stdout");
    if bridge.delegates().contains(delegate) {
        bridge.delegates().set_default(delegate);
    } else {
        eprintln!("scriptbridge: unknown delegate {delegate:?}, using stdout");
        bridge.delegates().set_default("stdout");
    }

    // ── Engine ────────────────────────────────────────────────────────────────
    let key = args
        .engine
        .clone()
        .or_else(|| {
            args.script
                .as_deref()
                .and_then(cli::engine_for)
                .filter(|ext| bridge.engines().contains(ext))
        })
        .or_else(|| config.engine.clone())
        .unwrap_or_else(|| "lua".to_owned());

    let engine = match bridge.create_engine(Some(&key)) {
        Ok(Some(engine)) => engine,
        Ok(None) => {
            let known = bridge.engines().keys().join(", ");
            eprintln!("scriptbridge: no engine {key:?} (available: {known})");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            eprintln!("scriptbridge: {e}");
            return ExitCode::FAILURE;
        }
    };
    if args.print_last_result || config.print_last_result.unwrap_or(false) {
        engine.print_last_result();
    }

    let mut event_loop = EventLoop::new(bridge, engine);
    let mut ok = true;

    if let Some(script) = &args.script {
        ok &= event_loop.run_file(script);
    }
    if let Some(code) = &args.code {
        ok &= event_loop.eval(code);
    }

    if args.interactive || args.console_only() {
        if let Err(e) = event_loop.run().await {
            eprintln!("scriptbridge: {e}");
            return ExitCode::FAILURE;
        }
    } else {
        for line in event_loop.output.drain(..) {
            eprintln!("{line}");
        }
        event_loop.shutdown();
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
