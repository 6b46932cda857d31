//! Command-line argument parsing.
//!
//! Usage:
//!   scriptbridge [-e<engine>] [-p] [-f[<file>]] [-c<code>] [-i] [<script>]

use std::path::{Path, PathBuf};

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Backend key (`-e<engine>`).
    pub engine: Option<String>,
    /// Print the value of each evaluation (`-p`).
    pub print_last_result: bool,
    /// Which rc file to load (`-f`).
    pub config: ConfigFile,
    /// Snippet evaluated after the script (`-c<code>`).
    pub code: Option<String>,
    /// Read further snippets and host commands from stdin (`-i`).
    pub interactive: bool,
    /// Script file to run.
    pub script: Option<PathBuf>,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// `$SCRIPTBRIDGE_RC`, the platform config dir, then `./.scriptbridgerc`.
    #[default]
    Search,
    /// `-f` with no file argument: no rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

impl CliArgs {
    /// True when there is nothing to run but the console.
    pub fn console_only(&self) -> bool {
        self.script.is_none() && self.code.is_none()
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Option value either glued to the flag (`-elua`) or in the next argument.
fn take_value(
    flag: char,
    chars: &[char],
    j: &mut usize,
    argv: &[String],
    i: &mut usize,
) -> Result<String, String> {
    if *j + 1 < chars.len() {
        let s: String = chars[*j + 1..].iter().collect();
        *j = chars.len();
        Ok(s)
    } else if *i + 1 < argv.len() {
        *i += 1;
        Ok(argv[*i].clone())
    } else {
        Err(format!("-{flag} requires an argument"))
    }
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'p' => args.print_last_result = true,
                'i' => args.interactive = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && positional_follows(argv, i + 1) {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                'e' => {
                    let engine = take_value('e', &chars, &mut j, argv, &mut i)?;
                    if engine.is_empty() {
                        return Err("-e requires an engine name".to_owned());
                    }
                    args.engine = Some(engine);
                }

                'c' => args.code = Some(take_value('c', &chars, &mut j, argv, &mut i)?),

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => args.script = Some(PathBuf::from(positional.remove(0))),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

/// `-f <file> <script>` takes the file; a lone `-f <script>` leaves the
/// argument to be the script.
fn positional_follows(argv: &[String], next: usize) -> bool {
    argv[next + 1..].iter().any(|a| !a.starts_with('-'))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Backend key implied by a script's extension (`foo.LUA` → `lua`).
pub fn engine_for(script: &Path) -> Option<String> {
    script
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
