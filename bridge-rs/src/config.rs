//! `.scriptbridgerc` configuration file parser.
//!
//! One `key = value` setting per line:
//!
//! | Key | Value |
//! |-----|-------|
//! | `engine` | default backend key (`lua`, `js`, …) |
//! | `delegate` | default output sink (`stdout`, `log`, `buffer`) |
//! | `print_last_result` | `1`/`0`, `on`/`off`, `true`/`false`, `yes`/`no` |
//!
//! `#` starts a comment, outside double quotes.  Values may be quoted.

use std::path::{Path, PathBuf};

use crate::cli::ConfigFile;

/// Environment variable naming an rc file.
pub const RC_ENV: &str = "SCRIPTBRIDGE_RC";
/// File name looked for in the config dir and the working directory.
pub const RC_NAME: &str = ".scriptbridgerc";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Settings read from the rc file.  `None` means "not set here".
#[derive(Debug, Default, PartialEq)]
pub struct Config {
    pub engine: Option<String>,
    pub delegate: Option<String>,
    pub print_last_result: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string.  Bad lines are reported and skipped; the settings
    /// from every good line are kept.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError { line: lineno, message: format!("expected key = value: {line}") });
                continue;
            };
            let key = key.trim();
            let value = unquote(value.trim());

            if let Err(message) = config.set(key, &value) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one setting.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key {
            "engine" | "delegate" if value.is_empty() => Err(format!("{key} needs a value")),
            "engine" => {
                self.engine = Some(value.to_owned());
                Ok(())
            }
            "delegate" => {
                self.delegate = Some(value.to_owned());
                Ok(())
            }
            "print_last_result" => {
                self.print_last_result = Some(parse_flag(value)?);
                Ok(())
            }
            _ => Err(format!("unknown setting: {key}")),
        }
    }
}

// ── Lexing ────────────────────────────────────────────────────────────────────

fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, ch) in line.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Remove surrounding double quotes, honouring `\"` and `\\` escapes.
fn unquote(s: &str) -> String {
    let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return s.to_owned();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => Err(format!("not a boolean: {value}")),
    }
}

// ── File search ───────────────────────────────────────────────────────────────

/// The rc file to load, or `None`.
///
/// Order: `-f<file>`, `$SCRIPTBRIDGE_RC`, the platform config dir,
/// `./.scriptbridgerc`.  An explicit file is returned whether or not it
/// exists so the caller can report it.
pub fn find_rc(choice: &ConfigFile) -> Option<PathBuf> {
    match choice {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => search_paths().into_iter().find(|p| p.is_file()),
    }
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(env) = std::env::var_os(RC_ENV) {
        paths.push(PathBuf::from(env));
    }
    if let Some(dirs) = directories::ProjectDirs::from("", "", "scriptbridge") {
        paths.push(dirs.config_dir().join(RC_NAME));
    }
    paths.push(PathBuf::from(".").join(RC_NAME));
    paths
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config() {
        let (cfg, errs) = Config::load_str("");
        assert!(errs.is_empty());
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let src = "# header\n\n   # indented\nengine = js # trailing\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty());
        assert_eq!(cfg.engine.as_deref(), Some("js"));
    }

    #[test]
    fn all_settings() {
        let src = "engine = lua\ndelegate = stdout\nprint_last_result = on\n";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty());
        assert_eq!(cfg.engine.as_deref(), Some("lua"));
        assert_eq!(cfg.delegate.as_deref(), Some("stdout"));
        assert_eq!(cfg.print_last_result, Some(true));
    }

    #[test]
    fn quoted_value_keeps_hash() {
        let (cfg, errs) = Config::load_str("delegate = \"a#b\"\n");
        assert!(errs.is_empty());
        assert_eq!(cfg.delegate.as_deref(), Some("a#b"));
    }

    #[test]
    fn errors_carry_line_numbers_and_good_lines_survive() {
        let src = "engine = js\nbogus line\ncolour = red\nprint_last_result = maybe\nengine =\n";
        let (cfg, errs) = Config::load_str(src);
        assert_eq!(cfg.engine.as_deref(), Some("js"));
        assert_eq!(cfg.print_last_result, None);
        let lines: Vec<usize> = errs.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 4, 5]);
        assert!(errs[1].to_string().contains("unknown setting: colour"));
    }

    #[test]
    fn later_lines_override() {
        let (cfg, _) = Config::load_str("print_last_result = 1\nprint_last_result = no\n");
        assert_eq!(cfg.print_last_result, Some(false));
    }

    #[test]
    fn load_file_from_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "engine = js").unwrap();
        let (cfg, errs) = Config::load_file(f.path()).unwrap();
        assert!(errs.is_empty());
        assert_eq!(cfg.engine.as_deref(), Some("js"));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_file(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn find_rc_honours_cli() {
        assert_eq!(find_rc(&ConfigFile::Skip), None);
        let p = PathBuf::from("/does/not/exist");
        assert_eq!(find_rc(&ConfigFile::Explicit(p.clone())), Some(p));
    }
}
