//! Environment variable lookup.

use std::collections::HashMap;

/// Source of environment variables.
///
/// Settings read through this trait instead of `std::env` directly so tests can
/// supply a plain map and never touch the process environment.
pub trait VarSource {
    /// Returns the value of `key`, if set and valid unicode.
    fn var(&self, key: &str) -> Option<String>;

    /// Returns the value of `key` parsed as a boolean flag.
    ///
    /// Accepts `1/0`, `true/false`, `yes/no`, `on/off` (case-insensitive).
    fn flag(&self, key: &str) -> Option<bool> {
        self.var(key).and_then(|v| parse_flag(&v))
    }
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl VarSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl VarSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Parses a boolean flag the way the service writes them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" | "t" => Some(true),
        "0" | "false" | "no" | "n" | "off" | "f" => Some(false),
        _ => None,
    }
}
