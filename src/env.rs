use std::collections::HashMap;
use std::env as stdenv;
use std::path::PathBuf;

/// Process state captured once at startup and owned by the dispatcher.
///
/// `MonitorConfig::from_env` reads the `SHELL_*` monitor settings from
/// `vars`, and `cd` keeps `current_dir` in step with the real working
/// directory.
#[derive(Debug, Clone)]
pub struct Environment {
    pub vars: HashMap<String, String>,
    /// Where the last successful `cd` landed.
    pub current_dir: PathBuf,
}

impl Environment {
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// Look up `key` in the snapshot, then in the live process environment.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| stdenv::var(key).ok())
    }

    /// Override a setting for this shell only; the process environment is untouched.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
