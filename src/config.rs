//! Settings for the process monitor.
//!
//! Values are layered: built-in defaults, then environment variables
//! captured in [`Environment`], then whatever the binary's command line
//! overrides on top.

use crate::env::Environment;
use crate::error::BuiltinError;
use std::path::PathBuf;
use std::str::FromStr;

/// Upper bound on samples held by a single `mytop` scan.
pub const MAX_TRACKED_PROCESSES: usize = 10240;

/// Whitespace-delimited field of a status record that holds the tick count.
pub const TICK_FIELD: usize = 7;

/// Where the process monitor reads from and how it formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Directory holding the memory summary and one entry per pid.
    pub proc_root: PathBuf,
    /// File under `proc_root` with the one-line memory summary.
    pub memory_file: String,
    /// File under `proc_root/<pid>/` with the process status record.
    pub record_file: String,
    /// 0-based field of the status record holding cumulative CPU ticks.
    pub tick_field: usize,
    /// Most samples a single scan may hold.
    pub max_processes: usize,
    /// Decimal places printed for CPU shares.
    pub precision: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
            memory_file: "meminfo".to_string(),
            record_file: "psinfo".to_string(),
            tick_field: TICK_FIELD,
            max_processes: MAX_TRACKED_PROCESSES,
            precision: 2,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `SHELL_*` variables from the environment.
    pub fn from_env(env: &Environment) -> Result<Self, BuiltinError> {
        let mut config = Self::default();
        if let Some(root) = env.get_var("SHELL_PROC_ROOT") {
            config.proc_root = PathBuf::from(root);
        }
        if let Some(record) = env.get_var("SHELL_PROC_RECORD") {
            config.record_file = record;
        }
        if let Some(field) = parse_var(env, "SHELL_TICK_FIELD")? {
            config.tick_field = field;
        }
        if let Some(max) = parse_var(env, "SHELL_MAX_PROCESSES")? {
            config.max_processes = max;
        }
        if let Some(precision) = parse_var(env, "SHELL_SHARE_PRECISION")? {
            config.precision = precision;
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(env: &Environment, key: &'static str) -> Result<Option<T>, BuiltinError> {
    match env.get_var(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| BuiltinError::Config { key, value }),
    }
}
