use crate::command::{CommandId, Invocation};
use crate::config::MonitorConfig;
use crate::env::Environment;
use crate::error::BuiltinError;
use crate::history::{self, HistoryLog};
use crate::monitor::{self, SystemSource};
use argh::{EarlyExit, FromArgs};
use std::env;
use std::io::{self, Write};
use tracing::debug;

/// Everything a builtin may look at while it runs.
pub(crate) struct Context<'a> {
    pub env: &'a mut Environment,
    pub history: &'a HistoryLog,
    pub system: &'a dyn SystemSource,
    pub monitor: &'a MonitorConfig,
}

/// Built-in commands known to the shell at compile time.
///
/// Builtins are parsed using the [`argh`] crate (`FromArgs`) and report
/// failures as a [`BuiltinError`], which [`run`] prints on the command's
/// own output stream.
pub(crate) trait BuiltinCommand: Sized + FromArgs {
    const ID: CommandId;

    /// Build the command from an invocation's arguments.
    fn parse(invocation: &Invocation) -> Result<Self, EarlyExit> {
        Self::from_args(&[Self::ID.name()], &arg_refs(invocation))
    }

    /// Executes the command, writing its report to `stdout`.
    fn execute(self, stdout: &mut dyn Write, ctx: &mut Context<'_>) -> Result<(), BuiltinError>;
}

fn arg_refs(invocation: &Invocation) -> Vec<&str> {
    invocation.args().iter().map(String::as_str).collect()
}

/// Parse and execute `T`, turning every failure into a diagnostic line.
///
/// Only a failure to write the output itself is returned.
pub(crate) fn run<T: BuiltinCommand>(
    invocation: &Invocation,
    stdout: &mut dyn Write,
    ctx: &mut Context<'_>,
) -> io::Result<()> {
    let id = T::ID;
    let cmd = match T::parse(invocation) {
        Ok(cmd) => cmd,
        Err(EarlyExit { output, status }) => {
            debug!(command = %id, help = status.is_ok(), "argument parsing stopped early");
            stdout.write_all(output.as_bytes())?;
            return stdout.flush();
        }
    };
    if let Err(e) = cmd.execute(stdout, ctx) {
        debug!(command = %id, error = %e, "builtin failed");
        writeln!(stdout, "{id}: {e}")?;
    }
    stdout.flush()
}

#[derive(FromArgs)]
/// Change the current working directory and print the new one.
pub struct Cd {
    #[argh(positional)]
    /// directory to switch to; absolute or relative to the current directory.
    pub target: Option<String>,
}

impl BuiltinCommand for Cd {
    const ID: CommandId = CommandId::ChangeDirectory;

    fn execute(self, stdout: &mut dyn Write, ctx: &mut Context<'_>) -> Result<(), BuiltinError> {
        let target = self
            .target
            .filter(|t| !t.is_empty())
            .ok_or(BuiltinError::MissingArgument("directory"))?;

        let new_dir = ctx.env.current_dir.join(target);
        env::set_current_dir(&new_dir).map_err(|reason| BuiltinError::DirectoryChange {
            path: new_dir.clone(),
            reason,
        })?;

        let cwd = env::current_dir().map_err(BuiltinError::CurrentDirUnavailable)?;
        writeln!(stdout, "current dir = {}", cwd.display())?;
        ctx.env.current_dir = cwd;
        Ok(())
    }
}

#[derive(FromArgs)]
/// Print the most recent command lines, oldest first.
pub struct History {
    #[argh(positional)]
    /// how many entries to show; defaults to all of them.
    pub count: Option<String>,
}

impl BuiltinCommand for History {
    const ID: CommandId = CommandId::History;

    fn parse(invocation: &Invocation) -> Result<Self, EarlyExit> {
        let mut args = arg_refs(invocation);
        // history has no flags besides --help, so anything else dash-led is a
        // count ("-3", "-x") that normalizes to zero rather than an argh error
        if args
            .first()
            .is_some_and(|a| a.starts_with('-') && !matches!(*a, "--help" | "--"))
        {
            args.insert(0, "--");
        }
        Self::from_args(&[Self::ID.name()], &args)
    }

    fn execute(self, stdout: &mut dyn Write, ctx: &mut Context<'_>) -> Result<(), BuiltinError> {
        let count = history::normalize_count(self.count.as_deref(), ctx.history.cursor());
        let window = ctx.history.window(count);
        debug!(count, order = ?window.order, "printing history window");
        for entry in window.entries {
            writeln!(stdout, "{entry}")?;
        }
        Ok(())
    }
}

#[derive(FromArgs)]
/// Exit shell process
pub struct Exit {
    #[argh(positional, greedy)]
    /// ignored; the shell always exits with status 0
    pub _args: Vec<String>,
}

impl BuiltinCommand for Exit {
    const ID: CommandId = CommandId::Exit;

    fn execute(self, _stdout: &mut dyn Write, _ctx: &mut Context<'_>) -> Result<(), BuiltinError> {
        exit_shell()
    }
}

/// Terminate the current process with status 0.
///
/// Nothing is cleaned up here; the shell releases what it owns before
/// dispatching `exit`.
pub fn exit_shell() -> ! {
    std::process::exit(0)
}

#[derive(FromArgs)]
/// Report memory usage and each process's share of CPU ticks.
pub struct Mytop {}

impl BuiltinCommand for Mytop {
    const ID: CommandId = CommandId::ProcessMonitor;

    fn execute(self, stdout: &mut dyn Write, ctx: &mut Context<'_>) -> Result<(), BuiltinError> {
        match monitor::read_memory(ctx.system) {
            Ok(memory) => monitor::write_memory(stdout, &memory)?,
            Err(e) => writeln!(stdout, "{}: {}", Self::ID, e)?,
        }

        let scan = monitor::scan_processes(ctx.system, ctx.monitor)?;
        if !scan.skipped.is_empty() {
            debug!(skipped = scan.skipped.len(), "registry entries left out of the report");
        }
        let shares = scan.shares()?;
        monitor::write_shares(stdout, &shares, ctx.monitor.precision)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::tests::FakeSource;
    use std::collections::HashMap;
    use std::env as stdenv;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn lock_current_dir() -> MutexGuard<'static, ()> {
        static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
        MUTEX
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    struct Fixture {
        env: Environment,
        history: HistoryLog,
        system: FakeSource,
        monitor: MonitorConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                env: Environment {
                    vars: HashMap::new(),
                    current_dir: stdenv::current_dir().unwrap(),
                },
                history: HistoryLog::new(),
                system: FakeSource::default(),
                monitor: MonitorConfig::default(),
            }
        }

        fn run<T: BuiltinCommand>(&mut self, argv: &[&str]) -> String {
            let mut ctx = Context {
                env: &mut self.env,
                history: &self.history,
                system: &self.system,
                monitor: &self.monitor,
            };
            let mut out = Vec::new();
            run::<T>(&Invocation::new(argv.iter().copied()), &mut out, &mut ctx).unwrap();
            String::from_utf8(out).unwrap()
        }

        fn execute<T: BuiltinCommand>(&mut self, cmd: T) -> (Result<(), BuiltinError>, String) {
            let mut ctx = Context {
                env: &mut self.env,
                history: &self.history,
                system: &self.system,
                monitor: &self.monitor,
            };
            let mut out = Vec::new();
            let res = cmd.execute(&mut out, &mut ctx);
            (res, String::from_utf8(out).unwrap())
        }
    }

    #[test]
    fn test_cd_to_absolute_path() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = temp.path().canonicalize().unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut fx = Fixture::new();
        let target = Some(canonical_temp.to_string_lossy().to_string());
        let (res, out) = fx.execute(Cd { target });

        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(new_cwd, canonical_temp);
        assert_eq!(fx.env.current_dir, canonical_temp);
        assert_eq!(out, format!("current dir = {}\n", canonical_temp.display()));
    }

    #[test]
    fn test_cd_relative_to_current_dir() {
        let _lock = lock_current_dir();
        let temp = tempfile::tempdir().unwrap();
        let canonical_temp = temp.path().canonicalize().unwrap();
        std::fs::create_dir(canonical_temp.join("sub")).unwrap();
        let orig = stdenv::current_dir().unwrap();

        let mut fx = Fixture::new();
        fx.env.current_dir = canonical_temp.clone();
        let (res, _) = fx.execute(Cd {
            target: Some("sub".to_string()),
        });

        let new_cwd = stdenv::current_dir().unwrap();
        stdenv::set_current_dir(&orig).expect("failed to restore cwd");

        assert!(res.is_ok());
        assert_eq!(new_cwd, canonical_temp.join("sub"));
    }

    #[test]
    fn test_cd_nonexistent_path_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut fx = Fixture::new();
        let name = format!("nonexistent_dir_for_cd_test_{}", std::process::id());
        let (res, out) = fx.execute(Cd { target: Some(name) });

        assert!(matches!(res, Err(BuiltinError::DirectoryChange { .. })));
        assert!(out.is_empty(), "no stale directory may be printed");
        assert_eq!(stdenv::current_dir().unwrap(), orig);
        assert_eq!(fx.env.current_dir, orig);
    }

    #[test]
    fn test_cd_into_a_file_errors() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();

        let mut fx = Fixture::new();
        let (res, _) = fx.execute(Cd {
            target: Some(file.path().to_string_lossy().to_string()),
        });

        assert!(matches!(res, Err(BuiltinError::DirectoryChange { .. })));
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    #[test]
    fn test_cd_without_target_is_missing_argument() {
        let _lock = lock_current_dir();
        let orig = stdenv::current_dir().unwrap();

        let mut fx = Fixture::new();
        let out = fx.run::<Cd>(&["cd"]);

        assert_eq!(out, "cd: missing argument: directory\n");
        assert_eq!(stdenv::current_dir().unwrap(), orig);
    }

    fn history_fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.history = ["ls", "cd /tmp", "mytop", "history"].into_iter().collect();
        fx
    }

    #[test]
    fn test_history_prints_everything_by_default() {
        let mut fx = history_fixture();
        assert_eq!(fx.run::<History>(&["history"]), "ls\ncd /tmp\nmytop\nhistory\n");
    }

    #[test]
    fn test_history_prints_last_n() {
        let mut fx = history_fixture();
        assert_eq!(fx.run::<History>(&["history", "2"]), "mytop\nhistory\n");
        assert_eq!(fx.run::<History>(&["history", "0"]), "");
    }

    #[test]
    fn test_history_clamps_count() {
        let mut fx = history_fixture();
        assert_eq!(fx.run::<History>(&["history", "-2"]), "");
        assert_eq!(fx.run::<History>(&["history", "junk"]), "");
        for dashed in ["-0", "-1.5", "-99999999999999999999", "-x", "-"] {
            assert_eq!(fx.run::<History>(&["history", dashed]), "", "count {dashed:?}");
        }
        assert_eq!(
            fx.run::<History>(&["history", "40"]),
            "ls\ncd /tmp\nmytop\nhistory\n"
        );
    }

    #[test]
    fn test_history_never_mutates_log() {
        let mut fx = history_fixture();
        let before = fx.history.clone();
        fx.run::<History>(&["history", "3"]);
        assert_eq!(fx.history, before);
    }

    #[test]
    fn test_history_on_empty_log() {
        let mut fx = Fixture::new();
        assert_eq!(fx.run::<History>(&["history"]), "");
        assert_eq!(fx.run::<History>(&["history", "5"]), "");
    }

    #[test]
    fn test_help_is_printed_not_executed() {
        let mut fx = history_fixture();
        let out = fx.run::<History>(&["history", "--help"]);
        assert!(out.contains("Usage: history"));
        assert!(!out.contains("mytop\n"));
    }

    #[test]
    fn test_mytop_full_report() {
        let mut fx = Fixture::new();
        fx.system = FakeSource::with_ticks(&[(1, 50), (2, 150)]);
        fx.system.memory = Some("4096 1000 250 12 100\n".to_string());

        assert_eq!(
            fx.run::<Mytop>(&["mytop"]),
            "total: 4000 KiB free: 1000 KiB cached: 400 KiB\n[  1]: 25.00%\n[  2]: 75.00%\n"
        );
    }

    #[test]
    fn test_mytop_reports_memory_failure_and_keeps_going() {
        let mut fx = Fixture::new();
        fx.system = FakeSource::with_ticks(&[(7, 10)]);
        fx.system.memory = Some("4096 1000".to_string());

        let out = fx.run::<Mytop>(&["mytop"]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("mytop: memory information unavailable"));
        assert_eq!(lines[1], "[  7]: 100.00%");
    }

    #[test]
    fn test_mytop_without_processes_reports_no_activity() {
        let mut fx = Fixture::new();
        fx.system.memory = Some("4096 1000 250 12 100".to_string());

        let (res, out) = fx.execute(Mytop {});
        assert!(matches!(res, Err(BuiltinError::NoProcessActivity)));
        assert_eq!(out, "total: 4000 KiB free: 1000 KiB cached: 400 KiB\n");

        let printed = fx.run::<Mytop>(&["mytop"]);
        assert!(printed.ends_with("mytop: no process activity to report\n"));
    }

    #[test]
    fn test_mytop_over_capacity() {
        let mut fx = Fixture::new();
        fx.system = FakeSource::with_ticks(&[(1, 1), (2, 1)]);
        fx.system.memory = Some("1 1 1 1 1".to_string());
        fx.monitor.max_processes = 1;

        let (res, _) = fx.execute(Mytop {});
        assert!(matches!(res, Err(BuiltinError::TooManyProcesses { limit: 1 })));
    }
}
