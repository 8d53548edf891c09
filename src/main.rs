use anyhow::Context;
use argh::FromArgs;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use shell_internals::env::Environment;
use shell_internals::{
    CommandId, Dispatcher, HistoryLog, Invocation, MonitorConfig, PlacementMode, reap_detached,
};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(FromArgs)]
/// Interactive shell running the cd, history, exit and mytop builtins.
/// End a line with `&` to run the builtin in the background.
struct Args {
    #[argh(option)]
    /// directory holding the memory summary and one entry per pid (default: /proc)
    proc_root: Option<PathBuf>,

    #[argh(option)]
    /// status record file inside each pid directory (default: psinfo)
    record_file: Option<String>,

    #[argh(option)]
    /// zero-based field of the status record holding CPU ticks (default: 7)
    tick_field: Option<usize>,

    #[argh(option)]
    /// most processes a single mytop scan may track (default: 10240)
    max_processes: Option<usize>,
}

impl Args {
    /// Command-line flags win over `SHELL_*` variables, which win over defaults.
    fn monitor_config(self, env: &Environment) -> anyhow::Result<MonitorConfig> {
        let mut config = MonitorConfig::from_env(env).context("bad monitor settings")?;
        if let Some(root) = self.proc_root {
            config.proc_root = root;
        }
        if let Some(record) = self.record_file {
            config.record_file = record;
        }
        if let Some(field) = self.tick_field {
            config.tick_field = field;
        }
        if let Some(max) = self.max_processes {
            config.max_processes = max;
        }
        Ok(config)
    }
}

/// Log to stderr so diagnostics never mix with builtin output.
///
/// The level comes from `RUST_LOG` and defaults to `warn`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args: Args = argh::from_env();
    init_logging();

    let env = Environment::new();
    let config = args.monitor_config(&env)?;
    debug!(?config, "process monitor configured");

    let mut dispatcher = Dispatcher::with_procfs(env, config);
    repl(&mut dispatcher)
}

/// A bare stand-in for the outer shell: one builtin per line, no pipelines.
fn repl(dispatcher: &mut Dispatcher) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new().context("cannot start line editor")?;
    let mut history = HistoryLog::new();

    loop {
        let line = match rl.readline("$ ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err).context("cannot read command line"),
        };
        reap_detached();

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        rl.add_history_entry(line)?;
        history.push(line);

        let mut argv: Vec<&str> = line.split_whitespace().collect();
        let background = argv.last() == Some(&"&");
        if background {
            argv.pop();
        }
        let Some(name) = argv.first() else {
            continue;
        };

        let mut stdout = io::stdout().lock();
        let id = match name.parse::<CommandId>() {
            Ok(id) => id,
            Err(e) => {
                writeln!(stdout, "{e}")?;
                continue;
            }
        };
        let mode = if background {
            PlacementMode::BackgroundForked
        } else {
            PlacementMode::Inline
        };
        let invocation = Invocation::new(argv);
        if let Err(e) = dispatcher.dispatch(id, &invocation, mode, None, &history, &mut stdout) {
            writeln!(stdout, "{id}: {e}")?;
        }
    }

    Ok(())
}
