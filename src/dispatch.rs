use crate::builtin::{self, Cd, Context, Exit, History, Mytop};
use crate::command::{CommandId, Invocation, Outcome, PlacementMode};
use crate::config::MonitorConfig;
use crate::env::Environment;
use crate::error::DispatchError;
use crate::history::HistoryLog;
use crate::monitor::{ProcFs, SystemSource};
use crate::pipe::PipeWiring;
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::os::fd::FromRawFd;
use tracing::{debug, info, warn};

const NULL_DEVICE: &str = "/dev/null";

/// Runs builtins and decides which process they run in.
///
/// The dispatcher owns the shell's [`Environment`] and the process monitor's
/// data source. The history log stays with the shell loop and is lent to
/// each dispatch, since the loop appends to it between calls.
///
/// Example
/// ```
/// use shell_internals::{CommandId, Dispatcher, HistoryLog, Invocation, Outcome, PlacementMode};
/// let mut dispatcher = Dispatcher::default();
/// let history: HistoryLog = ["echo hi", "history 1"].into_iter().collect();
/// let mut out = Vec::new();
/// let outcome = dispatcher
///     .dispatch(
///         CommandId::History,
///         &Invocation::new(["history", "1"]),
///         PlacementMode::Inline,
///         None,
///         &history,
///         &mut out,
///     )
///     .unwrap();
/// assert_eq!(outcome, Outcome::NoChild);
/// assert_eq!(out, b"history 1\n");
/// ```
pub struct Dispatcher {
    env: Environment,
    system: Box<dyn SystemSource>,
    monitor: MonitorConfig,
}

impl Dispatcher {
    /// Create a dispatcher with a custom process-metadata source.
    pub fn new(env: Environment, system: Box<dyn SystemSource>, monitor: MonitorConfig) -> Self {
        Self {
            env,
            system,
            monitor,
        }
    }

    /// A dispatcher reading the `/proc` tree described by `monitor`.
    pub fn with_procfs(env: Environment, monitor: MonitorConfig) -> Self {
        let system = Box::new(ProcFs::new(&monitor));
        Self::new(env, system, monitor)
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Run builtin `id` under `mode`.
    ///
    /// Inline runs write to `out`. Forked children write to their own
    /// standard output: the pipe given by `wiring` for a pipeline stage,
    /// the null device for a background job.
    ///
    /// The parent never waits. A pipeline child's pid is handed back for the
    /// pipeline to reap; a background child is not reported at all.
    pub fn dispatch(
        &mut self,
        id: CommandId,
        invocation: &Invocation,
        mode: PlacementMode,
        wiring: Option<PipeWiring<'_>>,
        history: &HistoryLog,
        out: &mut dyn Write,
    ) -> Result<Outcome, DispatchError> {
        debug!(command = %id, ?mode, piped = wiring.is_some(), "dispatching builtin");
        match mode {
            PlacementMode::Inline => {
                if wiring.is_some() {
                    return Err(DispatchError::InlineWithWiring);
                }
                self.run_handler(id, invocation, history, out);
                Ok(Outcome::NoChild)
            }
            PlacementMode::ForegroundForked => {
                // Safety: the child only touches its own copies of the
                // dispatcher state and leaves through `_exit`.
                match unsafe { unistd::fork() } {
                    Ok(ForkResult::Child) => {
                        if let Some(wiring) = wiring {
                            if let Err(e) = wiring.apply() {
                                abandon_child(format_args!("{id}: cannot wire pipeline stage: {e}"));
                            }
                        }
                        self.finish_child(id, invocation, history)
                    }
                    Ok(ForkResult::Parent { child }) => {
                        info!(command = %id, pid = child.as_raw(), "forked pipeline builtin");
                        Ok(Outcome::Child(child))
                    }
                    Err(e) => Err(DispatchError::Fork(e)),
                }
            }
            PlacementMode::BackgroundForked => {
                // Safety: as above.
                match unsafe { unistd::fork() } {
                    Ok(ForkResult::Child) => {
                        if let Err(e) = detach_from_terminal() {
                            abandon_child(format_args!("{id}: cannot detach background job: {e}"));
                        }
                        self.finish_child(id, invocation, history)
                    }
                    Ok(ForkResult::Parent { child }) => {
                        info!(command = %id, pid = child.as_raw(), "forked background builtin");
                        Ok(Outcome::Detached)
                    }
                    Err(e) => Err(DispatchError::Fork(e)),
                }
            }
        }
    }

    /// Dispatch with the outer shell's raw placement code.
    ///
    /// An unknown code is reported on `out` and nothing runs.
    pub fn dispatch_raw(
        &mut self,
        id: CommandId,
        invocation: &Invocation,
        mode: i32,
        wiring: Option<PipeWiring<'_>>,
        history: &HistoryLog,
        out: &mut dyn Write,
    ) -> Result<Outcome, DispatchError> {
        match PlacementMode::from_raw(mode, wiring.is_some()) {
            Some(mode) => self.dispatch(id, invocation, mode, wiring, history, out),
            None => {
                if let Err(e) = writeln!(out, "{id}: invalid placement mode {mode}") {
                    warn!("cannot report invalid placement mode: {e}");
                }
                Ok(Outcome::NoChild)
            }
        }
    }

    fn run_handler(
        &mut self,
        id: CommandId,
        invocation: &Invocation,
        history: &HistoryLog,
        out: &mut dyn Write,
    ) {
        let mut ctx = Context {
            env: &mut self.env,
            history,
            system: self.system.as_ref(),
            monitor: &self.monitor,
        };
        let result = match id {
            CommandId::ChangeDirectory => builtin::run::<Cd>(invocation, out, &mut ctx),
            CommandId::History => builtin::run::<History>(invocation, out, &mut ctx),
            CommandId::Exit => builtin::run::<Exit>(invocation, out, &mut ctx),
            CommandId::ProcessMonitor => builtin::run::<Mytop>(invocation, out, &mut ctx),
        };
        if let Err(e) = result {
            warn!(command = %id, "cannot write builtin output: {e}");
        }
    }

    /// Child side of a fork: run the builtin on fd 1 and exit with status 0.
    fn finish_child(&mut self, id: CommandId, invocation: &Invocation, history: &HistoryLog) -> ! {
        // Write straight to the descriptor rather than through `io::stdout()`,
        // whose lock may have been held by another thread at fork time.
        // Safety: fd 1 is open in the child and is never closed through this handle.
        let mut stdout = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDOUT_FILENO) });
        self.run_handler(id, invocation, history, &mut *stdout);
        // Safety: `_exit` skips atexit handlers and stdio flushing, which
        // belong to the parent's copy of the process.
        unsafe { libc::_exit(0) }
    }
}

/// Report a failed child setup on fd 2 and leave with status 1.
///
/// The tracing subscriber writes through the `io::stderr()` lock, which may
/// have been held by another thread at fork time, so the child bypasses it.
fn abandon_child(message: fmt::Arguments<'_>) -> ! {
    // Safety: fd 2 is open in the child and is never closed through this handle.
    let mut stderr = ManuallyDrop::new(unsafe { File::from_raw_fd(libc::STDERR_FILENO) });
    let _ = writeln!(stderr, "{message}");
    // Safety: as in `finish_child`.
    unsafe { libc::_exit(1) }
}

impl Default for Dispatcher {
    /// A dispatcher over the real `/proc` with default monitor settings.
    fn default() -> Self {
        Self::with_procfs(Environment::new(), MonitorConfig::default())
    }
}

/// Point stdin, stdout and stderr at the null device and stop SIGCHLD
/// notifications, so the job neither reads the terminal nor leaves zombies
/// of its own children behind.
fn detach_from_terminal() -> nix::Result<()> {
    let null = fcntl::open(NULL_DEVICE, OFlag::O_RDWR, Mode::empty())?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        unistd::dup2(null, fd)?;
    }
    if null > libc::STDERR_FILENO {
        unistd::close(null)?;
    }
    // Safety: SIG_IGN installs no handler code.
    unsafe { signal::signal(Signal::SIGCHLD, SigHandler::SigIgn) }?;
    Ok(())
}

/// Collect every child that has already exited, without blocking.
///
/// Background builtins are never waited for by the dispatcher; the shell
/// loop calls this between commands so they do not linger as zombies.
/// Returns the number of children reaped.
pub fn reap_detached() -> usize {
    let mut reaped = 0;
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => return reaped,
            Ok(status) => {
                debug!(?status, "reaped child");
                reaped += 1;
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                warn!("waitpid failed: {e}");
                return reaped;
            }
        }
    }
}
