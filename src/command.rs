use crate::error::BuiltinError;
use nix::unistd::Pid;
use std::fmt;
use std::str::FromStr;

/// Raw placement code used by the outer shell for commands run in the foreground.
pub const FOREGROUND: i32 = 0;
/// Raw placement code used by the outer shell for commands ending in `&`.
pub const BACKGROUND: i32 = 1;

/// The closed set of commands the shell executes itself.
///
/// Every variant is bound to exactly one handler; the dispatcher matches on
/// this enum exhaustively, so there is no "unmapped" case at dispatch time.
/// Unknown names are rejected earlier, when parsing a name with [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    /// `cd <path>`
    ChangeDirectory,
    /// `history [n]`
    History,
    /// `exit`
    Exit,
    /// `mytop`
    ProcessMonitor,
}

impl CommandId {
    pub const ALL: [CommandId; 4] = [
        CommandId::ChangeDirectory,
        CommandId::History,
        CommandId::Exit,
        CommandId::ProcessMonitor,
    ];

    /// Name the command is typed as.
    pub fn name(self) -> &'static str {
        match self {
            CommandId::ChangeDirectory => "cd",
            CommandId::History => "history",
            CommandId::Exit => "exit",
            CommandId::ProcessMonitor => "mytop",
        }
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CommandId {
    type Err = BuiltinError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        CommandId::ALL
            .into_iter()
            .find(|id| id.name() == name)
            .ok_or_else(|| BuiltinError::UnknownCommand(name.to_string()))
    }
}

/// One call of a builtin: the argument vector with the command name at index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    argv: Vec<String>,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    /// `argv[0]`, or an empty string for an empty vector.
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Everything after the command name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn argc(&self) -> usize {
        self.argv.len()
    }
}

/// Where a builtin runs relative to the shell process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// In the shell's own process. Not allowed together with pipe wiring.
    Inline,
    /// In a forked child that is one stage of a pipeline.
    ForegroundForked,
    /// In a forked child detached from the terminal; nobody waits for it.
    BackgroundForked,
}

impl PlacementMode {
    /// Resolve the outer shell's raw mode code.
    ///
    /// A foreground command becomes [`PlacementMode::ForegroundForked`] only
    /// when it takes part in a pipeline. Unknown codes yield `None`.
    pub fn from_raw(mode: i32, piped: bool) -> Option<Self> {
        match (mode, piped) {
            (FOREGROUND, false) => Some(PlacementMode::Inline),
            (FOREGROUND, true) => Some(PlacementMode::ForegroundForked),
            (BACKGROUND, _) => Some(PlacementMode::BackgroundForked),
            _ => None,
        }
    }
}

/// What the caller gets back from a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The builtin ran inline (or was rejected); there is no child to track.
    NoChild,
    /// A pipeline child was forked. Reaping it is the caller's job.
    Child(Pid),
    /// A background child was forked and deliberately forgotten.
    Detached,
}

impl Outcome {
    /// The pid worth waiting for, if any.
    pub fn pid(self) -> Option<Pid> {
        match self {
            Outcome::Child(pid) => Some(pid),
            Outcome::NoChild | Outcome::Detached => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_round_trip() {
        for id in CommandId::ALL {
            assert_eq!(id.name().parse::<CommandId>().unwrap(), id);
        }
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let err = "ls".parse::<CommandId>().unwrap_err();
        assert!(matches!(err, BuiltinError::UnknownCommand(ref name) if name == "ls"));
    }

    #[test]
    fn test_invocation_accessors() {
        let inv = Invocation::new(["history", "3"]);
        assert_eq!(inv.name(), "history");
        assert_eq!(inv.args(), &["3".to_string()]);
        assert_eq!(inv.argc(), 2);

        let empty = Invocation::new(Vec::<String>::new());
        assert_eq!(empty.name(), "");
        assert!(empty.args().is_empty());
    }

    #[test]
    fn test_raw_placement_codes() {
        assert_eq!(
            PlacementMode::from_raw(FOREGROUND, false),
            Some(PlacementMode::Inline)
        );
        assert_eq!(
            PlacementMode::from_raw(FOREGROUND, true),
            Some(PlacementMode::ForegroundForked)
        );
        assert_eq!(
            PlacementMode::from_raw(BACKGROUND, false),
            Some(PlacementMode::BackgroundForked)
        );
        assert_eq!(PlacementMode::from_raw(7, false), None);
    }

    #[test]
    fn test_only_pipeline_children_are_trackable() {
        let pid = Pid::from_raw(42);
        assert_eq!(Outcome::Child(pid).pid(), Some(pid));
        // background builtins are fire-and-forget
        assert_eq!(Outcome::Detached.pid(), None);
        assert_eq!(Outcome::NoChild.pid(), None);
    }
}
