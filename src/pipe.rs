use nix::unistd;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// One anonymous pipe between two neighbouring pipeline stages.
#[derive(Debug)]
pub struct Pipe {
    pub read: OwnedFd,
    pub write: OwnedFd,
}

impl Pipe {
    pub fn new() -> nix::Result<Self> {
        let (read, write) = unistd::pipe()?;
        Ok(Self { read, write })
    }

    /// The `n - 1` pipes joining an `n`-stage pipeline.
    pub fn for_pipeline(stages: usize) -> nix::Result<Vec<Pipe>> {
        (1..stages).map(|_| Pipe::new()).collect()
    }
}

/// How one forked stage hooks into its pipeline.
///
/// Stage `position` reads from pipe `position - 1` and writes to pipe
/// `position`; the first stage keeps the shell's stdin and the last keeps
/// its stdout. The pipes stay owned by the pipeline builder: a wiring only
/// borrows them, and is applied once, inside the forked child.
#[derive(Debug, Clone, Copy)]
pub struct PipeWiring<'a> {
    pipes: &'a [Pipe],
    position: usize,
}

impl<'a> PipeWiring<'a> {
    pub fn new(pipes: &'a [Pipe], position: usize) -> Self {
        Self { pipes, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Descriptor this stage should read from, if it is not the first stage.
    fn input(&self) -> Option<RawFd> {
        let prev = self.position.checked_sub(1)?;
        self.pipes.get(prev).map(|p| p.read.as_raw_fd())
    }

    /// Descriptor this stage should write to, if it is not the last stage.
    fn output(&self) -> Option<RawFd> {
        self.pipes.get(self.position).map(|p| p.write.as_raw_fd())
    }

    /// Point stdin/stdout at this stage's pipe ends and close every pipe
    /// descriptor the child inherited.
    ///
    /// Only meaningful in a freshly forked child: the parent's copies of the
    /// pipes are untouched.
    pub(crate) fn apply(self) -> nix::Result<()> {
        if let Some(fd) = self.input() {
            unistd::dup2(fd, libc::STDIN_FILENO)?;
        }
        if let Some(fd) = self.output() {
            unistd::dup2(fd, libc::STDOUT_FILENO)?;
        }
        for pipe in self.pipes {
            unistd::close(pipe.read.as_raw_fd())?;
            unistd::close(pipe.write.as_raw_fd())?;
        }
        Ok(())
    }
}
