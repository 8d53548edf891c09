//! The command history and the window `history [n]` prints from it.
//!
//! The log belongs to the outer shell, which appends one entry per line it
//! reads. Builtins only ever see it through a shared reference. Appends and
//! dispatches are serialized by the shell loop, so no locking is done here.

/// Append-only list of the command lines entered so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    entries: Vec<String>,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a line. Called by the shell loop, never by a builtin.
    pub fn push(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
    }

    /// Number of entries recorded so far; the position the next entry lands at.
    pub fn cursor(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The last `count` entries, oldest first. `count` is clamped to the log size.
    pub fn window(&self, count: usize) -> HistoryWindow<'_> {
        let count = count.min(self.cursor());
        let start = self.cursor() - count;
        HistoryWindow {
            entries: &self.entries[start..],
            order: HistoryOrder::for_count(count, self.cursor()),
        }
    }
}

impl<S: Into<String>> FromIterator<S> for HistoryLog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Order tag attached to a window.
///
/// A full-log request is tagged `InOrder`, anything shorter `Reverse`. The
/// tag does not change what is printed: windows always come out oldest
/// first. Nothing defines what reverse output would look like yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryOrder {
    InOrder,
    Reverse,
}

impl HistoryOrder {
    fn for_count(count: usize, cursor: usize) -> Self {
        if count == cursor {
            HistoryOrder::InOrder
        } else {
            HistoryOrder::Reverse
        }
    }
}

/// A borrowed slice of the most recent history entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow<'a> {
    pub entries: &'a [String],
    pub order: HistoryOrder,
}

/// Turn the optional `history` argument into an entry count.
///
/// No argument means everything. Negative or unparseable input means
/// nothing, and counts past the end are clamped to the log size.
pub fn normalize_count(arg: Option<&str>, cursor: usize) -> usize {
    let Some(arg) = arg else {
        return cursor;
    };
    match arg.trim().parse::<i64>() {
        Ok(n) if n < 0 => 0,
        Ok(n) => usize::try_from(n).map_or(cursor, |n| n.min(cursor)),
        Err(_) => 0,
    }
}
