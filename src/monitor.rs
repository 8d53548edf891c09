//! Data gathering for `mytop`.
//!
//! Two pseudo-file formats are read through a [`SystemSource`]:
//!
//! - a memory summary: one line of five integers, `page_size total_pages
//!   free_pages largest_free cached_pages`;
//! - a registry directory with one entry per pid, each holding a
//!   whitespace-delimited status record whose field 7 is the CPU tick count.
//!
//! Processes come and go while the registry is scanned, so a single bad
//! entry is logged and skipped; only a registry that cannot be listed at
//! all, or one holding more than the configured number of processes, fails
//! the scan.

use crate::config::MonitorConfig;
use crate::error::{BuiltinError, EntryError};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

const KIB: u128 = 1024;

/// Access to the system's process metadata.
///
/// [`ProcFs`] reads a real `/proc`-style tree; tests substitute synthetic data.
pub trait SystemSource {
    /// The full text of the memory summary.
    fn memory_summary(&self) -> io::Result<String>;

    /// Names of all registry entries, pid-named or not.
    fn process_entries(&self) -> io::Result<Vec<String>>;

    /// The full status record for `pid`.
    fn process_record(&self, pid: u32) -> io::Result<String>;
}

/// A `/proc`-style directory on disk.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    memory_file: String,
    record_file: String,
}

impl ProcFs {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            root: config.proc_root.clone(),
            memory_file: config.memory_file.clone(),
            record_file: config.record_file.clone(),
        }
    }
}

impl SystemSource for ProcFs {
    fn memory_summary(&self) -> io::Result<String> {
        fs::read_to_string(self.root.join(&self.memory_file))
    }

    fn process_entries(&self) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            match entry {
                Ok(entry) => names.push(entry.file_name().to_string_lossy().into_owned()),
                Err(e) => debug!("skipping unreadable registry entry: {e}"),
            }
        }
        Ok(names)
    }

    fn process_record(&self, pid: u32) -> io::Result<String> {
        fs::read_to_string(self.root.join(pid.to_string()).join(&self.record_file))
    }
}

/// The five fields of the memory summary, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySummary {
    pub page_size: u64,
    pub total_pages: u64,
    pub free_pages: u64,
    /// Reported by the system but not printed.
    pub largest_free: u64,
    pub cached_pages: u64,
}

impl MemorySummary {
    pub fn total_kib(&self) -> u64 {
        pages_to_kib(self.page_size, self.total_pages)
    }

    pub fn free_kib(&self) -> u64 {
        pages_to_kib(self.page_size, self.free_pages)
    }

    pub fn cached_kib(&self) -> u64 {
        pages_to_kib(self.page_size, self.cached_pages)
    }
}

fn pages_to_kib(page_size: u64, pages: u64) -> u64 {
    let kib = u128::from(page_size) * u128::from(pages) / KIB;
    u64::try_from(kib).unwrap_or(u64::MAX)
}

impl FromStr for MemorySummary {
    type Err = BuiltinError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut fields = [0u64; 5];
        let mut tokens = text.split_whitespace();
        for (i, slot) in fields.iter_mut().enumerate() {
            let token = tokens.next().ok_or_else(|| {
                BuiltinError::MemoryInfoUnavailable(format!("expected 5 fields, found {i}"))
            })?;
            *slot = token.parse().map_err(|_| {
                BuiltinError::MemoryInfoUnavailable(format!("field {i} is not an integer: {token:?}"))
            })?;
        }
        let [page_size, total_pages, free_pages, largest_free, cached_pages] = fields;
        Ok(Self {
            page_size,
            total_pages,
            free_pages,
            largest_free,
            cached_pages,
        })
    }
}

/// Read and parse the memory summary.
pub fn read_memory(source: &dyn SystemSource) -> Result<MemorySummary, BuiltinError> {
    let text = source
        .memory_summary()
        .map_err(|e| BuiltinError::MemoryInfoUnavailable(e.to_string()))?;
    text.parse()
}

/// Ticks observed for one process during one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessTickSample {
    pub pid: u32,
    pub ticks: u64,
}

/// Result of one pass over the registry.
#[derive(Debug, Default)]
pub struct ProcessScan {
    /// Samples in directory enumeration order, which is not stable across runs.
    pub samples: Vec<ProcessTickSample>,
    pub total_ticks: u64,
    /// Pid-named entries that were dropped, with the reason.
    pub skipped: Vec<EntryError>,
}

impl ProcessScan {
    /// Each sample's share of the total ticks, in percent.
    ///
    /// A zero total gives every sample a share of 0.
    pub fn shares(&self) -> Result<Vec<(u32, f64)>, BuiltinError> {
        if self.samples.is_empty() {
            return Err(BuiltinError::NoProcessActivity);
        }
        let total = self.total_ticks as f64;
        Ok(self
            .samples
            .iter()
            .map(|s| {
                let share = if self.total_ticks == 0 {
                    0.0
                } else {
                    s.ticks as f64 / total * 100.0
                };
                (s.pid, share)
            })
            .collect())
    }
}

/// A registry entry names a process only if it is a positive decimal integer.
pub fn parse_pid(name: &str) -> Option<u32> {
    if !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok().filter(|&pid| pid > 0)
}

/// Pull the tick count out of a status record.
pub fn parse_ticks(pid: u32, record: &str, tick_field: usize) -> Result<u64, EntryError> {
    let value = record
        .split_whitespace()
        .nth(tick_field)
        .ok_or(EntryError::MissingField {
            pid,
            index: tick_field,
        })?;
    value.parse().map_err(|_| EntryError::BadTicks {
        pid,
        value: value.to_string(),
    })
}

/// Walk the registry and sample every process in it.
pub fn scan_processes(
    source: &dyn SystemSource,
    config: &MonitorConfig,
) -> Result<ProcessScan, BuiltinError> {
    let entries = source
        .process_entries()
        .map_err(|source| BuiltinError::RegistryUnavailable {
            path: config.proc_root.clone(),
            source,
        })?;

    let mut scan = ProcessScan::default();
    for pid in entries.iter().filter_map(|name| parse_pid(name)) {
        let ticks = source
            .process_record(pid)
            .map_err(|source| EntryError::Unreadable { pid, source })
            .and_then(|record| parse_ticks(pid, &record, config.tick_field));
        match ticks {
            Ok(ticks) => {
                if scan.samples.len() == config.max_processes {
                    return Err(BuiltinError::TooManyProcesses {
                        limit: config.max_processes,
                    });
                }
                scan.total_ticks = scan.total_ticks.saturating_add(ticks);
                scan.samples.push(ProcessTickSample { pid, ticks });
            }
            Err(e) => {
                debug!("skipping registry entry: {e}");
                scan.skipped.push(e);
            }
        }
    }
    Ok(scan)
}

pub fn write_memory(out: &mut dyn Write, memory: &MemorySummary) -> io::Result<()> {
    writeln!(
        out,
        "total: {} KiB free: {} KiB cached: {} KiB",
        memory.total_kib(),
        memory.free_kib(),
        memory.cached_kib()
    )
}

pub fn write_shares(out: &mut dyn Write, shares: &[(u32, f64)], precision: usize) -> io::Result<()> {
    for (pid, share) in shares {
        writeln!(out, "[{pid:>3}]: {share:.precision$}%")?;
    }
    Ok(())
}
