//! Memory snapshot reporter

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::{debug, info, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Tracing target carrying `MEMLOG` records
pub const MEMLOG_TARGET: &str = "memlog";

/// Bare `MEMLOG,...` lines for the `memlog` target
///
/// No timestamp, level, target or colour, so every line stays a
/// comma-separated record.
pub fn memlog_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .without_time()
        .with_level(false)
        .with_target(false)
        .with_filter(filter_fn(|meta| meta.target() == MEMLOG_TARGET))
}

/// Raw memory figures from a probe, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySample {
    pub free_bytes: u64,
    pub allocated_bytes: u64,
    pub free_pool_bytes: u64,
    pub largest_free_block: u64,
}

/// Source of memory figures
pub trait MemoryProbe: Send + Sync {
    fn sample(&self) -> MemorySample;
}

/// Reads `/proc/meminfo` and `/proc/self/status`
///
/// Free bytes come from `MemAvailable`, the free pool from `MemFree` and the
/// allocated figure from the process resident set. Linux exposes no
/// fragmentation figure, so the largest free block reports `MemFree`.
/// Missing files or fields read as zero.
#[derive(Debug, Default)]
pub struct ProcMemoryProbe;

impl ProcMemoryProbe {
    fn read_kb(path: &str, field: &str) -> u64 {
        match std::fs::read_to_string(path) {
            Ok(content) => parse_kb_field(&content, field).unwrap_or(0),
            Err(e) => {
                debug!("[DIAG] Cannot read {}: {}", path, e);
                0
            }
        }
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn sample(&self) -> MemorySample {
        let available = Self::read_kb("/proc/meminfo", "MemAvailable") * 1024;
        let free = Self::read_kb("/proc/meminfo", "MemFree") * 1024;
        let rss = Self::read_kb("/proc/self/status", "VmRSS") * 1024;

        MemorySample {
            free_bytes: available,
            allocated_bytes: rss,
            free_pool_bytes: free,
            largest_free_block: free,
        }
    }
}

/// Parse a `Name:   1234 kB` line
fn parse_kb_field(content: &str, field: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let (name, rest) = line.split_once(':')?;
        if name.trim() != field {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// Boot phases bracketed by snapshots
///
/// Labels follow the `Before|After <phase> init` form the memory report
/// tooling filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Wifi,
    Servo,
    Mqtt,
}

impl InitPhase {
    fn name(self) -> &'static str {
        match self {
            InitPhase::Wifi => "WiFi",
            InitPhase::Servo => "Servo",
            InitPhase::Mqtt => "MQTT",
        }
    }

    pub fn before(self) -> String {
        format!("Before {} init", self.name())
    }

    pub fn after(self) -> String {
        format!("After {} init", self.name())
    }
}

/// One diagnostic record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySnapshot {
    /// Milliseconds since the reporter was created
    pub timestamp_ms: u64,
    pub label: String,
    pub free_bytes: u64,
    pub min_free_bytes: u64,
    pub allocated_bytes: u64,
    pub free_pool_bytes: u64,
    pub largest_free_block: u64,
}

impl fmt::Display for MemorySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{}",
            self.timestamp_ms,
            self.label,
            self.free_bytes,
            self.min_free_bytes,
            self.allocated_bytes,
            self.free_pool_bytes,
            self.largest_free_block
        )
    }
}

/// Emits `MEMLOG` records on the `memlog` tracing target
pub struct Diagnostics {
    started: Instant,
    probe: Box<dyn MemoryProbe>,
    min_free: AtomicU64,
}

impl Diagnostics {
    pub fn new(probe: Box<dyn MemoryProbe>) -> Self {
        Self {
            started: Instant::now(),
            probe,
            min_free: AtomicU64::new(u64::MAX),
        }
    }

    /// Reporter backed by procfs
    pub fn from_procfs() -> Self {
        Self::new(Box::new(ProcMemoryProbe))
    }

    /// Take and log a snapshot labelled with the lifecycle event
    pub fn snapshot(&self, event: &str) -> MemorySnapshot {
        let sample = self.probe.sample();
        let previous_min = self.min_free.fetch_min(sample.free_bytes, Ordering::Relaxed);

        let snapshot = MemorySnapshot {
            timestamp_ms: self.started.elapsed().as_millis() as u64,
            // Keep the record at seven fields
            label: event.replace(',', ";"),
            free_bytes: sample.free_bytes,
            min_free_bytes: previous_min.min(sample.free_bytes),
            allocated_bytes: sample.allocated_bytes,
            free_pool_bytes: sample.free_pool_bytes,
            largest_free_block: sample.largest_free_block,
        };

        info!(target: "memlog", "MEMLOG,{}", snapshot);
        debug!(
            "[DIAG] {}: free={} min_free={} allocated={} pool={} largest={}",
            snapshot.label,
            snapshot.free_bytes,
            snapshot.min_free_bytes,
            snapshot.allocated_bytes,
            snapshot.free_pool_bytes,
            snapshot.largest_free_block
        );

        snapshot
    }
}
