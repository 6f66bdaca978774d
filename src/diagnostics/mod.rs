//! Diagnostics
//!
//! Point-in-time memory snapshots taken at lifecycle milestones and around
//! every gate action. Purely observational: taking a snapshot never fails.

mod reporter;

pub use reporter::{memlog_layer, Diagnostics, InitPhase, MEMLOG_TARGET};

#[cfg(test)]
pub use reporter::{MemoryProbe, MemorySample};
