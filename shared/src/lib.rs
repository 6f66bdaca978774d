//! Gate Controller Shared Types
//!
//! This crate provides the runtime-free building blocks of the two-lane gate
//! controller: lane and command types, the topic matcher, the network
//! attachment state machine and servo geometry.

pub mod command;
pub mod connectivity;
pub mod gate;

use serde::Deserialize;

pub use command::{Command, CommandMatcher, GateAction};
pub use connectivity::{ConnectivityState, LinkAction, LinkEvent, LinkOutcome, LinkStatus};
pub use gate::{GateState, GeometryError, RetriggerPolicy, ServoGeometry};

/// One of the two independently controlled gate channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Entry,
    Exit,
}

impl Lane {
    /// Both lanes, entry first
    pub const ALL: [Lane; 2] = [Lane::Entry, Lane::Exit];

    /// Lowercase label used in diagnostic event names
    pub fn label(&self) -> &'static str {
        match self {
            Lane::Entry => "entry",
            Lane::Exit => "exit",
        }
    }
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Entry => write!(f, "ENTRY"),
            Lane::Exit => write!(f, "EXIT"),
        }
    }
}

/// Factory defaults for a parking gate installation
pub mod defaults {
    /// Topic carrying entry lane commands
    pub const ENTRY_TOPIC: &str = "parking/gate/entry";

    /// Topic carrying exit lane commands
    pub const EXIT_TOPIC: &str = "parking/gate/exit";

    /// The only recognized command payload
    pub const OPEN_TOKEN: &str = "open";

    /// Time a gate stays open before closing on its own
    pub const DWELL_MS: u64 = 5000;

    /// Retries after the first failed attach before giving up
    pub const MAX_ATTACH_ATTEMPTS: u32 = 10;

    /// Servo pulse width at 0 degrees, microseconds
    pub const MIN_PULSE_US: u32 = 600;

    /// Servo pulse width at `MAX_DEGREE`, microseconds
    pub const MAX_PULSE_US: u32 = 2400;

    /// Full servo travel in degrees
    pub const MAX_DEGREE: u32 = 180;

    /// 50 Hz servo frame
    pub const PWM_PERIOD_US: u32 = 20_000;

    pub const OPEN_ANGLE: u32 = 90;
    pub const CLOSED_ANGLE: u32 = 180;
}
