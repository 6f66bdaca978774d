//! Gate actuation
//!
//! One controller per lane. Opening commands the servo to the open angle and
//! schedules an autonomous close after the dwell time.

mod controller;

pub use controller::{GateController, GateSettings};
