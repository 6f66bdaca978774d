//! Servo actuation
//!
//! This module handles:
//! - Mapping gate angles to servo pulse widths
//! - Pluggable pulse drivers (log-only and Linux sysfs PWM)

mod driver;
mod servo;

pub use driver::{LogDriver, PulseDriver, SysfsPwmDriver};
pub use servo::Servo;
