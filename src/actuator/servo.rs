//! Angle-controlled servo on one PWM channel

use super::driver::PulseDriver;
use anyhow::Result;
use gate_shared::ServoGeometry;
use std::sync::Arc;

/// A named servo channel
///
/// Setting an angle is idempotent, so concurrent writers are harmless as long
/// as only angles are written.
#[derive(Clone)]
pub struct Servo {
    name: String,
    channel: u32,
    geometry: ServoGeometry,
    driver: Arc<dyn PulseDriver>,
}

impl std::fmt::Debug for Servo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Servo")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("geometry", &self.geometry)
            .field("driver", &self.driver.name())
            .finish()
    }
}

impl Servo {
    pub fn new(
        name: impl Into<String>,
        channel: u32,
        geometry: ServoGeometry,
        driver: Arc<dyn PulseDriver>,
    ) -> Self {
        Self {
            name: name.into(),
            channel,
            geometry,
            driver,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    /// Configure the channel for servo frames
    pub fn init(&self, period_us: u32) -> Result<()> {
        self.geometry.validate()?;
        self.driver.configure(self.channel, period_us)
    }

    /// Command a position, returning the pulse width written
    pub fn set_angle(&self, angle: u32) -> Result<u32> {
        let pulse_us = self.geometry.pulse_width_us(angle)?;
        self.driver.write_pulse(self.channel, pulse_us)?;
        Ok(pulse_us)
    }
}
