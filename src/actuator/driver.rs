//! Pulse driver abstraction for pluggable PWM backends

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Turns a pulse width into an electrical waveform on one channel
pub trait PulseDriver: Send + Sync {
    /// Prepare a channel for servo frames of `period_us`
    fn configure(&self, channel: u32, period_us: u32) -> Result<()>;

    /// Set the high time of each frame
    fn write_pulse(&self, channel: u32, pulse_us: u32) -> Result<()>;

    /// Human-readable name for this driver
    fn name(&self) -> &'static str;
}

/// Driver that only logs, for development hosts without PWM hardware
#[derive(Debug, Default)]
pub struct LogDriver;

impl PulseDriver for LogDriver {
    fn configure(&self, channel: u32, period_us: u32) -> Result<()> {
        info!("[PWM] channel {} configured, period {}us", channel, period_us);
        Ok(())
    }

    fn write_pulse(&self, channel: u32, pulse_us: u32) -> Result<()> {
        debug!("[PWM] channel {} pulse {}us", channel, pulse_us);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Linux `/sys/class/pwm` driver
///
/// Values written to sysfs are in nanoseconds.
#[derive(Debug, Clone)]
pub struct SysfsPwmDriver {
    chip_dir: PathBuf,
}

impl SysfsPwmDriver {
    /// Driver for `/sys/class/pwm/pwmchip<chip>`
    pub fn new(chip: u32) -> Self {
        Self::with_root(Path::new("/sys/class/pwm").join(format!("pwmchip{}", chip)))
    }

    /// Driver rooted at an arbitrary chip directory
    pub fn with_root(chip_dir: impl Into<PathBuf>) -> Self {
        Self {
            chip_dir: chip_dir.into(),
        }
    }

    fn channel_dir(&self, channel: u32) -> PathBuf {
        self.chip_dir.join(format!("pwm{}", channel))
    }

    fn write_attr(&self, channel: u32, attr: &str, value: impl ToString) -> Result<()> {
        let path = self.channel_dir(channel).join(attr);
        std::fs::write(&path, value.to_string())
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl PulseDriver for SysfsPwmDriver {
    fn configure(&self, channel: u32, period_us: u32) -> Result<()> {
        if !self.channel_dir(channel).exists() {
            let export = self.chip_dir.join("export");
            std::fs::write(&export, channel.to_string())
                .with_context(|| format!("Failed to export PWM channel {}", channel))?;
        }

        // duty_cycle must never exceed period, so clear it first
        self.write_attr(channel, "duty_cycle", 0)?;
        self.write_attr(channel, "period", u64::from(period_us) * 1000)?;
        self.write_attr(channel, "enable", 1)?;

        info!(
            "[PWM] {} channel {} enabled, period {}us",
            self.chip_dir.display(),
            channel,
            period_us
        );
        Ok(())
    }

    fn write_pulse(&self, channel: u32, pulse_us: u32) -> Result<()> {
        self.write_attr(channel, "duty_cycle", u64::from(pulse_us) * 1000)
    }

    fn name(&self) -> &'static str {
        "sysfs"
    }
}
